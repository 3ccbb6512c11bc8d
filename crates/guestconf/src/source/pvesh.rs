//! Config source driving the platform CLI (`pvesh`).

use super::{ConfigSource, ConfigWrite, GuestKind, GuestRef, Result};
use crate::error::SourceError;
use crate::types::RawConfig;
use std::process::{Command, Output};

/// Source that executes `pvesh` on a cluster node.
pub struct PveshSource {
    /// Path to the pvesh executable
    pvesh_path: String,
}

impl PveshSource {
    /// Create a source using the `pvesh` found on this host.
    pub fn new() -> Result<Self> {
        Ok(Self {
            pvesh_path: find_pvesh()?,
        })
    }

    /// Create a source with an explicit executable path.
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            pvesh_path: path.into(),
        }
    }

    /// Run a pvesh command and return its output.
    fn run_pvesh(&self, args: &[String]) -> Result<Output> {
        log::trace!("{} {}", self.pvesh_path, args.join(" "));
        Command::new(&self.pvesh_path)
            .args(args)
            .output()
            .map_err(|e| SourceError::Unavailable {
                status: None,
                message: format!("failed to execute {}: {e}", self.pvesh_path),
            })
    }

    /// Run a pvesh command and check for success.
    fn run_pvesh_checked(&self, args: &[String], subject: &str) -> Result<String> {
        let output = self.run_pvesh(args)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SourceError::from_pvesh_output(&stderr, output.status.code(), subject));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Resolve the node and kind of a guest from the cluster resource list.
    pub fn locate(&self, vmid: u32) -> Result<GuestRef> {
        let args = [
            "get",
            "/cluster/resources",
            "--type",
            "vm",
            "--output-format",
            "json",
        ]
        .map(String::from);
        let stdout = self.run_pvesh_checked(&args, &vmid.to_string())?;
        let resources: serde_json::Value = serde_json::from_str(&stdout)?;
        guest_from_resources(&resources, vmid)
    }
}

impl ConfigSource for PveshSource {
    fn name(&self) -> &str {
        "pvesh"
    }

    fn fetch(&self, guest: &GuestRef) -> Result<RawConfig> {
        let args = [
            "get".to_string(),
            guest.config_path(),
            "--output-format".to_string(),
            "json".to_string(),
        ];
        let stdout = self.run_pvesh_checked(&args, &guest.to_string())?;
        let json: serde_json::Value = serde_json::from_str(&stdout)?;
        let object = json.as_object().ok_or_else(|| SourceError::Malformed {
            message: format!("expected a JSON object for {guest}, got {json}"),
        })?;
        Ok(RawConfig::from_json_object(object))
    }

    fn write(&self, guest: &GuestRef, write: &ConfigWrite) -> Result<()> {
        let args = write_args(guest, write);
        self.run_pvesh_checked(&args, &guest.to_string())?;
        Ok(())
    }
}

/// Command line of a `pvesh set` call for one write.
pub(crate) fn write_args(guest: &GuestRef, write: &ConfigWrite) -> Vec<String> {
    let mut args = vec!["set".to_string(), guest.config_path()];

    for (key, value) in write.params.iter() {
        args.push(format!("--{key}"));
        args.push(value.to_string());
    }
    for flag in write.params.flags() {
        args.push(format!("--{flag}"));
    }
    if !write.delete.is_empty() {
        args.push("--delete".to_string());
        args.push(write.delete.join(","));
    }
    if let Some(digest) = &write.digest {
        args.push("--digest".to_string());
        args.push(digest.clone());
    }

    args
}

/// Pick a guest out of a `/cluster/resources` listing.
fn guest_from_resources(resources: &serde_json::Value, vmid: u32) -> Result<GuestRef> {
    let entries = resources.as_array().ok_or_else(|| SourceError::Malformed {
        message: "expected a JSON array of cluster resources".to_string(),
    })?;

    let entry = entries
        .iter()
        .find(|entry| entry["vmid"].as_u64() == Some(u64::from(vmid)))
        .ok_or_else(|| SourceError::NotFound {
            guest: vmid.to_string(),
        })?;

    let kind = entry["type"]
        .as_str()
        .and_then(|t| t.parse::<GuestKind>().ok())
        .ok_or_else(|| SourceError::Malformed {
            message: format!("resource for {vmid} has no usable type"),
        })?;
    let node = entry["node"].as_str().ok_or_else(|| SourceError::Malformed {
        message: format!("resource for {vmid} has no node"),
    })?;

    Ok(GuestRef::new(node, kind, vmid))
}

/// Find the pvesh executable.
fn find_pvesh() -> Result<String> {
    if std::path::Path::new("/usr/bin/pvesh").exists() {
        return Ok("/usr/bin/pvesh".to_string());
    }

    let output = Command::new("which")
        .arg("pvesh")
        .output()
        .map_err(|e| SourceError::Unavailable {
            status: None,
            message: format!("cannot look up pvesh: {e}"),
        })?;

    if output.status.success() {
        let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !path.is_empty() {
            return Ok(path);
        }
    }

    Err(SourceError::Unavailable {
        status: None,
        message: "pvesh not found (is this a Proxmox VE node?)".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_args() {
        let mut params = RawConfig::new()
            .with("memory", "4096")
            .with("net0", "virtio,bridge=vmbr0");
        params.insert_flag("reset");
        let write = ConfigWrite {
            params,
            delete: vec!["tags".into(), "description".into()],
            digest: Some("3f2a".into()),
        };

        let args = write_args(&GuestRef::qemu("pve1", 100), &write);
        assert_eq!(
            args,
            vec![
                "set",
                "/nodes/pve1/qemu/100/config",
                "--memory",
                "4096",
                "--net0",
                "virtio,bridge=vmbr0",
                "--reset",
                "--delete",
                "tags,description",
                "--digest",
                "3f2a",
            ]
        );
    }

    #[test]
    fn test_write_args_without_digest_or_deletes() {
        let write = ConfigWrite {
            params: RawConfig::new().with("cores", "2"),
            ..Default::default()
        };
        let args = write_args(&GuestRef::lxc("pve2", 201), &write);
        assert_eq!(args, vec!["set", "/nodes/pve2/lxc/201/config", "--cores", "2"]);
    }

    #[test]
    fn test_guest_from_resources() {
        let resources = serde_json::json!([
            {"id": "qemu/100", "type": "qemu", "node": "pve1", "vmid": 100, "status": "running"},
            {"id": "lxc/201", "type": "lxc", "node": "pve2", "vmid": 201, "status": "stopped"},
        ]);

        assert_eq!(guest_from_resources(&resources, 201).unwrap(), GuestRef::lxc("pve2", 201));
        assert_eq!(guest_from_resources(&resources, 100).unwrap(), GuestRef::qemu("pve1", 100));
        assert!(matches!(
            guest_from_resources(&resources, 999),
            Err(SourceError::NotFound { .. })
        ));
    }

    #[test]
    fn test_missing_executable_is_unavailable() {
        let source = PveshSource::with_path("/nonexistent/pvesh");
        let err = source.fetch(&GuestRef::qemu("pve1", 100)).unwrap_err();
        assert!(err.is_retryable());
    }
}
