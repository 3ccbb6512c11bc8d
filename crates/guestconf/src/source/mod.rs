//! Raw config source abstraction.
//!
//! The [`ConfigSource`] trait is the boundary to the platform: it reads a
//! guest's flat configuration with its digest and writes parameter fragments
//! guarded by that digest. Implementations:
//! - [`PveshSource`]: the platform CLI (`pvesh`)
//! - [`MemorySource`]: in-process store with compare-and-set semantics

pub mod memory;
pub mod pvesh;

pub use memory::MemorySource;
pub use pvesh::PveshSource;

use crate::error::SourceError;
use crate::types::RawConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Result type for source operations.
pub type Result<T> = std::result::Result<T, SourceError>;

/// Guest flavour, which selects the API path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuestKind {
    /// Virtual machine
    Qemu,
    /// Container
    Lxc,
}

impl GuestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Qemu => "qemu",
            Self::Lxc => "lxc",
        }
    }
}

impl fmt::Display for GuestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GuestKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "qemu" | "vm" => Ok(Self::Qemu),
            "lxc" | "ct" => Ok(Self::Lxc),
            other => Err(format!("unknown guest kind `{other}` (expected qemu or lxc)")),
        }
    }
}

/// Fully resolved reference to one guest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GuestRef {
    pub node: String,
    pub kind: GuestKind,
    pub vmid: u32,
}

impl GuestRef {
    pub fn new(node: impl Into<String>, kind: GuestKind, vmid: u32) -> Self {
        Self {
            node: node.into(),
            kind,
            vmid,
        }
    }

    pub fn qemu(node: impl Into<String>, vmid: u32) -> Self {
        Self::new(node, GuestKind::Qemu, vmid)
    }

    pub fn lxc(node: impl Into<String>, vmid: u32) -> Self {
        Self::new(node, GuestKind::Lxc, vmid)
    }

    /// API path of the guest configuration.
    pub fn config_path(&self) -> String {
        format!("/nodes/{}/{}/{}/config", self.node, self.kind, self.vmid)
    }
}

impl fmt::Display for GuestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.kind, self.vmid, self.node)
    }
}

/// One write call: parameters to set, keys to delete, and the precondition.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigWrite {
    /// Encoded parameters (values and bare flags)
    pub params: RawConfig,
    /// Keys to remove
    pub delete: Vec<String>,
    /// Digest the live config must still have for the write to apply
    pub digest: Option<String>,
}

impl ConfigWrite {
    /// Keys touched by this write, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys = self.params.keys();
        keys.extend(self.delete.iter().map(String::as_str));
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

/// Source of raw guest configuration.
///
/// Implementations own transport concerns (process spawning, retries on
/// transient failures, timeouts). The coordinator only sees these calls.
pub trait ConfigSource: Send + Sync {
    /// Short name for messages.
    fn name(&self) -> &str;

    /// Read the flat configuration of a guest, with its digest if the source
    /// supports one.
    fn fetch(&self, guest: &GuestRef) -> Result<RawConfig>;

    /// Apply a write. When `write.digest` is set and no longer matches, the
    /// source must fail with [`SourceError::PreconditionFailed`] and change
    /// nothing.
    fn write(&self, guest: &GuestRef, write: &ConfigWrite) -> Result<()>;

    /// Whether writes can be guarded by a digest.
    fn supports_digest(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path() {
        assert_eq!(GuestRef::qemu("pve1", 100).config_path(), "/nodes/pve1/qemu/100/config");
        assert_eq!(GuestRef::lxc("pve2", 201).config_path(), "/nodes/pve2/lxc/201/config");
    }

    #[test]
    fn test_guest_kind_from_str() {
        assert_eq!("qemu".parse::<GuestKind>(), Ok(GuestKind::Qemu));
        assert_eq!("ct".parse::<GuestKind>(), Ok(GuestKind::Lxc));
        assert!("docker".parse::<GuestKind>().is_err());
    }

    #[test]
    fn test_write_keys() {
        let write = ConfigWrite {
            params: RawConfig::new().with("memory", "2048").with("cores", "2"),
            delete: vec!["tags".into(), "cores".into()],
            digest: None,
        };
        assert_eq!(write.keys(), vec!["cores", "memory", "tags"]);
    }
}
