//! Building update requests from command arguments and batch files.

use anyhow::{Context, Result, bail};
use guestconf::{
    Composite, GuestKind, GuestRef, IpConfig, NetDevice, NicModel, StorageDevice, UpdateRequest,
    Value, decode_value, registry,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Parse `KEY=VALUE` (value in wire form) or a bare `KEY` flag.
pub fn parse_assignment(assignment: &str) -> Result<(String, Value)> {
    let (key, value) = match assignment.split_once('=') {
        Some((key, raw)) => {
            let key = key.trim();
            let value = decode_value(key, raw).with_context(|| format!("Invalid value for {key}"))?;
            (key, value)
        }
        None => (assignment.trim(), Value::Flag),
    };
    if key.is_empty() {
        bail!("Missing key in '{assignment}'");
    }
    Ok((key.to_string(), value))
}

/// Split tag arguments that may themselves be `;`- or `,`-joined.
pub fn parse_tags<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    args.iter()
        .flat_map(|arg| arg.as_ref().split([';', ',']))
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a VLAN list separated by `;` or `,`.
pub fn parse_vlans(list: &str) -> Result<Vec<u16>> {
    list.split([';', ','])
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| item.parse::<u16>().with_context(|| format!("Invalid VLAN id '{item}'")))
        .collect()
}

/// Options for a network interface, as given on the command line.
#[derive(Debug, Clone, Default)]
pub struct NetOptions {
    pub model: String,
    pub bridge: String,
    pub tag: Option<u16>,
    pub trunks: Vec<u16>,
    pub firewall: Option<bool>,
    pub ip: IpConfig,
}

/// Request setting `net<index>` (and `ipconfig<index>` when IP settings are given).
///
/// The MAC of an existing interface is kept when the model stays the same, so
/// reconfiguring a NIC does not make the platform generate a new address.
pub fn net_request(
    guest: GuestRef,
    index: u32,
    options: &NetOptions,
    live: Option<&Value>,
) -> Result<UpdateRequest> {
    let key = format!("net{index}");
    if !registry::is_network_slot(&key) {
        bail!(
            "net{index} is not a valid interface (valid: {})",
            registry::valid_network_slots().join(", ")
        );
    }

    let model: NicModel = options.model.parse()?;
    let mut device = NetDevice::new(model)
        .with_bridge(options.bridge.as_str())
        .with_trunks(options.trunks.iter().copied());
    if let Some(tag) = options.tag {
        device = device.with_tag(tag);
    }
    if let Some(firewall) = options.firewall {
        device = device.with_firewall(firewall);
    }
    if let Some(Value::Composite(current)) = live
        && let Ok(current) = NetDevice::try_from(current)
        && current.model == model
        && let Some(mac) = current.macaddr
    {
        device = device.with_macaddr(mac);
    }

    let mut request = UpdateRequest::new(guest).set(key, device.to_composite());
    if !options.ip.is_empty() {
        request = request.set(format!("ipconfig{index}"), options.ip.to_composite());
    }
    Ok(request)
}

/// Request adding a SCSI disk, or `None` when the slot is already taken.
pub fn disk_request(
    guest: GuestRef,
    index: u32,
    device: StorageDevice,
    live: Option<&Value>,
) -> Result<Option<UpdateRequest>> {
    let key = format!("scsi{index}");
    if !registry::is_storage_slot(&key) {
        bail!("{key} is not a valid storage slot");
    }
    if live.is_some() {
        return Ok(None);
    }
    Ok(Some(UpdateRequest::new(guest).set(key, device.to_composite())))
}

/// Request inserting an ISO into (or ejecting) a CD-ROM drive.
pub fn cdrom_request(guest: GuestRef, slot: &str, storage: &str, file: &str) -> Result<UpdateRequest> {
    if !registry::is_storage_slot(slot) {
        bail!(
            "'{slot}' is not a valid drive (valid: {})",
            registry::valid_storage_slots().join(", ")
        );
    }
    let iso = (file != "none").then_some((storage, file));
    Ok(UpdateRequest::new(guest).set(slot, StorageDevice::cdrom(iso).to_composite()))
}

// ============================================================================
// Batch files
// ============================================================================

/// A batch of updates:
///
/// ```toml
/// [[guest]]
/// vmid = 100
/// node = "pve1"
/// delete = ["description"]
///
/// [guest.set]
/// memory = 4096
/// net1 = "virtio,bridge=vmbr1,tag=20"
/// tags = ["web", "prod"]
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchFile {
    #[serde(default, rename = "guest")]
    pub guests: Vec<BatchEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BatchEntry {
    pub vmid: u32,
    pub node: Option<String>,
    pub kind: Option<GuestKind>,
    pub digest: Option<String>,
    #[serde(default)]
    pub set: BTreeMap<String, toml::Value>,
    #[serde(default)]
    pub delete: Vec<String>,
}

impl BatchFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid batch file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let batch: Self = toml::from_str(content)?;
        if batch.guests.is_empty() {
            bail!("No [[guest]] entries");
        }
        Ok(batch)
    }
}

impl BatchEntry {
    /// Build the request for this entry against an already-resolved guest.
    pub fn request(&self, guest: GuestRef) -> Result<UpdateRequest> {
        let mut request = UpdateRequest::new(guest);
        for (key, value) in &self.set {
            request = request.set(key.as_str(), toml_to_value(key, value)?);
        }
        for key in &self.delete {
            request = request.delete(key.as_str());
        }
        if let Some(digest) = &self.digest {
            request = request.expect_digest(digest.as_str());
        }
        Ok(request)
    }
}

/// Convert a batch file value. Strings are wire form; arrays are lists; tables
/// are composites.
fn toml_to_value(key: &str, value: &toml::Value) -> Result<Value> {
    match value {
        toml::Value::String(raw) => {
            decode_value(key, raw).with_context(|| format!("Invalid value for {key}"))
        }
        toml::Value::Integer(_) | toml::Value::Float(_) | toml::Value::Boolean(_) => {
            Ok(Value::Scalar(scalar_text(key, value)?))
        }
        toml::Value::Array(items) => {
            let items = items
                .iter()
                .map(|item| scalar_text(key, item))
                .collect::<Result<Vec<_>>>()?;
            Ok(match registry::classify(key) {
                registry::FieldFamily::SemicolonList => Value::SemicolonList(items),
                _ => Value::List(items),
            })
        }
        toml::Value::Table(table) => {
            let mut composite = Composite::new();
            for (sub_key, sub_value) in table {
                let text = scalar_text(key, sub_value)?;
                composite.insert(sub_key.as_str(), text);
            }
            Ok(Value::Composite(composite))
        }
        toml::Value::Datetime(_) => bail!("{key}: dates are not supported"),
    }
}

fn scalar_text(key: &str, value: &toml::Value) -> Result<String> {
    match value {
        toml::Value::String(s) => Ok(s.clone()),
        toml::Value::Integer(i) => Ok(i.to_string()),
        toml::Value::Float(f) => Ok(f.to_string()),
        toml::Value::Boolean(b) => Ok(if *b { "1" } else { "0" }.to_string()),
        _ => bail!("{key}: expected a string, number or boolean"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guestconf::SubValue;

    fn guest() -> GuestRef {
        GuestRef::qemu("pve1", 100)
    }

    #[test]
    fn test_parse_assignment() {
        let (key, value) = parse_assignment("net1=virtio,bridge=vmbr1,tag=20").unwrap();
        assert_eq!(key, "net1");
        let net = value.as_composite().unwrap();
        assert_eq!(net.get("model"), Some(&SubValue::from("virtio")));
        assert_eq!(net.get("tag"), Some(&SubValue::Int(20)));

        assert_eq!(
            parse_assignment("description=a=b, c").unwrap().1,
            Value::from("a=b, c")
        );
        assert_eq!(parse_assignment("toggle").unwrap().1, Value::Flag);
        assert!(parse_assignment("=5").is_err());
        assert!(parse_assignment("net0=virtio,firewall=maybe").is_err());
    }

    #[test]
    fn test_parse_tags() {
        assert_eq!(parse_tags(&["web;prod", "db,", " x "]), vec!["web", "prod", "db", "x"]);
        assert!(parse_tags::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_parse_vlans() {
        assert_eq!(parse_vlans("10;20,30").unwrap(), vec![10, 20, 30]);
        assert!(parse_vlans("10;abc").is_err());
    }

    #[test]
    fn test_net_request_keeps_mac() {
        let live = decode_value("net0", "virtio=BC:24:11:AA:BB:CC,bridge=vmbr0").unwrap();
        let options = NetOptions {
            model: "virtio".into(),
            bridge: "vmbr1".into(),
            tag: Some(20),
            ip: IpConfig {
                ip: Some("dhcp".into()),
                ..Default::default()
            },
            ..Default::default()
        };

        let request = net_request(guest(), 0, &options, Some(&live)).unwrap();
        let net = request.set.get("net0").and_then(Value::as_composite).unwrap();
        assert_eq!(net.get("macaddr"), Some(&SubValue::from("BC:24:11:AA:BB:CC")));
        assert_eq!(net.get("bridge"), Some(&SubValue::from("vmbr1")));
        assert!(request.set.contains_key("ipconfig0"));
    }

    #[test]
    fn test_net_request_model_change_drops_mac() {
        let live = decode_value("net0", "virtio=BC:24:11:AA:BB:CC,bridge=vmbr0").unwrap();
        let options = NetOptions {
            model: "e1000".into(),
            bridge: "vmbr0".into(),
            ..Default::default()
        };
        let request = net_request(guest(), 0, &options, Some(&live)).unwrap();
        let net = request.set.get("net0").and_then(Value::as_composite).unwrap();
        assert!(!net.contains_key("macaddr"));
        assert!(!request.set.contains_key("ipconfig0"));
    }

    #[test]
    fn test_net_request_rejects_bad_input() {
        let options = NetOptions {
            model: "rtl9999".into(),
            bridge: "vmbr0".into(),
            ..Default::default()
        };
        assert!(net_request(guest(), 0, &options, None).is_err());

        let options = NetOptions {
            model: "virtio".into(),
            bridge: "vmbr0".into(),
            ..Default::default()
        };
        assert!(net_request(guest(), 99, &options, None).is_err());
    }

    #[test]
    fn test_disk_request_only_for_empty_slot() {
        let device = StorageDevice::allocate("local-lvm", 32).with_option("discard", "on");
        let request = disk_request(guest(), 1, device.clone(), None).unwrap().unwrap();
        let scsi = request.set.get("scsi1").and_then(Value::as_composite).unwrap();
        assert_eq!(scsi.get("volume"), Some(&SubValue::from("local-lvm:32")));

        let taken = Value::from("local-lvm:vm-100-disk-1");
        assert!(disk_request(guest(), 1, device, Some(&taken)).unwrap().is_none());
    }

    #[test]
    fn test_cdrom_request() {
        let request = cdrom_request(guest(), "ide2", "local", "debian.iso").unwrap();
        let drive = request.set.get("ide2").and_then(Value::as_composite).unwrap();
        assert_eq!(drive.get("volume"), Some(&SubValue::from("local:iso/debian.iso")));
        assert_eq!(drive.get("media"), Some(&SubValue::from("cdrom")));

        let eject = cdrom_request(guest(), "ide2", "local", "none").unwrap();
        let drive = eject.set.get("ide2").and_then(Value::as_composite).unwrap();
        assert_eq!(drive.get("volume"), Some(&SubValue::from("none")));

        assert!(cdrom_request(guest(), "floppy0", "local", "none").is_err());
    }

    #[test]
    fn test_batch_file() {
        let batch = BatchFile::parse(
            r#"
            [[guest]]
            vmid = 100
            node = "pve1"
            delete = ["description"]

            [guest.set]
            memory = 4096
            onboot = true
            net1 = "virtio,bridge=vmbr1,tag=20"
            tags = ["web", "prod"]
            agent = { enabled = 1, fstrim_cloned_disks = 1 }

            [[guest]]
            vmid = 201
            kind = "lxc"
            digest = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(batch.guests.len(), 2);
        assert_eq!(batch.guests[1].kind, Some(GuestKind::Lxc));

        let request = batch.guests[0].request(guest()).unwrap();
        assert_eq!(request.set.get("memory"), Some(&Value::from("4096")));
        assert_eq!(request.set.get("onboot"), Some(&Value::from("1")));
        assert_eq!(request.set.get("tags"), Some(&Value::tags(["web", "prod"])));
        assert!(matches!(request.set.get("net1"), Some(Value::Composite(_))));
        assert!(matches!(request.set.get("agent"), Some(Value::Composite(_))));
        assert_eq!(request.delete, vec!["description"]);

        let second = batch.guests[1].request(GuestRef::lxc("pve1", 201)).unwrap();
        assert_eq!(second.expect_digest.as_deref(), Some("abc"));
        assert!(second.is_empty());
    }

    #[test]
    fn test_batch_file_errors() {
        assert!(BatchFile::parse("").is_err());
        assert!(BatchFile::parse("[[guest]]\nvmid = 1\nunknown = 2\n").is_err());

        let batch = BatchFile::parse("[[guest]]\nvmid = 1\n[guest.set]\nnet0 = \"virtio,firewall=maybe\"\n").unwrap();
        assert!(batch.guests[0].request(guest()).is_err());
    }
}
