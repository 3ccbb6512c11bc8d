//! Typed views over composite device values.
//!
//! The codec works on untyped [`Composite`]s; these types give callers named
//! fields for the device classes they build by hand (NICs, disks, CD-ROMs,
//! cloud-init IP settings) and convert to and from composites.

use crate::error::DeviceError;
use crate::registry;
use crate::types::{Composite, SubValue};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A virtual NIC model from the registry's model table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NicModel(&'static str);

impl NicModel {
    pub const VIRTIO: Self = Self("virtio");
    pub const E1000: Self = Self("e1000");
    pub const VMXNET3: Self = Self("vmxnet3");

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    /// Every supported model.
    pub fn all() -> impl Iterator<Item = Self> {
        registry::valid_nic_models().iter().map(|name| Self(*name))
    }
}

impl Default for NicModel {
    fn default() -> Self {
        Self::VIRTIO
    }
}

impl fmt::Display for NicModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl FromStr for NicModel {
    type Err = DeviceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .find(|model| model.0 == s)
            .ok_or_else(|| DeviceError::new("model", format!("unknown NIC model `{s}`")))
    }
}

/// A network interface (`netN`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NetDevice {
    pub model: NicModel,
    /// Left unset to let the platform generate one
    pub macaddr: Option<String>,
    pub bridge: Option<String>,
    pub firewall: Option<bool>,
    /// VLAN id
    pub tag: Option<u16>,
    /// Allowed VLANs on a trunk port, in order
    pub trunks: Vec<u16>,
    /// Any other properties (`rate`, `queues`, `mtu`, ...)
    pub extra: BTreeMap<String, SubValue>,
}

impl NetDevice {
    pub fn new(model: NicModel) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn with_bridge(mut self, bridge: impl Into<String>) -> Self {
        self.bridge = Some(bridge.into());
        self
    }

    pub fn with_macaddr(mut self, macaddr: impl Into<String>) -> Self {
        self.macaddr = Some(macaddr.into());
        self
    }

    pub fn with_firewall(mut self, firewall: bool) -> Self {
        self.firewall = Some(firewall);
        self
    }

    pub fn with_tag(mut self, tag: u16) -> Self {
        self.tag = Some(tag);
        self
    }

    pub fn with_trunks(mut self, trunks: impl IntoIterator<Item = u16>) -> Self {
        self.trunks = trunks.into_iter().collect();
        self
    }

    pub fn to_composite(&self) -> Composite {
        let mut composite = Composite::new().with("model", self.model.as_str());
        if let Some(mac) = &self.macaddr {
            composite.insert("macaddr", mac.as_str());
        }
        if let Some(bridge) = &self.bridge {
            composite.insert("bridge", bridge.as_str());
        }
        if let Some(firewall) = self.firewall {
            composite.insert("firewall", firewall);
        }
        if let Some(tag) = self.tag {
            composite.insert("tag", u32::from(tag));
        }
        if !self.trunks.is_empty() {
            let trunks: Vec<i64> = self.trunks.iter().map(|t| i64::from(*t)).collect();
            composite.insert("trunks", trunks);
        }
        for (key, value) in &self.extra {
            composite.insert(key.as_str(), value.clone());
        }
        composite
    }
}

impl TryFrom<&Composite> for NetDevice {
    type Error = DeviceError;

    fn try_from(composite: &Composite) -> Result<Self, Self::Error> {
        let mut device = Self::default();
        for (key, value) in composite.iter() {
            match key {
                "model" => device.model = text(key, value)?.parse()?,
                "macaddr" => device.macaddr = Some(text(key, value)?.to_string()),
                "bridge" => device.bridge = Some(text(key, value)?.to_string()),
                "firewall" => {
                    device.firewall = Some(
                        value
                            .as_bool()
                            .ok_or_else(|| DeviceError::new(key, "expected a boolean"))?,
                    );
                }
                "tag" => device.tag = Some(vlan(key, value.as_int())?),
                "trunks" => match value {
                    SubValue::IntList(items) => {
                        device.trunks = items
                            .iter()
                            .map(|item| vlan(key, Some(*item)))
                            .collect::<Result<_, _>>()?;
                    }
                    _ => return Err(DeviceError::new(key, "expected a list of VLAN ids")),
                },
                other => {
                    device.extra.insert(other.to_string(), value.clone());
                }
            }
        }
        if !composite.contains_key("model") {
            return Err(DeviceError::new("model", "missing"));
        }
        Ok(device)
    }
}

fn text<'a>(key: &str, value: &'a SubValue) -> Result<&'a str, DeviceError> {
    value
        .as_str()
        .ok_or_else(|| DeviceError::new(key, "expected a string"))
}

fn vlan(key: &str, value: Option<i64>) -> Result<u16, DeviceError> {
    value
        .and_then(|v| u16::try_from(v).ok())
        .filter(|v| (1..=4094).contains(v))
        .ok_or_else(|| DeviceError::new(key, "expected a VLAN id between 1 and 4094"))
}

/// A disk or CD-ROM slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageDevice {
    /// Volume reference (`storage:volume`, `storage:size`, or `none`)
    pub volume: String,
    pub options: BTreeMap<String, String>,
}

impl StorageDevice {
    pub fn new(volume: impl Into<String>) -> Self {
        Self {
            volume: volume.into(),
            options: BTreeMap::new(),
        }
    }

    /// A new volume of `size_gb` gigabytes allocated on `storage`.
    pub fn allocate(storage: &str, size_gb: u32) -> Self {
        Self::new(format!("{storage}:{size_gb}"))
    }

    /// A CD-ROM drive with an ISO from `storage`, or an empty drive.
    pub fn cdrom(iso: Option<(&str, &str)>) -> Self {
        let volume = match iso {
            Some((storage, file)) => format!("{storage}:iso/{file}"),
            None => "none".to_string(),
        };
        Self::new(volume).with_option("media", "cdrom")
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn to_composite(&self) -> Composite {
        let mut composite = Composite::new().with("volume", self.volume.as_str());
        for (key, value) in &self.options {
            composite.insert(key.as_str(), value.as_str());
        }
        composite
    }
}

impl TryFrom<&Composite> for StorageDevice {
    type Error = DeviceError;

    fn try_from(composite: &Composite) -> Result<Self, Self::Error> {
        let (volume_key, volume) = ["volume", "file"]
            .into_iter()
            .find_map(|key| composite.get(key).map(|value| (key, value)))
            .ok_or_else(|| DeviceError::new("volume", "missing"))?;

        let mut device = Self::new(text(volume_key, volume)?);
        for (key, value) in composite.iter().filter(|(key, _)| *key != volume_key) {
            device.options.insert(key.to_string(), value.to_string());
        }
        Ok(device)
    }
}

/// Cloud-init IP configuration (`ipconfigN`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpConfig {
    /// IPv4 CIDR or `dhcp`
    pub ip: Option<String>,
    pub gw: Option<String>,
    /// IPv6 CIDR, `dhcp` or `auto`
    pub ip6: Option<String>,
    pub gw6: Option<String>,
}

impl IpConfig {
    pub fn is_empty(&self) -> bool {
        self.ip.is_none() && self.gw.is_none() && self.ip6.is_none() && self.gw6.is_none()
    }

    pub fn to_composite(&self) -> Composite {
        [
            ("ip", &self.ip),
            ("gw", &self.gw),
            ("ip6", &self.ip6),
            ("gw6", &self.gw6),
        ]
        .into_iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (key, v)))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_value, encode_value};
    use crate::types::Value;

    #[test]
    fn test_nic_model_parse() {
        assert_eq!("virtio".parse::<NicModel>().unwrap(), NicModel::VIRTIO);
        assert_eq!(
            "e1000-82545em".parse::<NicModel>().unwrap().as_str(),
            "e1000-82545em"
        );
        assert!("rtl9999".parse::<NicModel>().is_err());
        assert_eq!(NicModel::all().count(), 14);
    }

    #[test]
    fn test_net_device_encodes_like_platform() {
        let net = NetDevice::new(NicModel::VIRTIO)
            .with_macaddr("AA:BB:CC:DD:EE:FF")
            .with_bridge("vmbr0")
            .with_firewall(true)
            .with_tag(20)
            .with_trunks([10, 20, 30]);
        let encoded = encode_value("net0", &Value::Composite(net.to_composite()))
            .unwrap()
            .unwrap();
        assert_eq!(
            encoded,
            "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,firewall=1,tag=20,trunks=10;20;30"
        );
    }

    #[test]
    fn test_net_device_from_decoded() {
        let value = decode_value("net0", "e1000=BC:24:11:00:00:01,bridge=vmbr1,tag=7,queues=2").unwrap();
        let net = NetDevice::try_from(value.as_composite().unwrap()).unwrap();

        assert_eq!(net.model, NicModel::E1000);
        assert_eq!(net.macaddr.as_deref(), Some("BC:24:11:00:00:01"));
        assert_eq!(net.bridge.as_deref(), Some("vmbr1"));
        assert_eq!(net.tag, Some(7));
        assert_eq!(net.extra.get("queues"), Some(&SubValue::Str("2".into())));
        assert_eq!(NetDevice::try_from(&net.to_composite()).unwrap(), net);
    }

    #[test]
    fn test_net_device_rejects_bad_vlan() {
        let composite = Composite::new().with("model", "virtio").with("tag", 5000_i64);
        let err = NetDevice::try_from(&composite).unwrap_err();
        assert_eq!(err.field, "tag");

        let no_model = Composite::new().with("bridge", "vmbr0");
        assert!(NetDevice::try_from(&no_model).is_err());
    }

    #[test]
    fn test_storage_device() {
        let disk = StorageDevice::allocate("local-lvm", 32)
            .with_option("cache", "writeback")
            .with_option("discard", "on");
        let encoded = encode_value("scsi1", &Value::Composite(disk.to_composite()))
            .unwrap()
            .unwrap();
        assert_eq!(encoded, "local-lvm:32,cache=writeback,discard=on");

        let decoded = decode_value("scsi1", &encoded).unwrap();
        assert_eq!(StorageDevice::try_from(decoded.as_composite().unwrap()).unwrap(), disk);
    }

    #[test]
    fn test_cdrom() {
        let iso = StorageDevice::cdrom(Some(("local", "debian-12.iso")));
        assert_eq!(iso.volume, "local:iso/debian-12.iso");
        assert_eq!(iso.options.get("media").map(String::as_str), Some("cdrom"));

        let empty = StorageDevice::cdrom(None);
        assert_eq!(
            encode_value("ide2", &Value::Composite(empty.to_composite())).unwrap().unwrap(),
            "none,media=cdrom"
        );
    }

    #[test]
    fn test_storage_device_from_file_subkey() {
        let composite = Composite::new().with("file", "local:iso/x.iso").with("media", "cdrom");
        let device = StorageDevice::try_from(&composite).unwrap();
        assert_eq!(device.volume, "local:iso/x.iso");
        assert!(!device.options.contains_key("file"));
        assert_eq!(device.options.get("media").map(String::as_str), Some("cdrom"));
    }

    #[test]
    fn test_ip_config() {
        let ip = IpConfig {
            ip: Some("10.0.0.5/24".into()),
            gw: Some("10.0.0.1".into()),
            ..Default::default()
        };
        assert!(!ip.is_empty());
        assert_eq!(
            encode_value("ipconfig0", &Value::Composite(ip.to_composite())).unwrap().unwrap(),
            "gw=10.0.0.1,ip=10.0.0.5/24"
        );
        assert!(IpConfig::default().is_empty());
    }
}
