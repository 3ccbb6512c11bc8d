//! Field grammar registry.
//!
//! Static tables mapping configuration keys to the grammar family that
//! decodes and encodes them. The codec only ever asks this module; new slot
//! ranges, singleton devices or NIC models are added here.

use serde::Serialize;
use std::fmt;

/// Revision of the tables below. Bump when a table changes.
pub const REVISION: u32 = 1;

/// Grammar class of a configuration key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FieldFamily {
    /// Free-form scalar, also the fallback for unknown keys
    Scalar,
    /// Comma-separated list
    List,
    /// Semicolon-separated list (tags)
    SemicolonList,
    /// `netN` slot
    NetworkInterface,
    /// Disk or volume slot
    StorageVolume,
    /// Guest agent options
    AgentOptions,
}

impl FieldFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scalar => "scalar",
            Self::List => "list",
            Self::SemicolonList => "semicolon-list",
            Self::NetworkInterface => "network-interface",
            Self::StorageVolume => "storage-volume",
            Self::AgentOptions => "agent-options",
        }
    }

    /// Sub-key a bare token is assigned to, for families that have one.
    pub fn primary_subkey(&self) -> Option<&'static str> {
        match self {
            Self::StorageVolume => Some("volume"),
            Self::AgentOptions => Some("enabled"),
            _ => None,
        }
    }

    /// Sub-keys the platform fills in on its own when a write omits them.
    pub fn platform_filled(&self) -> &'static [&'static str] {
        match self {
            Self::NetworkInterface => &["macaddr"],
            Self::StorageVolume => &["size"],
            _ => &[],
        }
    }
}

impl fmt::Display for FieldFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indexed slot range such as `scsi0..scsi30`.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SlotRange {
    pub prefix: &'static str,
    pub count: u32,
    pub family: FieldFamily,
}

impl SlotRange {
    /// Key names in this range, in index order.
    pub fn keys(&self) -> impl Iterator<Item = String> + '_ {
        (0..self.count).map(|i| format!("{}{}", self.prefix, i))
    }
}

const SLOT_RANGES: &[SlotRange] = &[
    SlotRange { prefix: "net", count: 32, family: FieldFamily::NetworkInterface },
    SlotRange { prefix: "ide", count: 4, family: FieldFamily::StorageVolume },
    SlotRange { prefix: "sata", count: 6, family: FieldFamily::StorageVolume },
    SlotRange { prefix: "scsi", count: 31, family: FieldFamily::StorageVolume },
    SlotRange { prefix: "virtio", count: 16, family: FieldFamily::StorageVolume },
];

const NAMED_KEYS: &[(&str, FieldFamily)] = &[
    ("efidisk0", FieldFamily::StorageVolume),
    ("tpmstate0", FieldFamily::StorageVolume),
    ("agent", FieldFamily::AgentOptions),
    ("tags", FieldFamily::SemicolonList),
    ("affinity", FieldFamily::List),
];

/// Scalars that may legitimately contain `=` or `,` and are never split.
const FREE_FORM_SCALARS: &[&str] = &[
    "args",
    "description",
    "hookscript",
    "name",
    "nameserver",
    "searchdomain",
    "sshkeys",
];

const NIC_MODELS: &[&str] = &[
    "e1000",
    "e1000-82540em",
    "e1000-82544gc",
    "e1000-82545em",
    "e1000e",
    "i82551",
    "i82557b",
    "i82559er",
    "ne2k_isa",
    "ne2k_pci",
    "pcnet",
    "rtl8139",
    "virtio",
    "vmxnet3",
];

/// Resolve the grammar family of a configuration key.
///
/// Total and deterministic: unknown keys are [`FieldFamily::Scalar`].
pub fn classify(key: &str) -> FieldFamily {
    if let Some((_, family)) = NAMED_KEYS.iter().find(|(name, _)| *name == key) {
        return *family;
    }
    slot_range(key).map_or(FieldFamily::Scalar, |range| range.family)
}

/// Whether the key is a free-form scalar kept verbatim by the decoder.
pub fn is_free_form(key: &str) -> bool {
    FREE_FORM_SCALARS.contains(&key)
}

pub fn is_network_slot(key: &str) -> bool {
    classify(key) == FieldFamily::NetworkInterface
}

pub fn is_storage_slot(key: &str) -> bool {
    classify(key) == FieldFamily::StorageVolume
}

pub fn is_nic_model(name: &str) -> bool {
    NIC_MODELS.contains(&name)
}

/// `net0` .. `net31`.
pub fn valid_network_slots() -> Vec<String> {
    keys_of(FieldFamily::NetworkInterface)
}

/// Indexed disk slots followed by `efidisk0` and `tpmstate0`.
pub fn valid_storage_slots() -> Vec<String> {
    keys_of(FieldFamily::StorageVolume)
}

/// Supported virtual NIC model names.
pub fn valid_nic_models() -> &'static [&'static str] {
    NIC_MODELS
}

/// The slot range table.
pub fn slot_ranges() -> &'static [SlotRange] {
    SLOT_RANGES
}

/// Singleton keys with a fixed family.
pub fn named_keys() -> &'static [(&'static str, FieldFamily)] {
    NAMED_KEYS
}

pub fn free_form_scalars() -> &'static [&'static str] {
    FREE_FORM_SCALARS
}

fn keys_of(family: FieldFamily) -> Vec<String> {
    let mut keys: Vec<String> = SLOT_RANGES
        .iter()
        .filter(|range| range.family == family)
        .flat_map(SlotRange::keys)
        .collect();
    keys.extend(
        NAMED_KEYS
            .iter()
            .filter(|(_, f)| *f == family)
            .map(|(name, _)| (*name).to_string()),
    );
    keys
}

/// Find the slot range a key like `scsi12` belongs to.
///
/// The index must be canonical decimal (`net01` is not a slot).
fn slot_range(key: &str) -> Option<&'static SlotRange> {
    let split = key.find(|c: char| c.is_ascii_digit())?;
    let (prefix, digits) = key.split_at(split);
    if !digits.bytes().all(|b| b.is_ascii_digit()) || (digits.len() > 1 && digits.starts_with('0'))
    {
        return None;
    }
    let index: u32 = digits.parse().ok()?;
    SLOT_RANGES
        .iter()
        .find(|range| range.prefix == prefix && index < range.count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_slots() {
        assert_eq!(classify("net0"), FieldFamily::NetworkInterface);
        assert_eq!(classify("net31"), FieldFamily::NetworkInterface);
        assert_eq!(classify("scsi30"), FieldFamily::StorageVolume);
        assert_eq!(classify("virtio15"), FieldFamily::StorageVolume);
        assert_eq!(classify("ide3"), FieldFamily::StorageVolume);
        assert_eq!(classify("sata5"), FieldFamily::StorageVolume);
        assert_eq!(classify("efidisk0"), FieldFamily::StorageVolume);
        assert_eq!(classify("tpmstate0"), FieldFamily::StorageVolume);
    }

    #[test]
    fn test_classify_out_of_range_falls_back_to_scalar() {
        assert_eq!(classify("net32"), FieldFamily::Scalar);
        assert_eq!(classify("ide4"), FieldFamily::Scalar);
        assert_eq!(classify("scsi31"), FieldFamily::Scalar);
        assert_eq!(classify("net01"), FieldFamily::Scalar);
        assert_eq!(classify("net"), FieldFamily::Scalar);
        assert_eq!(classify("efidisk1"), FieldFamily::Scalar);
        assert_eq!(classify("scsihw"), FieldFamily::Scalar);
        assert_eq!(classify("ipconfig0"), FieldFamily::Scalar);
    }

    #[test]
    fn test_classify_named_keys() {
        assert_eq!(classify("tags"), FieldFamily::SemicolonList);
        assert_eq!(classify("agent"), FieldFamily::AgentOptions);
        assert_eq!(classify("affinity"), FieldFamily::List);
        assert_eq!(classify("memory"), FieldFamily::Scalar);
    }

    #[test]
    fn test_valid_network_slots() {
        let slots = valid_network_slots();
        assert_eq!(slots.len(), 32);
        assert_eq!(slots.first().map(String::as_str), Some("net0"));
        assert_eq!(slots.last().map(String::as_str), Some("net31"));
    }

    #[test]
    fn test_valid_storage_slots() {
        let slots = valid_storage_slots();
        assert_eq!(slots.len(), 4 + 6 + 31 + 16 + 2);
        assert!(slots.contains(&"ide0".to_string()));
        assert!(slots.contains(&"sata5".to_string()));
        assert!(slots.contains(&"scsi30".to_string()));
        assert!(slots.contains(&"virtio15".to_string()));
        assert!(slots.contains(&"efidisk0".to_string()));
        assert!(slots.contains(&"tpmstate0".to_string()));
        assert!(!slots.contains(&"scsi31".to_string()));
    }

    #[test]
    fn test_every_listed_slot_classifies_back() {
        for slot in valid_storage_slots() {
            assert_eq!(classify(&slot), FieldFamily::StorageVolume, "{slot}");
        }
        for slot in valid_network_slots() {
            assert_eq!(classify(&slot), FieldFamily::NetworkInterface, "{slot}");
        }
    }

    #[test]
    fn test_nic_models() {
        assert_eq!(valid_nic_models().len(), 14);
        assert!(is_nic_model("virtio"));
        assert!(is_nic_model("e1000-82545em"));
        assert!(!is_nic_model("bridge"));
        assert!(!is_nic_model("firewall"));
    }

    #[test]
    fn test_family_metadata() {
        assert_eq!(FieldFamily::StorageVolume.primary_subkey(), Some("volume"));
        assert_eq!(FieldFamily::AgentOptions.primary_subkey(), Some("enabled"));
        assert_eq!(FieldFamily::NetworkInterface.primary_subkey(), None);
        assert_eq!(FieldFamily::NetworkInterface.platform_filled(), &["macaddr"]);
        assert!(is_free_form("description"));
        assert!(!is_free_form("net0"));
    }
}
