//! Encoder producing the platform's flat write parameters.
//!
//! The inverse of the decoder for every value it produces. Composite values
//! put the family's primary token first and the remaining sub-keys in sorted
//! order, so encoding is deterministic.

use crate::error::EncodeError;
use crate::registry::{self, FieldFamily};
use crate::types::{Composite, RawConfig, StructuredConfig, SubValue, Value};

/// Result type for encoding.
pub type Result<T> = std::result::Result<T, EncodeError>;

/// Encode a sparse structured fragment into raw write parameters.
///
/// [`Value::Flag`] entries become bare flags of the returned config.
pub fn encode(fragment: &StructuredConfig) -> Result<RawConfig> {
    let mut raw = RawConfig::new();

    for (key, value) in fragment.iter() {
        match encode_value(key, value)? {
            Some(encoded) => {
                raw.insert(key, encoded);
            }
            None => raw.insert_flag(key),
        }
    }

    Ok(raw)
}

/// Encode one value. Returns `None` for a bare flag.
pub fn encode_value(key: &str, value: &Value) -> Result<Option<String>> {
    if key.is_empty() {
        return Err(EncodeError::EmptyKey { key: String::new() });
    }

    let encoded = match value {
        Value::Scalar(s) => s.clone(),
        Value::List(items) | Value::SemicolonList(items) => {
            join_checked(key, items, list_separator(key, value)?)?
        }
        Value::Composite(composite) => {
            let family = registry::classify(key);
            if registry::is_free_form(key) || matches!(family, FieldFamily::List | FieldFamily::SemicolonList) {
                return Err(mismatch(key, value));
            }
            encode_composite(key, composite)?
        }
        Value::Flag => return Ok(None),
    };
    Ok(Some(encoded))
}

/// Separator the key's family reads lists back with.
///
/// Keys without a list family only take the comma form, which the decoder
/// recognizes by content.
fn list_separator(key: &str, value: &Value) -> Result<char> {
    if registry::is_free_form(key) {
        return Err(mismatch(key, value));
    }
    match (registry::classify(key), value) {
        (FieldFamily::SemicolonList, _) => Ok(';'),
        (FieldFamily::List, _) | (FieldFamily::Scalar, Value::List(_)) => Ok(','),
        _ => Err(mismatch(key, value)),
    }
}

fn mismatch(key: &str, value: &Value) -> EncodeError {
    EncodeError::FamilyMismatch {
        key: key.to_string(),
        family: registry::classify(key),
        kind: value.kind(),
    }
}

fn join_checked(key: &str, items: &[String], separator: char) -> Result<String> {
    if let Some(item) = items.iter().find(|item| item.contains(separator)) {
        return Err(EncodeError::Separator {
            key: key.to_string(),
            part: "list item",
            value: item.clone(),
            separator,
        });
    }
    Ok(items.join(&separator.to_string()))
}

fn encode_composite(key: &str, composite: &Composite) -> Result<String> {
    if composite.is_empty() {
        return Err(EncodeError::EmptyComposite { key: key.to_string() });
    }

    let family = registry::classify(key);
    let mut tokens = Vec::with_capacity(composite.len());
    let mut consumed: Vec<&str> = Vec::new();

    match family {
        FieldFamily::NetworkInterface => {
            if let Some(model) = composite.get("model") {
                let model = model.to_string();
                if !registry::is_nic_model(&model) {
                    return Err(EncodeError::UnknownNicModel { key: key.to_string(), model });
                }
                match composite.get("macaddr") {
                    Some(mac) => {
                        let mac = render(key, "macaddr", mac)?;
                        tokens.push(format!("{model}={mac}"));
                        consumed.push("macaddr");
                    }
                    None => tokens.push(format!("model={model}")),
                }
                consumed.push("model");
            }
        }
        FieldFamily::StorageVolume | FieldFamily::AgentOptions => {
            if let Some(primary) = family.primary_subkey()
                && let Some(value) = composite.get(primary)
            {
                tokens.push(render(key, primary, value)?);
                consumed.push(primary);
            }
        }
        FieldFamily::Scalar | FieldFamily::List | FieldFamily::SemicolonList => {}
    }

    for (sub_key, value) in composite.iter() {
        if consumed.contains(&sub_key) {
            continue;
        }
        check_sub_key(key, sub_key)?;
        match value {
            SubValue::Flag => tokens.push(sub_key.to_string()),
            other => tokens.push(format!("{sub_key}={}", render(key, sub_key, other)?)),
        }
    }

    Ok(tokens.join(","))
}

fn check_sub_key(key: &str, sub_key: &str) -> Result<()> {
    if sub_key.is_empty() {
        return Err(EncodeError::EmptyKey { key: key.to_string() });
    }
    if let Some(separator) = [',', '='].into_iter().find(|c| sub_key.contains(*c)) {
        return Err(EncodeError::Separator {
            key: key.to_string(),
            part: "sub-key",
            value: sub_key.to_string(),
            separator,
        });
    }
    Ok(())
}

/// Render a sub-value, rejecting text that would split into extra tokens.
fn render(key: &str, sub_key: &str, value: &SubValue) -> Result<String> {
    let separator_error = |value: &str, separator| EncodeError::Separator {
        key: key.to_string(),
        part: "sub-value",
        value: format!("{sub_key}={value}"),
        separator,
    };

    if let SubValue::StrList(items) = value
        && let Some(item) = items.iter().find(|item| item.contains(';'))
    {
        return Err(separator_error(item, ';'));
    }

    let rendered = value.to_string();
    if rendered.contains(',') {
        return Err(separator_error(&rendered, ','));
    }
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decoder::{decode, decode_value};

    fn encoded(key: &str, value: impl Into<Value>) -> String {
        encode_value(key, &value.into()).unwrap().unwrap()
    }

    #[test]
    fn test_encode_network_interface() {
        let net = Composite::new()
            .with("model", "virtio")
            .with("macaddr", "AA:BB:CC:DD:EE:FF")
            .with("bridge", "vmbr0")
            .with("firewall", true)
            .with("tag", 20_i64)
            .with("trunks", vec![10_i64, 20, 30]);

        assert_eq!(
            encoded("net0", net),
            "virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,firewall=1,tag=20,trunks=10;20;30"
        );
    }

    #[test]
    fn test_encode_network_without_mac() {
        let net = Composite::new().with("model", "e1000").with("bridge", "vmbr1");
        assert_eq!(encoded("net3", net), "model=e1000,bridge=vmbr1");
    }

    #[test]
    fn test_encode_storage_volume_first() {
        let disk = Composite::new()
            .with("volume", "local-lvm:32")
            .with("discard", "on")
            .with("cache", "writeback");
        assert_eq!(encoded("scsi0", disk), "local-lvm:32,cache=writeback,discard=on");
    }

    #[test]
    fn test_encode_agent() {
        let agent = Composite::new().with("enabled", true).with("fstrim_cloned_disks", false);
        assert_eq!(encoded("agent", agent), "1,fstrim_cloned_disks=0");
    }

    #[test]
    fn test_encode_lists() {
        assert_eq!(encoded("tags", Value::tags(["uefi", "debian11"])), "uefi;debian11");
        assert_eq!(
            encoded("affinity", Value::List(vec!["0".into(), "2".into()])),
            "0,2"
        );
    }

    #[test]
    fn test_encode_list_separator_follows_key_family() {
        let items = vec!["web".to_string(), "prod".to_string()];
        assert_eq!(encoded("tags", Value::List(items.clone())), "web;prod");
        assert_eq!(encoded("affinity", Value::SemicolonList(vec!["0".into(), "2".into()])), "0,2");
        assert_eq!(encoded("boot-order", Value::List(items.clone())), "web,prod");

        assert!(matches!(
            encode_value("ostype", &Value::SemicolonList(items.clone())),
            Err(EncodeError::FamilyMismatch { family: FieldFamily::Scalar, .. })
        ));
        assert!(matches!(
            encode_value("net0", &Value::List(items.clone())),
            Err(EncodeError::FamilyMismatch { family: FieldFamily::NetworkInterface, .. })
        ));
        assert!(encode_value("description", &Value::List(items)).is_err());
        assert!(encode_value("tags", &Value::Composite(Composite::new().with("a", "b"))).is_err());
    }

    #[test]
    fn test_encode_scalars_and_flags() {
        let fragment = StructuredConfig::new()
            .with("memory", 4096_i64)
            .with("onboot", true)
            .with("description", "a=b, c")
            .with("reset-flag", Value::Flag);
        let raw = encode(&fragment).unwrap();

        assert_eq!(raw.get("memory"), Some("4096"));
        assert_eq!(raw.get("onboot"), Some("1"));
        assert_eq!(raw.get("description"), Some("a=b, c"));
        assert!(raw.is_flag("reset-flag"));
        assert!(raw.digest.is_none());
    }

    #[test]
    fn test_encode_rejects_corrupting_values() {
        let bad_tag = Value::tags(["ok", "no;pe"]);
        assert!(matches!(
            encode_value("tags", &bad_tag),
            Err(EncodeError::Separator { separator: ';', .. })
        ));

        let bad_sub = Value::Composite(Composite::new().with("volume", "local:1,cache=none"));
        assert!(matches!(
            encode_value("scsi0", &bad_sub),
            Err(EncodeError::Separator { separator: ',', .. })
        ));

        let bad_key = Value::Composite(Composite::new().with("a=b", "c"));
        assert!(encode_value("ipconfig0", &bad_key).is_err());

        let bad_model = Value::Composite(Composite::new().with("model", "rtl9999"));
        assert!(matches!(
            encode_value("net0", &bad_model),
            Err(EncodeError::UnknownNicModel { .. })
        ));

        assert!(matches!(
            encode_value("scsi0", &Value::Composite(Composite::new())),
            Err(EncodeError::EmptyComposite { .. })
        ));
        assert!(matches!(
            encode_value("", &Value::from("x")),
            Err(EncodeError::EmptyKey { .. })
        ));
    }

    #[test]
    fn test_sub_value_may_contain_equals() {
        let cicustom = Composite::new().with("user", "local:snippets/u.yml=x");
        assert_eq!(encoded("cicustom", cicustom), "user=local:snippets/u.yml=x");
    }

    #[test]
    fn test_round_trip_through_raw() {
        let fragment = StructuredConfig::new()
            .with(
                "net0",
                Composite::new()
                    .with("model", "virtio")
                    .with("macaddr", "BC:24:11:2E:7A:01")
                    .with("bridge", "vmbr0")
                    .with("firewall", false)
                    .with("tag", 30_i64)
                    .with("trunks", vec![1_i64, 2]),
            )
            .with(
                "scsi0",
                Composite::new().with("volume", "local-lvm:vm-100-disk-0").with("size", "32G"),
            )
            .with("scsi1", Composite::new().with("volume", "ceph:vm-100-disk-1"))
            .with("agent", Composite::new().with("enabled", true).with("fstrim_cloned_disks", true))
            .with("tags", Value::tags(["prod", "web"]))
            .with("affinity", Value::List(vec!["0".into(), "1".into()]))
            .with("ipconfig0", Composite::new().with("ip", "dhcp").with("ip6", "auto"))
            .with("memory", "2048")
            .with("description", "owner=ops,tier=1");

        let mut raw = RawConfig::new().with("name", "web01").with("cores", "2").with_digest("d0");
        raw.merge(&encode(&fragment).unwrap());
        let decoded = decode(&raw).unwrap();

        for (key, value) in fragment.iter() {
            assert_eq!(decoded.get(key), Some(value), "{key}");
        }
        assert_eq!(decoded.get("name"), Some(&Value::from("web01")));
    }

    #[test]
    fn test_reencode_decoded_values() {
        for (key, raw) in [
            ("net0", "virtio=AA:BB:CC:DD:EE:FF,firewall=1,tag=20,trunks=10;20;30"),
            ("scsi0", "local-lvm:32,cache=writeback,discard=on"),
            ("scsi1", "local-lvm:vm-100-disk-0"),
            ("tags", "uefi;debian11"),
            ("agent", "1,fstrim_cloned_disks=0"),
            ("affinity", "0,1,4"),
            ("vga", "serial0,memory=16"),
        ] {
            let value = decode_value(key, raw).unwrap();
            let again = encode_value(key, &value).unwrap().unwrap();
            assert_eq!(decode_value(key, &again).unwrap(), value, "{key}");
        }
    }
}
