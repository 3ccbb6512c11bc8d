//! Decoder for the platform's flat configuration strings.
//!
//! Handles the per-family grammars:
//! ```text
//! tags: uefi;debian11
//! affinity: 0,1,4
//! net0: virtio=AA:BB:CC:DD:EE:FF,bridge=vmbr0,firewall=1,tag=20,trunks=10;20;30
//! scsi0: local-lvm:vm-100-disk-0,cache=writeback,discard=on,size=32G
//! agent: 1,fstrim_cloned_disks=0
//! ```

use crate::error::{DecodeError, DecodeErrors};
use crate::registry::{self, FieldFamily};
use crate::types::{Composite, RawConfig, StructuredConfig, SubValue, Value};

/// Result type for single-value decoding.
pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decode a raw config into its structured form.
///
/// Every key is attempted. If any key fails, all failures are returned
/// together and no partial config is produced.
pub fn decode(raw: &RawConfig) -> std::result::Result<StructuredConfig, DecodeErrors> {
    let (config, errors) = decode_lenient(raw);
    if errors.is_empty() {
        Ok(config)
    } else {
        Err(DecodeErrors(errors))
    }
}

/// Decode every key that can be decoded, returning the failures alongside.
///
/// Failed keys are absent from the returned config, never defaulted.
pub fn decode_lenient(raw: &RawConfig) -> (StructuredConfig, Vec<DecodeError>) {
    let mut config = StructuredConfig::new();
    let mut errors = Vec::new();

    for (key, value) in raw.iter() {
        match decode_value(key, value) {
            Ok(decoded) => {
                config.insert(key, decoded);
            }
            Err(e) => {
                log::debug!("{e}");
                errors.push(e);
            }
        }
    }

    for flag in raw.flags() {
        config.insert(flag, Value::Flag);
    }

    (config, errors)
}

/// Decode a single raw value according to the family of its key.
pub fn decode_value(key: &str, raw: &str) -> Result<Value> {
    if registry::is_free_form(key) {
        return Ok(Value::Scalar(raw.to_string()));
    }

    let family = registry::classify(key);
    match family {
        FieldFamily::SemicolonList => Ok(Value::SemicolonList(
            raw.split(';')
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        FieldFamily::List => Ok(Value::List(split_list(raw))),
        FieldFamily::NetworkInterface | FieldFamily::StorageVolume | FieldFamily::AgentOptions => {
            decode_composite(key, raw, family).map(Value::Composite)
        }
        FieldFamily::Scalar => {
            if raw.contains('=') {
                decode_composite(key, raw, family).map(Value::Composite)
            } else if raw.contains(',') {
                Ok(Value::List(split_list(raw)))
            } else {
                Ok(Value::Scalar(raw.to_string()))
            }
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(',').map(str::to_string).collect()
}

/// Decode a comma-separated `sub-key=sub-value` composite.
fn decode_composite(key: &str, raw: &str, family: FieldFamily) -> Result<Composite> {
    let mut composite = Composite::new();

    for token in raw.split(',') {
        let fail = |reason: &str| DecodeError::new(key, raw, token, reason);

        if token.is_empty() {
            return Err(fail("empty token"));
        }

        let decoded = match token.split_once('=') {
            Some((sub_key, _)) if sub_key.is_empty() => return Err(fail("empty sub-key")),
            Some((sub_key, sub_value)) => coerce_pair(family, sub_key, sub_value),
            None => coerce_bare(family, token),
        }
        .map_err(|reason| fail(&reason))?;

        for (sub_key, sub_value) in decoded.into_pairs() {
            if composite.contains_key(&sub_key) {
                let reason = match family.primary_subkey() {
                    Some(primary) if primary == sub_key => format!("more than one bare {primary} token"),
                    _ => format!("duplicate sub-key `{sub_key}`"),
                };
                return Err(fail(&reason));
            }
            composite.insert(sub_key, sub_value);
        }
    }

    Ok(composite)
}

/// A decoded token: one sub-key, or the model/MAC pair of a network device.
enum Decoded {
    One(String, SubValue),
    ModelMac(String, String),
}

impl Decoded {
    fn into_pairs(self) -> Vec<(String, SubValue)> {
        match self {
            Self::One(k, v) => vec![(k, v)],
            Self::ModelMac(model, mac) => vec![
                ("model".to_string(), SubValue::Str(model)),
                ("macaddr".to_string(), SubValue::Str(mac)),
            ],
        }
    }
}

/// Apply family-specific coercion to a `sub-key=sub-value` token.
fn coerce_pair(family: FieldFamily, sub_key: &str, sub_value: &str) -> std::result::Result<Decoded, String> {
    let value = match (family, sub_key) {
        (FieldFamily::NetworkInterface, model) if registry::is_nic_model(model) => {
            if sub_value.is_empty() {
                return Err(format!("empty MAC address for model `{model}`"));
            }
            return Ok(Decoded::ModelMac(model.to_string(), sub_value.to_string()));
        }
        (FieldFamily::NetworkInterface, "model") => {
            if !registry::is_nic_model(sub_value) {
                return Err(format!("unknown NIC model `{sub_value}`"));
            }
            SubValue::Str(sub_value.to_string())
        }
        (FieldFamily::NetworkInterface, "firewall" | "link_down")
        | (FieldFamily::AgentOptions, "enabled" | "fstrim_cloned_disks") => {
            SubValue::Bool(parse_bool(sub_value)?)
        }
        (FieldFamily::NetworkInterface, "tag") => SubValue::Int(parse_int(sub_value)?),
        (FieldFamily::NetworkInterface, "trunks") => SubValue::IntList(
            sub_value
                .split(';')
                .map(parse_int)
                .collect::<std::result::Result<_, _>>()?,
        ),
        _ => SubValue::Str(sub_value.to_string()),
    };
    Ok(Decoded::One(sub_key.to_string(), value))
}

/// Interpret a token without `=`.
fn coerce_bare(family: FieldFamily, token: &str) -> std::result::Result<Decoded, String> {
    let (sub_key, value) = match family {
        FieldFamily::StorageVolume => ("volume", SubValue::Str(token.to_string())),
        FieldFamily::AgentOptions => ("enabled", SubValue::Bool(parse_bool(token)?)),
        FieldFamily::NetworkInterface if registry::is_nic_model(token) => {
            ("model", SubValue::Str(token.to_string()))
        }
        _ => (token, SubValue::Flag),
    };
    Ok(Decoded::One(sub_key.to_string(), value))
}

/// Parse a platform boolean. The platform writes `0`/`1` but accepts the
/// usual spellings on input.
pub(crate) fn parse_bool(s: &str) -> std::result::Result<bool, String> {
    match s.to_ascii_lowercase().as_str() {
        "1" | "on" | "yes" | "true" => Ok(true),
        "0" | "off" | "no" | "false" => Ok(false),
        _ => Err(format!("expected 0 or 1, got `{s}`")),
    }
}

fn parse_int(s: &str) -> std::result::Result<i64, String> {
    s.parse()
        .map_err(|_| format!("expected an integer, got `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn composite(key: &str, raw: &str) -> Composite {
        match decode_value(key, raw).unwrap() {
            Value::Composite(c) => c,
            other => panic!("expected composite for {key}, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_network_interface() {
        let net = composite("net0", "virtio=AA:BB:CC:DD:EE:FF,firewall=1,tag=20,trunks=10;20;30");

        assert_eq!(net.get("model"), Some(&SubValue::Str("virtio".into())));
        assert_eq!(net.get("macaddr"), Some(&SubValue::Str("AA:BB:CC:DD:EE:FF".into())));
        assert_eq!(net.get("firewall"), Some(&SubValue::Bool(true)));
        assert_eq!(net.get("tag"), Some(&SubValue::Int(20)));
        assert_eq!(net.get("trunks"), Some(&SubValue::IntList(vec![10, 20, 30])));
        assert_eq!(net.len(), 5);
    }

    #[test]
    fn test_decode_network_passes_unknown_subkeys() {
        let net = composite("net1", "e1000=BC:24:11:00:00:01,bridge=vmbr0,rate=12.5,queues=4");
        assert_eq!(net.get("model").and_then(SubValue::as_str), Some("e1000"));
        assert_eq!(net.get("bridge").and_then(SubValue::as_str), Some("vmbr0"));
        assert_eq!(net.get("rate").and_then(SubValue::as_str), Some("12.5"));
        assert_eq!(net.get("queues").and_then(SubValue::as_str), Some("4"));
    }

    #[test]
    fn test_decode_storage_with_options() {
        let disk = composite("scsi0", "local-lvm:32,cache=writeback,discard=on");
        assert_eq!(disk.get("volume").and_then(SubValue::as_str), Some("local-lvm:32"));
        assert_eq!(disk.get("cache").and_then(SubValue::as_str), Some("writeback"));
        assert_eq!(disk.get("discard").and_then(SubValue::as_str), Some("on"));
        assert_eq!(disk.len(), 3);
    }

    #[test]
    fn test_decode_storage_bare_volume() {
        let disk = composite("scsi1", "local-lvm:vm-100-disk-0");
        assert_eq!(disk, Composite::new().with("volume", "local-lvm:vm-100-disk-0"));
    }

    #[test]
    fn test_decode_storage_keeps_named_file() {
        let cdrom = composite("ide2", "file=local:iso/debian.iso,media=cdrom");
        assert_eq!(cdrom.get("file").and_then(SubValue::as_str), Some("local:iso/debian.iso"));
        assert!(!cdrom.contains_key("volume"));
    }

    #[test]
    fn test_decode_tags() {
        assert_eq!(
            decode_value("tags", "uefi;debian11").unwrap(),
            Value::tags(["uefi", "debian11"])
        );
        assert_eq!(decode_value("tags", "").unwrap(), Value::SemicolonList(vec![]));
    }

    #[test]
    fn test_decode_agent() {
        let agent = composite("agent", "1,fstrim_cloned_disks=0");
        assert_eq!(
            agent,
            Composite::new().with("enabled", true).with("fstrim_cloned_disks", false)
        );

        let bare = composite("agent", "0");
        assert_eq!(bare, Composite::new().with("enabled", false));
    }

    #[test]
    fn test_decode_plain_list_and_scalar() {
        assert_eq!(
            decode_value("affinity", "0,1,4").unwrap(),
            Value::List(vec!["0".into(), "1".into(), "4".into()])
        );
        assert_eq!(
            decode_value("serial0", "socket,vga").unwrap(),
            Value::List(vec!["socket".into(), "vga".into()])
        );
        assert_eq!(decode_value("memory", "2048").unwrap(), Value::Scalar("2048".into()));
    }

    #[test]
    fn test_decode_generic_composite() {
        let ipconfig = composite("ipconfig0", "ip=10.0.0.5/24,gw=10.0.0.1");
        assert_eq!(ipconfig.get("ip").and_then(SubValue::as_str), Some("10.0.0.5/24"));

        let boot = composite("boot", "order=scsi0;net0");
        assert_eq!(boot.get("order").and_then(SubValue::as_str), Some("scsi0;net0"));
    }

    #[test]
    fn test_decode_bare_token_is_flag() {
        let vga = composite("vga", "serial0,memory=16");
        assert_eq!(vga.get("serial0"), Some(&SubValue::Flag));
        assert_eq!(vga.get("memory").and_then(SubValue::as_str), Some("16"));
    }

    #[test]
    fn test_decode_free_form_kept_verbatim() {
        let description = "owner=ops, tier=1";
        assert_eq!(
            decode_value("description", description).unwrap(),
            Value::Scalar(description.into())
        );
        assert_eq!(
            decode_value("args", "-cpu host,+kvm_pv_eoi").unwrap(),
            Value::Scalar("-cpu host,+kvm_pv_eoi".into())
        );
    }

    #[test]
    fn test_decode_splits_on_first_equals() {
        let cicustom = composite("cicustom", "user=local:snippets/u.yml=x");
        assert_eq!(
            cicustom.get("user").and_then(SubValue::as_str),
            Some("local:snippets/u.yml=x")
        );
    }

    #[test]
    fn test_decode_errors_carry_context() {
        let err = decode_value("net0", "virtio=AA:BB:CC:DD:EE:FF,firewall=maybe").unwrap_err();
        assert_eq!(err.key, "net0");
        assert_eq!(err.raw_value, "virtio=AA:BB:CC:DD:EE:FF,firewall=maybe");
        assert_eq!(err.token, "firewall=maybe");

        let err = decode_value("net0", "virtio=AA:BB:CC:DD:EE:FF,trunks=10;x").unwrap_err();
        assert_eq!(err.token, "trunks=10;x");

        let err = decode_value("net0", "virtio=AA:BB:CC:DD:EE:FF,tag=vlan20").unwrap_err();
        assert_eq!(err.token, "tag=vlan20");
    }

    #[test]
    fn test_decode_rejects_malformed_composites() {
        assert!(decode_value("scsi0", "local:1,,cache=none").is_err());
        assert!(decode_value("scsi0", "local:1,=none").is_err());
        assert!(decode_value("scsi0", "local:1,local:2").is_err());
        assert!(decode_value("scsi0", "").is_err());
        assert!(decode_value("net0", "virtio=AA,model=e1000").is_err());
        assert!(decode_value("net0", "model=bogus").is_err());
        assert!(decode_value("agent", "maybe").is_err());
        assert!(decode_value("ipconfig0", "ip=dhcp,ip=10.0.0.1/24").is_err());
    }

    #[test]
    fn test_decode_collects_every_failing_key() {
        let raw = RawConfig::new()
            .with("memory", "2048")
            .with("net0", "virtio=AA,firewall=2")
            .with("agent", "yes please")
            .with_digest("d1");

        let errors = decode(&raw).unwrap_err();
        assert_eq!(errors.keys(), vec!["agent", "net0"]);

        let (partial, errors) = decode_lenient(&raw);
        assert_eq!(errors.len(), 2);
        assert_eq!(partial.len(), 1);
        assert_eq!(partial.get("memory"), Some(&Value::Scalar("2048".into())));
    }

    #[test]
    fn test_decode_does_not_mutate_input_and_keeps_flags() {
        let mut raw = RawConfig::new().with("cores", "4");
        raw.insert_flag("delete-me");
        let before = raw.clone();

        let config = decode(&raw).unwrap();
        assert_eq!(raw, before);
        assert_eq!(config.get("delete-me"), Some(&Value::Flag));
        assert_eq!(config.get("cores"), Some(&Value::Scalar("4".into())));
    }
}
