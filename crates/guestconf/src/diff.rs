//! Diff between a live configuration and a requested one.
//!
//! Comparison is request-relative: a composite matches when every requested
//! sub-key matches and the live value carries nothing else except sub-keys
//! the platform fills in itself (a NIC's generated MAC, a disk's size).

use crate::registry;
use crate::types::{Composite, RawConfig, StructuredConfig, Value};
use serde::Serialize;
use std::collections::BTreeSet;

/// Keys an update has to write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfigDiff {
    /// Requested values for keys that differ from the live config
    pub changed: StructuredConfig,
    /// Keys to delete that are present in the live config
    pub deleted: Vec<String>,
    /// Live values of every changed or deleted key that existed
    pub previous: StructuredConfig,
}

impl ConfigDiff {
    /// Compare a request against the live configuration.
    pub fn compute(live: &StructuredConfig, set: &StructuredConfig, delete: &[String]) -> Self {
        let mut diff = Self::default();

        for (key, requested) in set.iter() {
            let current = live.get(key);
            if equivalent(key, requested, current) {
                continue;
            }
            diff.changed.insert(key, requested.clone());
            if let Some(current) = current {
                diff.previous.insert(key, current.clone());
            }
        }

        for key in delete {
            if let Some(current) = live.get(key) {
                diff.deleted.push(key.clone());
                diff.previous.insert(key.as_str(), current.clone());
            }
        }

        diff
    }

    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deleted.is_empty()
    }

    /// Every key touched, sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .changed
            .keys()
            .chain(self.deleted.iter().map(String::as_str))
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for key in self.changed.keys() {
            if self.previous.contains_key(key) {
                summary.modifications += 1;
            } else {
                summary.additions += 1;
            }
        }
        summary.removals = self.deleted.len();
        summary
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    /// Keys to add
    pub additions: usize,
    /// Keys to modify
    pub modifications: usize,
    /// Keys to remove
    pub removals: usize,
}

impl DiffSummary {
    pub fn total(&self) -> usize {
        self.additions + self.modifications + self.removals
    }

    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}

/// Whether the live value already satisfies the requested one.
pub fn equivalent(key: &str, requested: &Value, live: Option<&Value>) -> bool {
    let Some(live) = live else {
        return false;
    };

    match (requested, live) {
        (Value::Composite(requested), Value::Composite(live)) => {
            composite_equivalent(key, requested, live)
        }
        (Value::SemicolonList(requested), Value::SemicolonList(live)) => {
            // The platform may reorder tags.
            requested.iter().collect::<BTreeSet<_>>() == live.iter().collect::<BTreeSet<_>>()
        }
        (requested, live) => requested == live,
    }
}

fn composite_equivalent(key: &str, requested: &Composite, live: &Composite) -> bool {
    let filled = registry::classify(key).platform_filled();

    requested
        .iter()
        .all(|(sub_key, value)| live.get(sub_key) == Some(value))
        && live
            .keys()
            .all(|sub_key| requested.contains_key(sub_key) || filled.contains(&sub_key))
}

/// Keys whose raw value differs between two reads, sorted.
pub fn changed_keys(before: &RawConfig, after: &RawConfig) -> Vec<String> {
    let keys: BTreeSet<&str> = before.keys().into_iter().chain(after.keys()).collect();
    keys.into_iter()
        .filter(|key| before.get(key) != after.get(key) || before.is_flag(key) != after.is_flag(key))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;

    fn live() -> StructuredConfig {
        decode(
            &RawConfig::new()
                .with("memory", "2048")
                .with("net0", "virtio=BC:24:11:AA:BB:CC,bridge=vmbr0,firewall=1")
                .with("scsi0", "local-lvm:vm-100-disk-0,cache=writeback,size=32G")
                .with("tags", "web;prod"),
        )
        .unwrap()
    }

    #[test]
    fn test_identical_request_is_empty() {
        let set = StructuredConfig::new()
            .with("memory", "2048")
            .with("tags", Value::tags(["prod", "web"]));
        let diff = ConfigDiff::compute(&live(), &set, &[]);
        assert!(diff.is_empty());
        assert!(!diff.summary().has_changes());
    }

    #[test]
    fn test_platform_filled_subkeys_are_ignored() {
        let set = StructuredConfig::new()
            .with(
                "net0",
                Composite::new().with("model", "virtio").with("bridge", "vmbr0").with("firewall", true),
            )
            .with(
                "scsi0",
                Composite::new().with("volume", "local-lvm:vm-100-disk-0").with("cache", "writeback"),
            );
        assert!(ConfigDiff::compute(&live(), &set, &[]).is_empty());
    }

    #[test]
    fn test_dropping_a_subkey_is_a_change() {
        let set = StructuredConfig::new().with(
            "net0",
            Composite::new().with("model", "virtio").with("bridge", "vmbr0"),
        );
        let diff = ConfigDiff::compute(&live(), &set, &[]);
        assert_eq!(diff.keys(), vec!["net0"]);
        assert!(diff.previous.contains_key("net0"));
    }

    #[test]
    fn test_changes_and_deletes() {
        let set = StructuredConfig::new().with("memory", "4096").with("cores", "2");
        let delete = vec!["tags".to_string(), "absent".to_string()];
        let diff = ConfigDiff::compute(&live(), &set, &delete);

        assert_eq!(diff.keys(), vec!["cores", "memory", "tags"]);
        assert_eq!(diff.deleted, vec!["tags"]);
        assert_eq!(
            diff.summary(),
            DiffSummary {
                additions: 1,
                modifications: 1,
                removals: 1
            }
        );
    }

    #[test]
    fn test_tags_compare_as_a_set() {
        let live = live();
        assert!(equivalent("tags", &Value::tags(["prod", "web"]), live.get("tags")));
        assert!(!equivalent("tags", &Value::tags(["web"]), live.get("tags")));
        assert!(!equivalent("tags", &Value::tags(["web", "prod", "db"]), live.get("tags")));

        let affinity = Value::List(vec!["0".into(), "1".into()]);
        let reordered = Value::List(vec!["1".into(), "0".into()]);
        assert!(!equivalent("affinity", &reordered, Some(&affinity)));
    }

    #[test]
    fn test_flag_only_matches_flag() {
        let live = StructuredConfig::new().with("onboot", "1").with("toggle", Value::Flag);
        assert!(!equivalent("onboot", &Value::Flag, live.get("onboot")));
        assert!(equivalent("toggle", &Value::Flag, live.get("toggle")));
        assert!(!equivalent("missing", &Value::Flag, None));
    }

    #[test]
    fn test_changed_keys() {
        let before = RawConfig::new().with("a", "1").with("b", "2").with("c", "3");
        let after = RawConfig::new().with("a", "1").with("b", "20").with("d", "4");
        assert_eq!(changed_keys(&before, &after), vec!["b", "c", "d"]);
    }
}
