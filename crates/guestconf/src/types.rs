//! Core value types for guest configuration.
//!
//! [`RawConfig`] is the platform's flat wire form, [`StructuredConfig`] is the
//! decoded form that mutating code is allowed to inspect and diff.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Key the platform uses for the configuration version token.
pub const DIGEST_KEY: &str = "digest";

/// Flat configuration mapping as stored by the platform.
///
/// Every value is a single string. Bare flags (a key with no value) only occur
/// in write fragments produced by the encoder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawConfig {
    entries: BTreeMap<String, String>,
    flags: BTreeSet<String>,
    /// Opaque version token returned with a read, if the source supports it.
    pub digest: Option<String>,
}

impl RawConfig {
    /// Create an empty raw config without a digest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a digest.
    pub fn with_digest(mut self, digest: impl Into<String>) -> Self {
        self.digest = Some(digest.into());
        self
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set a key to a value, replacing a previous value or flag.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        self.flags.remove(&key);
        self.entries.insert(key, value.into())
    }

    /// Set a key as a bare flag (present, no value).
    pub fn insert_flag(&mut self, key: impl Into<String>) {
        let key = key.into();
        self.entries.remove(&key);
        self.flags.insert(key);
    }

    /// Get the value of a key. Flags have no value and return `None`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Whether the key is present as a bare flag.
    pub fn is_flag(&self, key: &str) -> bool {
        self.flags.contains(key)
    }

    /// Whether the key is present, as a value or as a flag.
    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key) || self.flags.contains(key)
    }

    /// Remove a key. Returns true if it was present.
    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some() | self.flags.remove(key)
    }

    /// Iterate over valued entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Iterate over bare flags in key order.
    pub fn flags(&self) -> impl Iterator<Item = &str> {
        self.flags.iter().map(String::as_str)
    }

    /// All keys (values and flags), sorted.
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self
            .entries
            .keys()
            .chain(self.flags.iter())
            .map(String::as_str)
            .collect();
        keys.sort_unstable();
        keys
    }

    /// Number of keys, flags included.
    pub fn len(&self) -> usize {
        self.entries.len() + self.flags.len()
    }

    /// Whether there are no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.flags.is_empty()
    }

    /// Overlay another raw config onto this one, key by key.
    ///
    /// The digest of `self` is kept.
    pub fn merge(&mut self, other: &RawConfig) {
        for (key, value) in other.iter() {
            self.insert(key, value);
        }
        for flag in other.flags() {
            self.insert_flag(flag);
        }
    }

    /// Build from a JSON object as returned by the platform API.
    ///
    /// Strings are kept as-is, numbers are rendered in decimal, booleans as
    /// `0`/`1`. Arrays and objects are kept as their JSON text. `null` entries
    /// are skipped. The `digest` entry is lifted into [`RawConfig::digest`].
    pub fn from_json_object(object: &serde_json::Map<String, serde_json::Value>) -> Self {
        let mut raw = Self::new();
        for (key, value) in object {
            let rendered = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
                serde_json::Value::Number(n) => n.to_string(),
                other => other.to_string(),
            };
            if key == DIGEST_KEY {
                raw.digest = Some(rendered);
            } else {
                raw.insert(key.clone(), rendered);
            }
        }
        raw
    }

    /// Render as a JSON object. The digest is included under `digest`,
    /// flags are rendered as `null`.
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = serde_json::Map::new();
        for (key, value) in self.iter() {
            object.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
        for flag in self.flags() {
            object.insert(flag.to_string(), serde_json::Value::Null);
        }
        if let Some(digest) = &self.digest {
            object.insert(DIGEST_KEY.to_string(), serde_json::Value::String(digest.clone()));
        }
        serde_json::Value::Object(object)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut raw = Self::new();
        for (key, value) in iter {
            raw.insert(key, value);
        }
        raw
    }
}

/// A typed sub-value inside a composite device value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum SubValue {
    /// `0`/`1` on the wire
    Bool(bool),
    /// Decimal integer
    Int(i64),
    /// Anything else, verbatim
    Str(String),
    /// `;`-separated integers (e.g. VLAN trunks)
    IntList(Vec<i64>),
    /// `;`-separated strings
    StrList(Vec<String>),
    /// Bare token with no value
    Flag,
}

impl SubValue {
    /// String content, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content, if this is a bool.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integer content, if this is an int.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }
}

impl From<bool> for SubValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for SubValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for SubValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for SubValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for SubValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<Vec<i64>> for SubValue {
    fn from(value: Vec<i64>) -> Self {
        Self::IntList(value)
    }
}

impl From<Vec<String>> for SubValue {
    fn from(value: Vec<String>) -> Self {
        Self::StrList(value)
    }
}

impl fmt::Display for SubValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{}", u8::from(*b)),
            Self::Int(i) => write!(f, "{i}"),
            Self::Str(s) => write!(f, "{s}"),
            Self::IntList(items) => {
                let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
                write!(f, "{}", parts.join(";"))
            }
            Self::StrList(items) => write!(f, "{}", items.join(";")),
            Self::Flag => Ok(()),
        }
    }
}

/// Sub-key to sub-value mapping of a composite device value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Composite(BTreeMap<String, SubValue>);

impl Composite {
    /// Create an empty composite.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<SubValue>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Insert a sub-value, returning the previous one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<SubValue>) -> Option<SubValue> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&SubValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<SubValue> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SubValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<SubValue>> FromIterator<(K, V)> for Composite {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// A decoded configuration value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain string
    Scalar(String),
    /// Comma-separated list
    List(Vec<String>),
    /// Semicolon-separated list (tags)
    SemicolonList(Vec<String>),
    /// Comma-separated `key=value` tokens
    Composite(Composite),
    /// Key present without a value (write-only toggle)
    Flag,
}

impl Value {
    /// A tag list.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::SemicolonList(tags.into_iter().map(Into::into).collect())
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Items of either list variant.
    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            Self::List(items) | Self::SemicolonList(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_composite(&self) -> Option<&Composite> {
        match self {
            Self::Composite(c) => Some(c),
            _ => None,
        }
    }

    /// Short name of the variant, for messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::List(_) => "list",
            Self::SemicolonList(_) => "semicolon-list",
            Self::Composite(_) => "composite",
            Self::Flag => "flag",
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Scalar(if value { "1" } else { "0" }.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Scalar(value.to_string())
    }
}

impl From<Composite> for Value {
    fn from(value: Composite) -> Self {
        Self::Composite(value)
    }
}

/// Decoded configuration: key to typed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct StructuredConfig(BTreeMap<String, Value>);

impl StructuredConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Copy of the entries whose key is in `keys`.
    pub fn subset<'a>(&self, keys: impl IntoIterator<Item = &'a str>) -> Self {
        keys.into_iter()
            .filter_map(|k| self.0.get(k).map(|v| (k.to_string(), v.clone())))
            .collect()
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for StructuredConfig {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl IntoIterator for StructuredConfig {
    type Item = (String, Value);
    type IntoIter = std::collections::btree_map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
