//! Error types for the guest configuration codec and update protocol.
//!
//! Decode and encode errors always carry the key and the offending text so a
//! grammar problem can be reproduced from the message alone. Source errors are
//! categorized the same way for every transport so callers can decide on
//! retries without parsing strings.

use crate::registry::FieldFamily;
use crate::source::GuestRef;
use std::fmt;
use thiserror::Error;

/// A single configuration value that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot decode `{key}`: {reason} (token `{token}` in `{raw_value}`)")]
pub struct DecodeError {
    /// Configuration key
    pub key: String,
    /// Full raw value of the key
    pub raw_value: String,
    /// Token that failed
    pub token: String,
    /// What was wrong with it
    pub reason: String,
}

impl DecodeError {
    pub(crate) fn new(key: &str, raw_value: &str, token: &str, reason: impl Into<String>) -> Self {
        Self {
            key: key.to_string(),
            raw_value: raw_value.to_string(),
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

/// Every key that failed in one decode pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeErrors(pub Vec<DecodeError>);

impl DecodeErrors {
    /// Keys that failed, in order.
    pub fn keys(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.key.as_str()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DecodeError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DecodeErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "no decode errors"),
            [only] => write!(f, "{only}"),
            [first, rest @ ..] => write!(f, "{first} (and {} more)", rest.len()),
        }
    }
}

impl std::error::Error for DecodeErrors {}

impl From<DecodeError> for DecodeErrors {
    fn from(error: DecodeError) -> Self {
        Self(vec![error])
    }
}

/// A structured value that cannot be rendered in the wire format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// Empty configuration key or sub-key
    #[error("empty key in `{key}`")]
    EmptyKey {
        /// Enclosing configuration key (empty for a top-level key)
        key: String,
    },

    /// A value contains a character the wire format uses as a separator
    #[error("`{key}`: {part} `{value}` must not contain `{separator}`")]
    Separator {
        /// Configuration key
        key: String,
        /// Which part of the value (sub-key, sub-value, list item)
        part: &'static str,
        /// Offending text
        value: String,
        /// Separator it collides with
        separator: char,
    },

    /// Composite value with no sub-keys at all
    #[error("`{key}`: composite value has no entries")]
    EmptyComposite {
        /// Configuration key
        key: String,
    },

    /// Value shape the key's grammar cannot carry
    #[error("`{key}`: a {kind} value cannot be encoded as {family}")]
    FamilyMismatch {
        /// Configuration key
        key: String,
        /// Family the key belongs to
        family: FieldFamily,
        /// Variant that was given
        kind: &'static str,
    },

    /// Network device with a model outside the registry
    #[error("`{key}`: unknown NIC model `{model}`")]
    UnknownNicModel {
        /// Configuration key
        key: String,
        /// Model name given
        model: String,
    },
}

/// A composite that does not describe a valid device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid device field `{field}`: {reason}")]
pub struct DeviceError {
    pub field: String,
    pub reason: String,
}

impl DeviceError {
    pub(crate) fn new(field: &str, reason: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Categories of source errors for retry decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transport or authentication trouble (transient, retryable)
    Unavailable,
    /// Guest reference does not resolve
    NotFound,
    /// Digest no longer matches
    Precondition,
    /// Platform refused the parameters
    Rejected,
    /// Anything else
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Unavailable => "Config source unavailable",
            Self::NotFound => "Guest not found",
            Self::Precondition => "Configuration changed concurrently",
            Self::Rejected => "Rejected by the platform",
            Self::Other => "Unexpected error",
        }
    }
}

/// Errors reported by a [`ConfigSource`](crate::source::ConfigSource).
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport, authentication or cluster availability failure
    #[error("config source unavailable: {message}")]
    Unavailable {
        /// Exit status of the command, if any
        status: Option<i32>,
        /// Details from the transport
        message: String,
    },

    /// Guest reference does not resolve
    #[error("guest not found: {guest}")]
    NotFound {
        /// The reference that was looked up
        guest: String,
    },

    /// Digest precondition no longer holds
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Platform message
        message: String,
    },

    /// Schema-level rejection from the platform
    #[error("rejected by platform (status {status:?}): {output}")]
    Rejected {
        /// Exit status of the command, if any
        status: Option<i32>,
        /// Raw output explaining the rejection
        output: String,
    },

    /// Response was not in the expected shape
    #[error("malformed response: {message}")]
    Malformed {
        /// What was wrong
        message: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Unavailable { .. } | Self::Io(_) => ErrorCategory::Unavailable,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::PreconditionFailed { .. } => ErrorCategory::Precondition,
            Self::Rejected { .. } => ErrorCategory::Rejected,
            Self::Malformed { .. } | Self::Json(_) => ErrorCategory::Other,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Exit status and output of the failed operation, for reporting.
    pub fn raw_output(&self) -> (Option<i32>, String) {
        match self {
            Self::Rejected { status, output } => (*status, output.clone()),
            Self::Unavailable { status, message } => (*status, message.clone()),
            other => (None, other.to_string()),
        }
    }

    /// Create an error from the output of a failed `pvesh` invocation.
    ///
    /// Only the platform's own messages for a moved digest and a missing
    /// guest config are classified as such. Parameter errors that mention a
    /// missing storage or a malformed digest stay [`SourceError::Rejected`].
    pub fn from_pvesh_output(stderr: &str, status: Option<i32>, guest: &str) -> Self {
        let lower = stderr.to_lowercase();

        if lower.contains("file changed by other user") || lower.contains("detected modified configuration") {
            return Self::PreconditionFailed {
                message: stderr.trim().to_string(),
            };
        }

        if lower.contains("configuration file") && lower.contains("does not exist") {
            return Self::NotFound {
                guest: guest.to_string(),
            };
        }

        if lower.contains("permission denied")
            || lower.contains("401")
            || lower.contains("403")
            || lower.contains("authentication")
            || lower.contains("connection refused")
            || lower.contains("timed out")
            || lower.contains("ipcc_send_rec")
            || lower.contains("no quorum")
        {
            return Self::Unavailable {
                status,
                message: stderr.trim().to_string(),
            };
        }

        Self::Rejected {
            status,
            output: stderr.trim().to_string(),
        }
    }
}

/// Terminal failures of an update attempt.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The request itself is inconsistent
    #[error("invalid update request: {0}")]
    InvalidRequest(String),

    /// Reading the live config failed
    #[error("failed to read config of {guest}: {source}")]
    Fetch {
        /// Guest being updated
        guest: GuestRef,
        /// Underlying source error
        source: SourceError,
    },

    /// The live config or the request did not decode
    #[error("{guest}: {source}")]
    Decode {
        /// Guest being updated
        guest: GuestRef,
        /// Every key that failed
        source: DecodeErrors,
    },

    /// The request could not be encoded
    #[error("{guest}: cannot encode update: {source}")]
    Encode {
        /// Guest being updated
        guest: GuestRef,
        /// Underlying encode error
        source: EncodeError,
    },

    /// Digest precondition failed; nothing was written
    #[error("{guest}: configuration changed concurrently ({})", .keys.join(", "))]
    Conflict {
        /// Guest being updated
        guest: GuestRef,
        /// Keys that changed since the digest was captured
        keys: Vec<String>,
    },

    /// The source rejected or failed the write
    #[error("{guest}: write failed: {raw_output}")]
    Write {
        /// Guest being updated
        guest: GuestRef,
        /// Exit status reported by the source, if any
        raw_status: Option<i32>,
        /// Raw output reported by the source
        raw_output: String,
    },

    /// The write went through but the verification read failed
    #[error("{guest}: write applied but verification read failed: {source}")]
    Unverified {
        /// Guest being updated
        guest: GuestRef,
        /// Underlying source error
        source: SourceError,
    },
}

impl UpdateError {
    /// Whether this is a digest conflict a caller may retry after re-reading.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// Guest the failed update was for, if known.
    pub fn guest(&self) -> Option<&GuestRef> {
        match self {
            Self::InvalidRequest(_) => None,
            Self::Fetch { guest, .. }
            | Self::Decode { guest, .. }
            | Self::Encode { guest, .. }
            | Self::Conflict { guest, .. }
            | Self::Write { guest, .. }
            | Self::Unverified { guest, .. } => Some(guest),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_pvesh_output_precondition() {
        let err = SourceError::from_pvesh_output(
            "detected modified configuration - file changed by other user? Try again.",
            Some(255),
            "qemu/100",
        );
        assert_eq!(err.category(), ErrorCategory::Precondition);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_pvesh_output_not_found() {
        let err = SourceError::from_pvesh_output(
            "Configuration file 'nodes/pve1/qemu-server/999.conf' does not exist",
            Some(2),
            "qemu/999",
        );
        assert!(matches!(err, SourceError::NotFound { ref guest } if guest == "qemu/999"));
    }

    #[test]
    fn test_from_pvesh_output_unavailable() {
        let err = SourceError::from_pvesh_output("ipcc_send_rec[1] failed: Connection refused", Some(255), "qemu/100");
        assert_eq!(err.category(), ErrorCategory::Unavailable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_from_pvesh_output_rejected() {
        let err = SourceError::from_pvesh_output(
            "400 Parameter verification failed.\nfoo: property is not defined in schema",
            Some(255),
            "qemu/100",
        );
        match err {
            SourceError::Rejected { status, output } => {
                assert_eq!(status, Some(255));
                assert!(output.contains("Parameter verification failed"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_from_pvesh_output_missing_storage_is_rejected() {
        let err = SourceError::from_pvesh_output(
            "400 Parameter verification failed.\nscsi1: storage 'fast-ssd' does not exist\n",
            Some(255),
            "qemu/100",
        );
        assert_eq!(err.category(), ErrorCategory::Rejected);
        let (status, output) = err.raw_output();
        assert_eq!(status, Some(255));
        assert_eq!(output, "400 Parameter verification failed.\nscsi1: storage 'fast-ssd' does not exist");
    }

    #[test]
    fn test_from_pvesh_output_bad_digest_parameter_is_rejected() {
        let err = SourceError::from_pvesh_output(
            "400 Parameter verification failed.\ndigest: value may only be 64 characters long",
            Some(255),
            "qemu/100",
        );
        assert_eq!(err.category(), ErrorCategory::Rejected);
    }

    #[test]
    fn test_raw_output_keeps_transport_status() {
        let err = SourceError::from_pvesh_output("ipcc_send_rec[1] failed: Connection refused\n", Some(111), "qemu/100");
        assert_eq!(err.raw_output(), (Some(111), "ipcc_send_rec[1] failed: Connection refused".to_string()));
    }

    #[test]
    fn test_decode_errors_display() {
        let one = DecodeError::new("net0", "virtio=AA,firewall=x", "firewall=x", "expected 0 or 1");
        let errors = DecodeErrors(vec![one.clone(), one]);
        let text = errors.to_string();
        assert!(text.contains("net0"));
        assert!(text.contains("firewall=x"));
        assert!(text.contains("and 1 more"));
        assert_eq!(errors.keys(), vec!["net0", "net0"]);
    }

    #[test]
    fn test_conflict_display_lists_keys() {
        let err = UpdateError::Conflict {
            guest: GuestRef::qemu("pve1", 100),
            keys: vec!["memory".into(), "net0".into()],
        };
        assert!(err.is_conflict());
        assert!(err.to_string().contains("memory, net0"));
    }
}
