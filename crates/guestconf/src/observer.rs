//! Observation hooks for the update protocol.
//!
//! The coordinator reports every phase transition and every warning to an
//! [`UpdateObserver`]. Callers choose where that goes: nowhere
//! ([`NoObserver`]), the `log` facade ([`LogObserver`]), or their own UI.

use crate::source::GuestRef;
use crate::types::Value;
use serde::Serialize;
use std::fmt;

/// Phases of one update, in protocol order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdatePhase {
    Idle,
    Fetched,
    Decoded,
    Diffed,
    /// Nothing to change (terminal, success)
    NoOp,
    Written,
    /// Write applied and re-read (terminal, success)
    Verified,
    /// Live config did not decode (terminal)
    DecodeError,
    /// Digest precondition failed (terminal)
    Conflict,
    /// Source rejected or failed the write (terminal)
    WriteError,
}

impl UpdatePhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoOp | Self::Verified | Self::DecodeError | Self::Conflict | Self::WriteError
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::NoOp | Self::Verified)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Fetched => "fetched",
            Self::Decoded => "decoded",
            Self::Diffed => "diffed",
            Self::NoOp => "no-op",
            Self::Written => "written",
            Self::Verified => "verified",
            Self::DecodeError => "decode-error",
            Self::Conflict => "conflict",
            Self::WriteError => "write-error",
        }
    }
}

impl fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key whose re-read value differs from the requested one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostconditionWarning {
    pub key: String,
    pub requested: Value,
    /// `None` when the key is missing or did not decode after the write
    pub observed: Option<Value>,
}

/// Non-fatal findings of an update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum UpdateWarning {
    /// The write was sent without a digest precondition
    Unguarded { source: String },
    /// The platform stored something other than what was requested
    Postcondition(PostconditionWarning),
}

impl fmt::Display for UpdateWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unguarded { source } => {
                write!(f, "source `{source}` reported no digest; write is not guarded against concurrent changes")
            }
            Self::Postcondition(w) => match &w.observed {
                Some(observed) => write!(
                    f,
                    "{}: requested {}, platform stored {}",
                    w.key,
                    render(&w.requested),
                    render(observed)
                ),
                None => write!(f, "{}: requested {}, key missing after write", w.key, render(&w.requested)),
            },
        }
    }
}

fn render(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| value.kind().to_string())
}

/// Receiver of update progress.
///
/// Shared across worker threads by batch updates, hence `&self` and `Sync`.
pub trait UpdateObserver: Send + Sync {
    /// Called on every phase transition.
    fn on_phase(&self, guest: &GuestRef, phase: UpdatePhase);

    /// Called for every warning, as soon as it is known.
    fn on_warning(&self, guest: &GuestRef, warning: &UpdateWarning);
}

/// No-op observer
pub struct NoObserver;

impl UpdateObserver for NoObserver {
    fn on_phase(&self, _guest: &GuestRef, _phase: UpdatePhase) {}
    fn on_warning(&self, _guest: &GuestRef, _warning: &UpdateWarning) {}
}

/// Observer that forwards to the `log` facade.
pub struct LogObserver;

impl UpdateObserver for LogObserver {
    fn on_phase(&self, guest: &GuestRef, phase: UpdatePhase) {
        log::debug!("{guest}: {phase}");
    }

    fn on_warning(&self, guest: &GuestRef, warning: &UpdateWarning) {
        log::warn!("{guest}: {warning}");
    }
}
