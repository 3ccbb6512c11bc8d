//! # guestconf
//!
//! Pure Rust library for reading and changing Proxmox VE guest configuration.
//!
//! This crate provides functionality for:
//! - Decoding the flat `key: value` guest config into structured values
//!   (network devices, disks, agent options, tag lists)
//! - Encoding structured values back into the platform's wire form
//! - Applying sparse updates guarded by the config digest, so concurrent
//!   changes surface as conflicts instead of being overwritten
//!
//! ## Example
//!
//! ```no_run
//! use guestconf::{Composite, Coordinator, GuestRef, PveshSource, UpdateRequest, Value};
//!
//! let source = PveshSource::new().expect("pvesh not available");
//! let coordinator = Coordinator::new(source);
//! let guest = GuestRef::qemu("pve1", 100);
//!
//! // Read the current config
//! let snapshot = coordinator.read(&guest).expect("read failed");
//! if let Some(Value::Composite(net0)) = snapshot.config.get("net0") {
//!     println!("net0 bridge: {:?}", net0.get("bridge"));
//! }
//!
//! // Change only what differs
//! let request = UpdateRequest::new(guest)
//!     .set("net1", Composite::new().with("model", "virtio").with("bridge", "vmbr1"))
//!     .set("tags", Value::tags(["web", "prod"]))
//!     .delete("description");
//! let report = coordinator.apply(&request).expect("update failed");
//! for warning in &report.warnings {
//!     println!("warning: {warning}");
//! }
//! ```
//!
//! ## Conflicts
//!
//! A write rejected because the digest moved is reported as
//! [`UpdateError::Conflict`] and is never retried implicitly. Opt in with
//! [`Coordinator::apply_with_retry`]:
//!
//! ```no_run
//! use guestconf::{Coordinator, GuestRef, PveshSource, RetryConfig, UpdateRequest};
//! use guestconf::retry::LogCallback;
//! use std::time::Duration;
//!
//! let coordinator = Coordinator::new(PveshSource::new().unwrap());
//! let request = UpdateRequest::new(GuestRef::qemu("pve1", 100)).set("memory", 4096_i64);
//! let config = RetryConfig::new(3, Duration::from_millis(250));
//! coordinator.apply_with_retry(&request, &config, &LogCallback).unwrap();
//! ```

#![warn(clippy::all)]

pub mod codec;
pub mod device;
pub mod diff;
pub mod error;
pub mod observer;
pub mod registry;
pub mod retry;
pub mod source;
pub mod types;
pub mod update;

pub use codec::{decode, decode_lenient, decode_value, encode, encode_value};
pub use device::{IpConfig, NetDevice, NicModel, StorageDevice};
pub use diff::{ConfigDiff, DiffSummary};
pub use error::{
    DecodeError, DecodeErrors, DeviceError, EncodeError, ErrorCategory, SourceError, UpdateError,
};
pub use observer::{LogObserver, NoObserver, UpdateObserver, UpdatePhase, UpdateWarning};
pub use registry::FieldFamily;
pub use retry::RetryConfig;
pub use source::{ConfigSource, ConfigWrite, GuestKind, GuestRef, MemorySource, PveshSource};
pub use types::{Composite, RawConfig, StructuredConfig, SubValue, Value};
pub use update::{Coordinator, Outcome, Plan, Snapshot, UpdateReport, UpdateRequest};
