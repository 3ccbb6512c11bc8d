//! In-process config source with compare-and-set digests.

use super::{ConfigSource, ConfigWrite, GuestRef, Result};
use crate::error::SourceError;
use crate::types::RawConfig;
use blake3::Hasher;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Config store held in memory.
///
/// The digest is a content hash recomputed after every successful write, so
/// any change to a guest's configuration invalidates earlier reads. A write
/// carrying a stale digest fails with [`SourceError::PreconditionFailed`] and
/// changes nothing.
#[derive(Debug)]
pub struct MemorySource {
    guests: Mutex<HashMap<GuestRef, RawConfig>>,
    guarded: bool,
    writes: AtomicUsize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            guests: Mutex::new(HashMap::new()),
            guarded: true,
            writes: AtomicUsize::new(0),
        }
    }

    /// A source that neither returns nor checks digests.
    pub fn unguarded() -> Self {
        Self {
            guarded: false,
            ..Self::new()
        }
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with_guest(mut self, guest: GuestRef, config: RawConfig) -> Self {
        self.guests
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(guest, strip_digest(config));
        self
    }

    /// Store (or replace) a guest's configuration. Any digest on `config` is
    /// ignored; the stored digest is derived from the content.
    pub fn insert(&self, guest: GuestRef, config: RawConfig) -> Result<()> {
        self.lock()?.insert(guest, strip_digest(config));
        Ok(())
    }

    /// Current configuration of a guest, with its digest.
    pub fn snapshot(&self, guest: &GuestRef) -> Result<Option<RawConfig>> {
        Ok(self.lock()?.get(guest).map(|config| self.with_digest(config)))
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<GuestRef, RawConfig>>> {
        self.guests.lock().map_err(|_| SourceError::Unavailable {
            status: None,
            message: "memory source lock poisoned".to_string(),
        })
    }

    fn with_digest(&self, config: &RawConfig) -> RawConfig {
        let mut config = config.clone();
        if self.guarded {
            config.digest = Some(content_digest(&config));
        }
        config
    }
}

impl ConfigSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, guest: &GuestRef) -> Result<RawConfig> {
        self.snapshot(guest)?.ok_or_else(|| SourceError::NotFound {
            guest: guest.to_string(),
        })
    }

    fn write(&self, guest: &GuestRef, write: &ConfigWrite) -> Result<()> {
        let mut guests = self.lock()?;
        let current = guests.get_mut(guest).ok_or_else(|| SourceError::NotFound {
            guest: guest.to_string(),
        })?;

        if self.guarded
            && let Some(expected) = &write.digest
        {
            let actual = content_digest(current);
            if *expected != actual {
                return Err(SourceError::PreconditionFailed {
                    message: format!("digest mismatch: expected {expected}, current {actual}"),
                });
            }
        }

        if let Some(key) = write.delete.iter().find(|key| write.params.contains_key(key)) {
            return Err(SourceError::Rejected {
                status: Some(400),
                output: format!("{key}: cannot set and delete the same key"),
            });
        }

        current.merge(&write.params);
        for key in &write.delete {
            current.remove(key);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn supports_digest(&self) -> bool {
        self.guarded
    }
}

fn strip_digest(mut config: RawConfig) -> RawConfig {
    config.digest = None;
    config
}

/// BLAKE3 over the sorted entries and flags, hex encoded.
fn content_digest(config: &RawConfig) -> String {
    let mut hasher = Hasher::new();
    for (key, value) in config.iter() {
        hasher.update(key.as_bytes());
        hasher.update(b": ");
        hasher.update(value.as_bytes());
        hasher.update(b"\n");
    }
    for flag in config.flags() {
        hasher.update(flag.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}
