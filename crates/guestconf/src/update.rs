//! Optimistic update coordinator.
//!
//! One update runs `fetch -> decode -> diff -> encode -> write -> verify` as a
//! single sequential unit. The write carries the digest captured by the fetch
//! (or pinned by the caller), so the source rejects it if anything changed in
//! between. A rejected precondition is reported as a conflict; retrying is the
//! caller's decision (see [`retry`](crate::retry)).

use crate::codec::{decode, decode_lenient, encode};
use crate::diff::{self, ConfigDiff};
use crate::error::{SourceError, UpdateError};
use crate::observer::{NoObserver, PostconditionWarning, UpdateObserver, UpdatePhase, UpdateWarning};
use crate::retry::{self, RetryCallback, RetryConfig};
use crate::source::{ConfigSource, ConfigWrite, GuestRef};
use crate::types::{DIGEST_KEY, RawConfig, StructuredConfig, Value};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;

/// Result type for coordinator operations.
pub type Result<T> = std::result::Result<T, UpdateError>;

/// A sparse change to one guest's configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRequest {
    pub guest: GuestRef,
    /// Keys to set, with their desired values
    pub set: StructuredConfig,
    /// Keys to remove
    pub delete: Vec<String>,
    /// Digest from an earlier read; when set, the write is guarded by it
    /// instead of the coordinator's own fetch
    pub expect_digest: Option<String>,
}

impl UpdateRequest {
    pub fn new(guest: GuestRef) -> Self {
        Self {
            guest,
            set: StructuredConfig::new(),
            delete: Vec::new(),
            expect_digest: None,
        }
    }

    /// Builder-style set of one key.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set.insert(key, value);
        self
    }

    /// Builder-style delete of one key.
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.delete.push(key.into());
        self
    }

    pub fn expect_digest(mut self, digest: impl Into<String>) -> Self {
        self.expect_digest = Some(digest.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.delete.is_empty()
    }

    /// Keys named by the request, sorted and deduplicated.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .set
            .keys()
            .map(str::to_string)
            .chain(self.delete.iter().cloned())
            .collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }

    fn validate(&self) -> Result<()> {
        for key in self.set.keys().chain(self.delete.iter().map(String::as_str)) {
            if key.is_empty() {
                return Err(UpdateError::InvalidRequest("empty key".to_string()));
            }
            if key == DIGEST_KEY || key == "delete" {
                return Err(UpdateError::InvalidRequest(format!(
                    "`{key}` is managed by the coordinator and cannot be set or deleted"
                )));
            }
        }
        if let Some(key) = self.delete.iter().find(|key| self.set.contains_key(key)) {
            return Err(UpdateError::InvalidRequest(format!(
                "`{key}` is both set and deleted"
            )));
        }
        Ok(())
    }
}

/// How a successful update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The live config already matched; nothing was written
    NoOp,
    /// The write was applied and re-read
    Verified,
}

/// Summary of a successful update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub guest: GuestRef,
    pub outcome: Outcome,
    /// Keys that were written
    pub changed: Vec<String>,
    /// Keys that were deleted
    pub deleted: Vec<String>,
    pub warnings: Vec<UpdateWarning>,
    /// Whether the write carried a digest precondition
    pub guarded: bool,
    /// Digest of the configuration after the update
    pub digest: Option<String>,
}

impl UpdateReport {
    /// Whether anything was written.
    pub fn is_changed(&self) -> bool {
        self.outcome == Outcome::Verified
    }
}

/// A decoded snapshot of the live configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub guest: GuestRef,
    pub config: StructuredConfig,
    pub digest: Option<String>,
}

/// What an update would write, computed without writing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    pub guest: GuestRef,
    pub diff: ConfigDiff,
    /// Digest the write would be guarded by
    pub digest: Option<String>,
    raw: RawConfig,
}

/// Runs update requests against a [`ConfigSource`].
pub struct Coordinator<S> {
    source: S,
    observer: Box<dyn UpdateObserver>,
}

impl<S: ConfigSource> Coordinator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            observer: Box::new(NoObserver),
        }
    }

    pub fn with_observer(mut self, observer: impl UpdateObserver + 'static) -> Self {
        self.observer = Box::new(observer);
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch and strictly decode a guest's configuration.
    pub fn read(&self, guest: &GuestRef) -> Result<Snapshot> {
        let raw = self.fetch(guest)?;
        let config = self.decode_live(guest, &raw)?;
        Ok(Snapshot {
            guest: guest.clone(),
            config,
            digest: raw.digest,
        })
    }

    /// Run the read side of an update and return what it would write.
    pub fn plan(&self, request: &UpdateRequest) -> Result<Plan> {
        request.validate()?;
        let guest = &request.guest;
        self.observer.on_phase(guest, UpdatePhase::Idle);

        let set = canonicalize(guest, &request.set)?;
        let raw = self.fetch(guest)?;
        let live = self.decode_live(guest, &raw)?;

        let diff = ConfigDiff::compute(&live, &set, &request.delete);
        self.observer.on_phase(guest, UpdatePhase::Diffed);
        log::debug!("{guest}: {} key(s) to write: {:?}", diff.keys().len(), diff.keys());

        let digest = request.expect_digest.clone().or_else(|| raw.digest.clone());
        Ok(Plan {
            guest: guest.clone(),
            diff,
            digest,
            raw,
        })
    }

    /// Apply one update request.
    pub fn apply(&self, request: &UpdateRequest) -> Result<UpdateReport> {
        let plan = self.plan(request)?;
        let guest = &request.guest;

        if plan.diff.is_empty() {
            self.observer.on_phase(guest, UpdatePhase::NoOp);
            return Ok(UpdateReport {
                guest: guest.clone(),
                outcome: Outcome::NoOp,
                changed: Vec::new(),
                deleted: Vec::new(),
                warnings: Vec::new(),
                guarded: plan.digest.is_some() && self.source.supports_digest(),
                digest: plan.raw.digest,
            });
        }

        let mut warnings = Vec::new();
        let guarded = plan.digest.is_some() && self.source.supports_digest();
        if !guarded {
            let warning = UpdateWarning::Unguarded {
                source: self.source.name().to_string(),
            };
            self.observer.on_warning(guest, &warning);
            warnings.push(warning);
        }

        let params = encode(&plan.diff.changed).map_err(|source| UpdateError::Encode {
            guest: guest.clone(),
            source,
        })?;
        let write = ConfigWrite {
            params,
            delete: plan.diff.deleted.clone(),
            digest: plan.digest.clone(),
        };
        log::trace!("{guest}: write {:?}", write);

        if let Err(e) = self.source.write(guest, &write) {
            return Err(self.write_failed(request, &plan, e));
        }
        self.observer.on_phase(guest, UpdatePhase::Written);

        let after = self.source.fetch(guest).map_err(|source| UpdateError::Unverified {
            guest: guest.clone(),
            source,
        })?;
        let (observed, errors) = decode_lenient(&after);
        for e in &errors {
            log::warn!("{guest}: {e}");
        }

        for (key, requested) in plan.diff.changed.iter() {
            let current = observed.get(key);
            if !diff::equivalent(key, requested, current) {
                let warning = UpdateWarning::Postcondition(PostconditionWarning {
                    key: key.to_string(),
                    requested: requested.clone(),
                    observed: current.cloned(),
                });
                self.observer.on_warning(guest, &warning);
                warnings.push(warning);
            }
        }
        self.observer.on_phase(guest, UpdatePhase::Verified);

        Ok(UpdateReport {
            guest: guest.clone(),
            outcome: Outcome::Verified,
            changed: plan.diff.changed.keys().map(str::to_string).collect(),
            deleted: plan.diff.deleted,
            warnings,
            guarded,
            digest: after.digest,
        })
    }

    /// Apply a request, retrying on conflict according to `config`.
    ///
    /// A pinned digest only guards the first attempt; retries re-read and
    /// use the fresh digest.
    pub fn apply_with_retry(
        &self,
        request: &UpdateRequest,
        config: &RetryConfig,
        callback: &dyn RetryCallback,
    ) -> Result<UpdateReport> {
        let mut pinned = request.expect_digest.clone();
        retry::with_conflict_retry(config, callback, || {
            let attempt = UpdateRequest {
                expect_digest: pinned.take(),
                ..request.clone()
            };
            self.apply(&attempt)
        })
    }

    /// Apply many requests.
    ///
    /// Requests for different guests run in parallel on up to `jobs` threads;
    /// requests for the same guest run one after another in submission
    /// order. Results are returned in submission order.
    pub fn apply_many(&self, requests: &[UpdateRequest], jobs: usize) -> Vec<Result<UpdateReport>> {
        let mut groups: BTreeMap<&GuestRef, Vec<usize>> = BTreeMap::new();
        for (index, request) in requests.iter().enumerate() {
            groups.entry(&request.guest).or_default().push(index);
        }
        let groups: Vec<Vec<usize>> = groups.into_values().collect();

        let run_group = |indices: &Vec<usize>| -> Vec<(usize, Result<UpdateReport>)> {
            indices.iter().map(|&i| (i, self.apply(&requests[i]))).collect()
        };

        let mut results: Vec<(usize, Result<UpdateReport>)> = if jobs <= 1 || groups.len() <= 1 {
            groups.iter().flat_map(run_group).collect()
        } else {
            match rayon::ThreadPoolBuilder::new().num_threads(jobs).build() {
                Ok(pool) => pool.install(|| groups.par_iter().flat_map_iter(run_group).collect()),
                Err(e) => {
                    log::warn!("failed to create thread pool ({e}); applying sequentially");
                    groups.iter().flat_map(run_group).collect()
                }
            }
        };

        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    fn fetch(&self, guest: &GuestRef) -> Result<RawConfig> {
        let raw = self.source.fetch(guest).map_err(|source| UpdateError::Fetch {
            guest: guest.clone(),
            source,
        })?;
        self.observer.on_phase(guest, UpdatePhase::Fetched);
        Ok(raw)
    }

    fn decode_live(&self, guest: &GuestRef, raw: &RawConfig) -> Result<StructuredConfig> {
        match decode(raw) {
            Ok(config) => {
                self.observer.on_phase(guest, UpdatePhase::Decoded);
                Ok(config)
            }
            Err(source) => {
                self.observer.on_phase(guest, UpdatePhase::DecodeError);
                Err(UpdateError::Decode {
                    guest: guest.clone(),
                    source,
                })
            }
        }
    }

    /// Turn a failed write into the matching terminal error.
    fn write_failed(&self, request: &UpdateRequest, plan: &Plan, error: SourceError) -> UpdateError {
        let guest = request.guest.clone();
        match error {
            SourceError::PreconditionFailed { message } => {
                log::debug!("{guest}: {message}");
                self.observer.on_phase(&guest, UpdatePhase::Conflict);
                let keys = self.concurrent_changes(&guest, &plan.raw).unwrap_or_else(|| request.keys());
                UpdateError::Conflict { guest, keys }
            }
            other => {
                self.observer.on_phase(&guest, UpdatePhase::WriteError);
                let (raw_status, raw_output) = other.raw_output();
                UpdateError::Write {
                    guest,
                    raw_status,
                    raw_output,
                }
            }
        }
    }

    /// Re-read once to name the keys another actor changed.
    fn concurrent_changes(&self, guest: &GuestRef, before: &RawConfig) -> Option<Vec<String>> {
        match self.source.fetch(guest) {
            Ok(after) => {
                let keys = diff::changed_keys(before, &after);
                (!keys.is_empty()).then_some(keys)
            }
            Err(e) => {
                log::debug!("{guest}: re-read after conflict failed: {e}");
                None
            }
        }
    }
}

/// Bring a request into decoded form, so `"20"` and `20` compare equal.
fn canonicalize(guest: &GuestRef, set: &StructuredConfig) -> Result<StructuredConfig> {
    let raw = encode(set).map_err(|source| UpdateError::Encode {
        guest: guest.clone(),
        source,
    })?;
    decode(&raw).map_err(|source| UpdateError::Decode {
        guest: guest.clone(),
        source,
    })
}
