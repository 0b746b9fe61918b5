//! Durable, lock-serialized proposal persistence.
//!
//! Locks are advisory and cooperative: every writer, in-process or not,
//! must acquire the proposal's lock file before mutating its record.

use crate::error::{GateError, GateResult};
use crate::state::ProposalState;
use crate::types::{utc_now, Proposal};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Interface to the out-of-scope secondary proposal index. Writes are
/// best-effort: the primary document store remains authoritative.
pub trait ProposalMirror: Send + Sync {
    fn upsert(&self, proposal: &Proposal) -> GateResult<()>;
}

/// An exclusive advisory lock, released on drop.
#[derive(Debug)]
pub struct LockGuard {
    file: File,
    resource: String,
}

impl LockGuard {
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

/// Acquire an exclusive advisory lock on `lock_path`, polling until
/// `timeout` elapses. Timing out is a retryable error.
pub fn acquire_lock(
    lock_path: &Path,
    resource: &str,
    timeout: Duration,
) -> GateResult<LockGuard> {
    if let Some(parent) = lock_path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| GateError::io(format!("failed to create {}", parent.display()), e))?;
    }
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(lock_path)
        .map_err(|e| GateError::io(format!("failed to open lock {}", lock_path.display()), e))?;

    let contended_kind = fs2::lock_contended_error().kind();
    let start = Instant::now();
    loop {
        match file.try_lock_exclusive() {
            Ok(()) => {
                return Ok(LockGuard {
                    file,
                    resource: resource.to_string(),
                });
            }
            Err(err) if err.kind() == contended_kind => {
                let waited = start.elapsed();
                if waited >= timeout {
                    return Err(GateError::LockTimeout {
                        resource: resource.to_string(),
                        waited_ms: waited.as_millis() as u64,
                    });
                }
                std::thread::sleep(LOCK_POLL_INTERVAL);
            }
            Err(err) => {
                return Err(GateError::io(
                    format!("failed to lock {}", lock_path.display()),
                    err,
                ));
            }
        }
    }
}

/// Atomically replace `path` with `bytes` via a same-directory temp file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> GateResult<()> {
    let parent = path.parent().ok_or_else(|| GateError::Validation {
        field: "path".to_string(),
        message: format!("{} has no parent directory", path.display()),
    })?;
    fs::create_dir_all(parent)
        .map_err(|e| GateError::io(format!("failed to create {}", parent.display()), e))?;
    let mut temp = tempfile::NamedTempFile::new_in(parent)
        .map_err(|e| GateError::io(format!("failed to create temp file in {}", parent.display()), e))?;
    temp.write_all(bytes)
        .map_err(|e| GateError::io(format!("failed to write {}", path.display()), e))?;
    temp.persist(path).map_err(|e| GateError::Io {
        context: format!("failed to persist {}", path.display()),
        message: e.to_string(),
    })?;
    Ok(())
}

/// File-backed proposal store: one JSON document per proposal id, one lock
/// file per proposal id.
pub struct ProposalStore {
    proposals_dir: PathBuf,
    locks_dir: PathBuf,
    lock_timeout: Duration,
    mirror: Option<Box<dyn ProposalMirror>>,
}

impl std::fmt::Debug for ProposalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProposalStore")
            .field("proposals_dir", &self.proposals_dir)
            .field("locks_dir", &self.locks_dir)
            .field("lock_timeout", &self.lock_timeout)
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

impl ProposalStore {
    pub fn new(proposals_dir: PathBuf, locks_dir: PathBuf, lock_timeout: Duration) -> Self {
        Self {
            proposals_dir,
            locks_dir,
            lock_timeout,
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Box<dyn ProposalMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn proposal_path(&self, proposal_id: &str) -> PathBuf {
        self.proposals_dir.join(format!("{}.json", proposal_id))
    }

    pub fn lock_path(&self, proposal_id: &str) -> PathBuf {
        self.locks_dir.join(format!("{}.lock", proposal_id))
    }

    pub fn exists(&self, proposal_id: &str) -> bool {
        self.proposal_path(proposal_id).exists()
    }

    /// Acquire this proposal's exclusive lock. Writers hold it across the
    /// whole read-modify-write cycle, not just the write.
    pub fn lock(&self, proposal_id: &str) -> GateResult<LockGuard> {
        acquire_lock(&self.lock_path(proposal_id), proposal_id, self.lock_timeout)
    }

    /// Load a proposal. Readers tolerate a slightly stale snapshot, so no
    /// lock is required. An unparsable record is a hard error.
    pub fn load(&self, proposal_id: &str) -> GateResult<Proposal> {
        let path = self.proposal_path(proposal_id);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(GateError::NotFound {
                    kind: "proposal".to_string(),
                    id: proposal_id.to_string(),
                });
            }
            Err(e) => {
                return Err(GateError::io(format!("failed to read {}", path.display()), e));
            }
        };
        let proposal: Proposal = serde_json::from_slice(&bytes).map_err(|e| {
            GateError::Serialization {
                message: format!("proposal {}: {}", path.display(), e),
            }
        })?;
        proposal.validate()?;
        Ok(proposal)
    }

    /// Persist a proposal under its lock, refreshing `updated_at`.
    ///
    /// The guard must belong to the same proposal id. Writes over a
    /// persisted terminal record are rejected. The mirror write that
    /// follows the primary write is best-effort and never fails the save.
    pub fn save(&self, proposal: &mut Proposal, guard: &LockGuard) -> GateResult<()> {
        proposal.validate()?;
        if guard.resource() != proposal.id {
            return Err(GateError::Validation {
                field: "lock".to_string(),
                message: format!(
                    "lock held for '{}' does not cover proposal '{}'",
                    guard.resource(),
                    proposal.id
                ),
            });
        }
        if proposal.state == ProposalState::Draft {
            return Err(GateError::Validation {
                field: "state".to_string(),
                message: "draft proposals are not persisted".to_string(),
            });
        }
        match self.load(&proposal.id) {
            Ok(existing) if existing.state.is_terminal() => {
                return Err(GateError::Validation {
                    field: "state".to_string(),
                    message: format!(
                        "proposal {} is {}; record is immutable",
                        proposal.id, existing.state
                    ),
                });
            }
            Ok(_) | Err(GateError::NotFound { .. }) => {}
            Err(other) => return Err(other),
        }

        proposal.updated_at = utc_now();
        let mut bytes = serde_json::to_vec_pretty(proposal)?;
        bytes.push(b'\n');
        write_atomic(&self.proposal_path(&proposal.id), &bytes)?;

        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.upsert(proposal) {
                warn!(
                    proposal = %proposal.id,
                    error = %err,
                    "proposal mirror write failed; primary record is authoritative"
                );
            }
        }
        Ok(())
    }

    /// List all persisted proposals, most recently updated first.
    pub fn list(&self) -> GateResult<Vec<Proposal>> {
        let entries = match fs::read_dir(&self.proposals_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GateError::io(
                    format!("failed to list {}", self.proposals_dir.display()),
                    e,
                ));
            }
        };
        let mut proposals = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                GateError::io(format!("failed to list {}", self.proposals_dir.display()), e)
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            proposals.push(self.load(stem)?);
        }
        proposals.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(proposals)
    }
}
