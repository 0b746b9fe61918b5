//! Append-only audit trail.
//!
//! One JSON object per line, in arrival order, serialized by a single
//! global lock. The primary log is authoritative; mirror failures are
//! swallowed.

use crate::error::{GateError, GateResult};
use crate::store::acquire_lock;
use crate::types::utc_now;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Interface to the out-of-scope secondary event index. Writes are
/// best-effort read-optimizations.
pub trait AuditMirror: Send + Sync {
    fn insert(&self, event: &AuditEvent) -> GateResult<()>;
}

/// Kind of governance event being recorded.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Propose,
    Evaluate,
    Decision,
    Commit,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Propose => "propose",
            Self::Evaluate => "evaluate",
            Self::Decision => "decision",
            Self::Commit => "commit",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Immutable audit record: created on every governance action, never
/// updated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditEvent {
    pub timestamp: String,
    pub event: EventKind,
    pub proposal_id: String,
    pub actor: String,
    pub data: serde_json::Value,
}

/// Append-only JSONL audit log.
pub struct AuditTrail {
    log_path: PathBuf,
    lock_path: PathBuf,
    lock_timeout: Duration,
    mirror: Option<Box<dyn AuditMirror>>,
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("log_path", &self.log_path)
            .field("lock_path", &self.lock_path)
            .field("mirror", &self.mirror.is_some())
            .finish()
    }
}

impl AuditTrail {
    pub fn new(log_path: PathBuf, lock_path: PathBuf, lock_timeout: Duration) -> Self {
        Self {
            log_path,
            lock_path,
            lock_timeout,
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: Box<dyn AuditMirror>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Append one event to the log. The global lock's critical section is
    /// the single line append.
    pub fn record(
        &self,
        event: EventKind,
        proposal_id: &str,
        actor: &str,
        data: serde_json::Value,
    ) -> GateResult<AuditEvent> {
        let entry = AuditEvent {
            timestamp: utc_now(),
            event,
            proposal_id: proposal_id.to_string(),
            actor: actor.to_string(),
            data,
        };
        let line = serde_json::to_string(&entry)?;
        if let Some(parent) = self.log_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| GateError::io(format!("failed to create {}", parent.display()), e))?;
        }
        {
            let _guard = acquire_lock(&self.lock_path, "audit.log", self.lock_timeout)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.log_path)
                .map_err(|e| {
                    GateError::io(format!("failed to open {}", self.log_path.display()), e)
                })?;
            writeln!(file, "{}", line)
                .map_err(|e| GateError::io(format!("failed to append {}", self.log_path.display()), e))?;
        }

        if let Some(mirror) = &self.mirror {
            if let Err(err) = mirror.insert(&entry) {
                warn!(
                    event = %entry.event,
                    proposal = %entry.proposal_id,
                    error = %err,
                    "audit mirror write failed; primary log is authoritative"
                );
            }
        }
        Ok(entry)
    }

    /// Read the most recent `limit` events, newest first. Operator-facing;
    /// core components never read the log back.
    pub fn tail(&self, limit: usize) -> GateResult<Vec<AuditEvent>> {
        let text = match std::fs::read_to_string(&self.log_path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(GateError::io(
                    format!("failed to read {}", self.log_path.display()),
                    e,
                ));
            }
        };
        let mut events = Vec::new();
        for line in text.lines().rev() {
            if events.len() >= limit {
                break;
            }
            if line.trim().is_empty() {
                continue;
            }
            let event: AuditEvent = serde_json::from_str(line).map_err(|e| {
                GateError::Serialization {
                    message: format!("audit log {}: {}", self.log_path.display(), e),
                }
            })?;
            events.push(event);
        }
        Ok(events)
    }
}
