//! Error types for AGK.

use crate::state::ProposalState;
use std::fmt;

/// Unified error type for all governance operations.
#[derive(Debug, Clone)]
pub enum GateError {
    /// Validation error with field context
    Validation { field: String, message: String },
    /// State-machine contract violated
    IllegalTransition { from: ProposalState, to: ProposalState },
    /// Actor is not in the decision allowlist
    Authorization { actor: String },
    /// Missing or incorrect one-time credential
    InvalidCredential { reason: String },
    /// Missing proposal/policy/evidence record
    NotFound { kind: String, id: String },
    /// Persisted state text did not parse
    UnknownState { value: String },
    /// Staged paths fall outside the proposal's declared scope
    ScopeViolation { paths: Vec<String> },
    /// Advisory lock not acquired within the configured budget (retryable)
    LockTimeout { resource: String, waited_ms: u64 },
    /// In-process lock poisoned by a panicking holder
    LockPoisoned { resource: String },
    /// Filesystem error with operation context
    Io { context: String, message: String },
    /// Serialization error
    Serialization { message: String },
    /// Shared credential secret not configured
    MissingSecret { var: String },
}

impl GateError {
    pub(crate) fn io(context: impl Into<String>, err: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            message: err.to_string(),
        }
    }

    /// True for failures that are expected to succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}

impl fmt::Display for GateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, message } => {
                write!(f, "validation error on '{}': {}", field, message)
            }
            Self::IllegalTransition { from, to } => {
                write!(f, "illegal transition: {} -> {}", from, to)
            }
            Self::Authorization { actor } => {
                write!(f, "actor '{}' is not in the decision allowlist", actor)
            }
            Self::InvalidCredential { reason } => {
                write!(f, "invalid credential: {}", reason)
            }
            Self::NotFound { kind, id } => {
                write!(f, "{} '{}' not found", kind, id)
            }
            Self::UnknownState { value } => {
                write!(f, "unknown proposal state: '{}'", value)
            }
            Self::ScopeViolation { paths } => {
                write!(f, "staged paths outside scope: {}", paths.join(", "))
            }
            Self::LockTimeout { resource, waited_ms } => {
                write!(f, "lock on '{}' not acquired after {}ms", resource, waited_ms)
            }
            Self::LockPoisoned { resource } => {
                write!(f, "lock poisoned for resource: {}", resource)
            }
            Self::Io { context, message } => {
                write!(f, "{}: {}", context, message)
            }
            Self::Serialization { message } => {
                write!(f, "serialization error: {}", message)
            }
            Self::MissingSecret { var } => {
                write!(f, "credential secret missing; set {}", var)
            }
        }
    }
}

impl std::error::Error for GateError {}

/// Result type alias for governance operations.
pub type GateResult<T> = Result<T, GateError>;

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization { message: e.to_string() }
    }
}

impl<T> From<std::sync::PoisonError<T>> for GateError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned { resource: "mutex".to_string() }
    }
}
