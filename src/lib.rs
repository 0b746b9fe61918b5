//! AGK - Agent Governance Kernel
//!
//! A control-plane that gates irreversible actions proposed by autonomous
//! agents behind a verifiable sequence: proposal, automated policy and
//! evidence evaluation, human-authorized decision, execution.

pub mod audit;
pub mod authority;
pub mod config;
pub mod error;
pub mod evidence;
pub mod gate;
pub mod policy;
pub mod state;
pub mod store;
pub mod types;

pub use audit::{AuditEvent, AuditMirror, AuditTrail, EventKind};
pub use authority::{read_allowlist, DecisionAuthority, Totp};
pub use config::GateConfig;
pub use error::{GateError, GateResult};
pub use evidence::{
    load_evidence, EvidenceEvaluation, EvidenceValidator, PERFORMANCE_FIELD, REQUIRED_METADATA,
};
pub use gate::{
    CommitMaterializer, EvaluationOutcome, EvidenceSource, Gate, ProposalRequest,
};
pub use policy::{load_policy, PolicyEngine, PolicyEvaluation, DEFAULT_REQUIRED_EVIDENCE};
pub use state::{transition, ProposalState};
pub use store::{acquire_lock, LockGuard, ProposalMirror, ProposalStore};
pub use types::{
    hash_file, utc_now, CommitRecord, DecisionKind, DecisionRecord, EvidenceDocument,
    EvidenceSnapshot, PolicyDocument, PolicyRules, PolicySnapshot, Proposal,
};
