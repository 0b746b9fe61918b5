//! Core data types for AGK.

use crate::error::{GateError, GateResult};
use crate::state::{transition, ProposalState};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Return an RFC 3339 UTC timestamp with Z suffix.
pub fn utc_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Compute the SHA-256 hex digest of a file's contents.
pub fn hash_file(path: &Path) -> GateResult<String> {
    let bytes = std::fs::read(path)
        .map_err(|e| GateError::io(format!("failed to read {}", path.display()), e))?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Frozen record of one policy evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicySnapshot {
    pub name: String,
    pub path: String,
    pub hash: String,
    pub passed: bool,
    pub violations: Vec<String>,
    pub required_evidence: Vec<String>,
    pub performance_budget_ms: Option<f64>,
    pub evaluated_at: String,
}

/// Frozen record of one evidence evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceSnapshot {
    pub path: String,
    pub passed: bool,
    pub missing: Vec<String>,
    pub failures: Vec<String>,
    pub metadata_missing: Vec<String>,
    pub metadata_invalid: Vec<String>,
    pub performance: Option<f64>,
    pub performance_budget_ms: Option<f64>,
    pub evaluated_at: String,
}

/// Outcome of a human decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DecisionKind {
    Accept,
    Reject,
}

impl DecisionKind {
    /// Parse a decision from free text, case-insensitively.
    pub fn parse(s: &str) -> GateResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            _ => Err(GateError::Validation {
                field: "decision".to_string(),
                message: "decision must be 'accept' or 'reject'".to_string(),
            }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
        }
    }

    /// The state a successful decision drives the proposal into.
    pub fn target_state(&self) -> ProposalState {
        match self {
            Self::Accept => ProposalState::Accepted,
            Self::Reject => ProposalState::Rejected,
        }
    }
}

impl std::fmt::Display for DecisionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The single authoritative decision record, written once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub proposal_id: String,
    pub decision: DecisionKind,
    pub by: String,
    pub reason: String,
    pub timestamp: String,
}

/// Commit record reported by the version-control collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommitRecord {
    pub message: String,
    pub sha: String,
    pub tag: Option<String>,
    pub pushed: bool,
    pub branch: Option<String>,
    pub committed_at: String,
}

/// The central governed entity: an agent's declared intent plus its
/// evaluation, decision, and commit history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Proposal {
    pub id: String,
    pub agent: String,
    pub goal: String,
    pub scope: Vec<String>,
    pub constraints: Vec<String>,
    pub risk_level: String,
    pub policy: Option<PolicySnapshot>,
    pub evidence: Option<EvidenceSnapshot>,
    pub decision: Option<DecisionRecord>,
    pub commit: Option<CommitRecord>,
    pub state: ProposalState,
    pub created_at: String,
    pub updated_at: String,
}

impl Proposal {
    pub fn new(
        id: String,
        agent: String,
        goal: String,
        scope: Vec<String>,
        constraints: Vec<String>,
        risk_level: String,
    ) -> Self {
        let now = utc_now();
        Self {
            id,
            agent,
            goal,
            scope,
            constraints,
            risk_level,
            policy: None,
            evidence: None,
            decision: None,
            commit: None,
            state: ProposalState::Draft,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn validate(&self) -> GateResult<()> {
        if self.id.is_empty() {
            return Err(GateError::Validation {
                field: "id".to_string(),
                message: "proposal must have a non-empty id".to_string(),
            });
        }
        // Ids become file stems, so only a path-safe charset is accepted.
        let safe = self.id.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
        });
        if !safe || !self.id.chars().any(|c| c.is_ascii_alphanumeric()) {
            return Err(GateError::Validation {
                field: "id".to_string(),
                message: format!(
                    "proposal id '{}' contains characters outside [A-Za-z0-9._-]",
                    self.id
                ),
            });
        }
        if self.agent.is_empty() {
            return Err(GateError::Validation {
                field: "agent".to_string(),
                message: "proposal must name the proposing agent".to_string(),
            });
        }
        if self.goal.is_empty() {
            return Err(GateError::Validation {
                field: "goal".to_string(),
                message: "proposal must state a goal".to_string(),
            });
        }
        Ok(())
    }

    /// Drive the proposal through one state-machine transition, refreshing
    /// `updated_at`. Fails without mutation if the transition is illegal.
    pub fn apply_state(&mut self, target: ProposalState) -> GateResult<()> {
        self.state = transition(self.state, target)?;
        self.updated_at = utc_now();
        Ok(())
    }
}

fn default_policy_name() -> String {
    "default".to_string()
}

/// Rule set of a policy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PolicyRules {
    #[serde(default)]
    pub forbid_paths: Vec<String>,
    #[serde(default)]
    pub require_constraints: Vec<String>,
    #[serde(default)]
    pub require_evidence: Option<Vec<String>>,
    #[serde(default)]
    pub max_latency_delta_ms: Option<f64>,
}

/// A policy document: rules a proposal must satisfy before acceptance is
/// possible. Read-only input to the core.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyDocument {
    #[serde(default = "default_policy_name")]
    pub name: String,
    #[serde(default)]
    pub applies_to: Option<Vec<String>>,
    #[serde(default)]
    pub rules: PolicyRules,
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self {
            name: default_policy_name(),
            applies_to: None,
            rules: PolicyRules::default(),
        }
    }
}

/// An evidence document: an open mapping of check name to pass indicator,
/// plus metadata fields and an optional performance delta.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct EvidenceDocument(pub serde_json::Map<String, serde_json::Value>);

impl EvidenceDocument {
    pub fn from_value(value: serde_json::Value) -> GateResult<Self> {
        match value {
            serde_json::Value::Object(map) => Ok(Self(map)),
            other => Err(GateError::Validation {
                field: "evidence".to_string(),
                message: format!("evidence document must be an object, got {}", other),
            }),
        }
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
