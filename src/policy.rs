//! Policy evaluation gate.

use crate::error::{GateError, GateResult};
use crate::types::{PolicyDocument, Proposal};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Evidence keys required when a policy does not specify its own.
pub const DEFAULT_REQUIRED_EVIDENCE: [&str; 2] = ["unit_tests", "integration_tests"];

/// Result of evaluating one proposal against one policy document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyEvaluation {
    pub passed: bool,
    pub violations: Vec<String>,
    pub required_evidence: Vec<String>,
    pub policy_name: String,
    pub performance_budget_ms: Option<f64>,
}

/// Deterministic rule gate. Evaluation is a pure function of the proposal
/// and the policy document; every check runs so the caller sees all
/// violations at once.
#[derive(Debug, Clone, Default)]
pub struct PolicyEngine;

impl PolicyEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(&self, proposal: &Proposal, policy: &PolicyDocument) -> PolicyEvaluation {
        let mut violations = Vec::new();

        self.check_risk_level(proposal, policy, &mut violations);
        self.check_forbidden_paths(proposal, policy, &mut violations);
        self.check_constraints(proposal, policy, &mut violations);

        let required_evidence = policy.rules.require_evidence.clone().unwrap_or_else(|| {
            DEFAULT_REQUIRED_EVIDENCE.iter().map(|s| s.to_string()).collect()
        });

        PolicyEvaluation {
            passed: violations.is_empty(),
            violations,
            required_evidence,
            policy_name: policy.name.clone(),
            performance_budget_ms: policy.rules.max_latency_delta_ms,
        }
    }

    fn check_risk_level(
        &self,
        proposal: &Proposal,
        policy: &PolicyDocument,
        violations: &mut Vec<String>,
    ) {
        if let Some(allowed) = &policy.applies_to {
            if !allowed.iter().any(|r| r == &proposal.risk_level) {
                violations.push(format!(
                    "risk_level {} not allowed (policy allows [{}])",
                    proposal.risk_level,
                    allowed.join(", ")
                ));
            }
        }
    }

    // Substring containment, not prefix matching: a forbidden component is
    // caught anywhere inside a scope entry, including nested paths.
    fn check_forbidden_paths(
        &self,
        proposal: &Proposal,
        policy: &PolicyDocument,
        violations: &mut Vec<String>,
    ) {
        for pattern in &policy.rules.forbid_paths {
            for path in &proposal.scope {
                if path.contains(pattern.as_str()) {
                    violations.push(format!(
                        "path '{}' violates forbid_paths rule '{}'",
                        path, pattern
                    ));
                }
            }
        }
    }

    fn check_constraints(
        &self,
        proposal: &Proposal,
        policy: &PolicyDocument,
        violations: &mut Vec<String>,
    ) {
        for constraint in &policy.rules.require_constraints {
            if !proposal.constraints.contains(constraint) {
                violations.push(format!("missing required constraint '{}'", constraint));
            }
        }
    }
}

/// Load a policy document. A missing or empty document is a hard error:
/// evaluation never proceeds against an implicit default.
pub fn load_policy(path: &Path) -> GateResult<PolicyDocument> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(GateError::NotFound {
                kind: "policy".to_string(),
                id: path.display().to_string(),
            });
        }
        Err(e) => {
            return Err(GateError::io(format!("failed to read policy {}", path.display()), e));
        }
    };
    if text.trim().is_empty() {
        return Err(GateError::NotFound {
            kind: "policy".to_string(),
            id: path.display().to_string(),
        });
    }
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        GateError::Serialization {
            message: format!("policy {}: {}", path.display(), e),
        }
    })?;
    match &value {
        serde_json::Value::Object(map) if !map.is_empty() => {}
        _ => {
            return Err(GateError::NotFound {
                kind: "policy".to_string(),
                id: path.display().to_string(),
            });
        }
    }
    serde_json::from_value(value).map_err(|e| GateError::Serialization {
        message: format!("policy {}: {}", path.display(), e),
    })
}
