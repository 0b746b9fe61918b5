//! Evidence validation against policy-derived requirements.

use crate::error::{GateError, GateResult};
use crate::types::EvidenceDocument;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Metadata fields every evidence document must carry.
pub const REQUIRED_METADATA: [&str; 3] = ["runner", "run_id", "artifact_sha256"];

/// Evidence field holding the submitted performance delta.
pub const PERFORMANCE_FIELD: &str = "p95_latency_delta_ms";

/// Textual values accepted as a passing check indicator (after lowercase
/// normalization).
const PASS_VALUES: [&str; 4] = ["pass", "passed", "ok", "success"];

/// Result of evaluating one evidence document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EvidenceEvaluation {
    pub passed: bool,
    pub missing: Vec<String>,
    pub failures: Vec<String>,
    pub metadata_missing: Vec<String>,
    pub metadata_invalid: Vec<String>,
    pub performance: Option<f64>,
    pub performance_budget_ms: Option<f64>,
}

/// Deterministic evidence gate. Pure function of its inputs; no I/O.
#[derive(Debug, Clone, Default)]
pub struct EvidenceValidator;

impl EvidenceValidator {
    pub fn new() -> Self {
        Self
    }

    pub fn evaluate(
        &self,
        evidence: &EvidenceDocument,
        required_keys: &[String],
        required_metadata: &[String],
        performance_budget_ms: Option<f64>,
    ) -> EvidenceEvaluation {
        let mut missing = Vec::new();
        let mut failures = Vec::new();
        let mut metadata_missing = Vec::new();
        let mut metadata_invalid = Vec::new();

        for key in required_keys {
            match evidence.get(key) {
                None => missing.push(key.clone()),
                Some(value) => {
                    if !check_passes(value) {
                        failures.push(format!("{}={}", key, render_value(value)));
                    }
                }
            }
        }

        for meta in required_metadata {
            match evidence.get(meta) {
                None => metadata_missing.push(meta.clone()),
                Some(value) => {
                    if is_empty_value(value) {
                        metadata_invalid.push(format!("{}=<empty>", meta));
                    }
                }
            }
        }

        let mut performance = None;
        let mut budget_out = None;
        let mut budget_exceeded = false;
        match (performance_budget_ms, evidence.get(PERFORMANCE_FIELD)) {
            (Some(budget), Some(raw)) => match parse_number(raw) {
                Some(value) => {
                    performance = Some(value);
                    budget_out = Some(budget);
                    if value > budget {
                        budget_exceeded = true;
                        failures.push(format!(
                            "{}={} exceeds budget {}",
                            PERFORMANCE_FIELD, value, budget
                        ));
                    }
                }
                None => {
                    failures.push(format!("Invalid performance value: {}", render_value(raw)));
                }
            },
            // No budget configured: parse best-effort for reporting only.
            (None, Some(raw)) => performance = parse_number(raw),
            (_, None) => {}
        }

        let passed = missing.is_empty()
            && failures.is_empty()
            && metadata_missing.is_empty()
            && metadata_invalid.is_empty()
            && !budget_exceeded;

        EvidenceEvaluation {
            passed,
            missing,
            failures,
            metadata_missing,
            metadata_invalid,
            performance,
            performance_budget_ms: budget_out,
        }
    }
}

// Textual indicators are normalized; non-textual indicators pass only for
// boolean true. A numeric 1 is NOT treated as true.
fn check_passes(value: &Value) -> bool {
    match value {
        Value::String(s) => PASS_VALUES.contains(&s.to_lowercase().as_str()),
        Value::Bool(b) => *b,
        _ => false,
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        _ => false,
    }
}

fn parse_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Load an evidence document. Absence and emptiness both surface as
/// `NotFound`; callers record that as a soft evidence failure rather than
/// aborting the evaluation.
pub fn load_evidence(path: &Path) -> GateResult<EvidenceDocument> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(GateError::NotFound {
                kind: "evidence".to_string(),
                id: path.display().to_string(),
            });
        }
        Err(e) => {
            return Err(GateError::io(
                format!("failed to read evidence {}", path.display()),
                e,
            ));
        }
    };
    if text.trim().is_empty() {
        return Err(GateError::NotFound {
            kind: "evidence".to_string(),
            id: path.display().to_string(),
        });
    }
    let value: serde_json::Value = serde_json::from_str(&text).map_err(|e| {
        GateError::Serialization {
            message: format!("evidence {}: {}", path.display(), e),
        }
    })?;
    let document = EvidenceDocument::from_value(value)?;
    if document.is_empty() {
        return Err(GateError::NotFound {
            kind: "evidence".to_string(),
            id: path.display().to_string(),
        });
    }
    Ok(document)
}
