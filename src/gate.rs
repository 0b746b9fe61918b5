//! The governance control-plane: propose, evaluate, decide, commit.
//!
//! Composes the state machine, policy engine, evidence validator, decision
//! authority, store, and audit trail into the operations callers invoke.
//! Every mutating operation on a proposal runs under that proposal's
//! exclusive lock, held across the whole read-modify-write cycle.

use crate::audit::{AuditTrail, EventKind};
use crate::authority::DecisionAuthority;
use crate::config::GateConfig;
use crate::error::{GateError, GateResult};
use crate::evidence::{load_evidence, EvidenceEvaluation, EvidenceValidator, REQUIRED_METADATA};
use crate::policy::{load_policy, PolicyEngine, PolicyEvaluation};
use crate::state::ProposalState;
use crate::store::{write_atomic, ProposalStore};
use crate::types::{
    hash_file, utc_now, CommitRecord, DecisionRecord, EvidenceDocument, EvidenceSnapshot,
    PolicySnapshot, Proposal,
};
use serde_json::json;
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

/// Inputs for creating a proposal.
#[derive(Debug, Clone)]
pub struct ProposalRequest {
    /// Caller-supplied id; generated when absent.
    pub id: Option<String>,
    pub agent: String,
    pub goal: String,
    pub scope: Vec<String>,
    pub constraints: Vec<String>,
    pub risk_level: String,
}

impl Default for ProposalRequest {
    fn default() -> Self {
        Self {
            id: None,
            agent: String::new(),
            goal: String::new(),
            scope: Vec::new(),
            constraints: Vec::new(),
            risk_level: "medium".to_string(),
        }
    }
}

/// Where an evaluate call takes its evidence document from.
#[derive(Debug, Clone)]
pub enum EvidenceSource {
    /// The conventional per-proposal location under the evidence dir.
    Default,
    /// An explicit document file.
    File(PathBuf),
    /// A document submitted inline by the caller.
    Inline(EvidenceDocument),
}

/// Combined result of one evaluate call.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub policy: PolicyEvaluation,
    /// Absent when the evidence document itself was missing or empty.
    pub evidence: Option<EvidenceEvaluation>,
    pub state: ProposalState,
}

/// Contract for the external collaborator that materializes an accepted
/// proposal as a version-control commit. Its VCS work is not covered by
/// the proposal lock.
pub trait CommitMaterializer {
    /// Paths currently staged for the commit, repo-relative.
    fn staged_paths(&self) -> GateResult<Vec<String>>;
    /// Stage/commit/tag/push and report what happened.
    fn materialize(&self, proposal: &Proposal) -> GateResult<CommitRecord>;
}

fn generate_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// The governance control-plane facade.
#[derive(Debug)]
pub struct Gate {
    config: GateConfig,
    store: ProposalStore,
    engine: PolicyEngine,
    validator: EvidenceValidator,
    authority: DecisionAuthority,
    audit: AuditTrail,
}

impl Gate {
    pub fn new(config: GateConfig) -> Self {
        let store = ProposalStore::new(
            config.proposals_dir(),
            config.locks_dir(),
            config.lock_timeout,
        );
        let authority = DecisionAuthority::new(
            config.allowlist_file.clone(),
            config.totp_secret_env.clone(),
        );
        let audit = AuditTrail::new(
            config.audit_log_file.clone(),
            config.locks_dir().join("audit.log.lock"),
            config.lock_timeout,
        );
        Self {
            store,
            engine: PolicyEngine::new(),
            validator: EvidenceValidator::new(),
            authority,
            audit,
            config,
        }
    }

    /// Attach a best-effort secondary proposal index.
    pub fn with_proposal_mirror(mut self, mirror: Box<dyn crate::store::ProposalMirror>) -> Self {
        self.store = self.store.with_mirror(mirror);
        self
    }

    /// Attach a best-effort secondary audit index.
    pub fn with_audit_mirror(mut self, mirror: Box<dyn crate::audit::AuditMirror>) -> Self {
        self.audit = self.audit.with_mirror(mirror);
        self
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn store(&self) -> &ProposalStore {
        &self.store
    }

    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    /// Create a proposal and advance it to `proposed` before first
    /// persistence; no draft record ever reaches the store.
    pub fn propose(&self, request: ProposalRequest) -> GateResult<Proposal> {
        let id = request.id.unwrap_or_else(generate_id);
        let mut proposal = Proposal::new(
            id,
            request.agent,
            request.goal,
            request.scope,
            request.constraints,
            request.risk_level,
        );
        proposal.validate()?;
        if self.store.exists(&proposal.id) {
            return Err(GateError::Validation {
                field: "id".to_string(),
                message: format!("proposal {} already exists", proposal.id),
            });
        }
        proposal.apply_state(ProposalState::Proposed)?;
        {
            let guard = self.store.lock(&proposal.id)?;
            self.store.save(&mut proposal, &guard)?;
        }
        self.audit.record(
            EventKind::Propose,
            &proposal.id,
            &proposal.agent,
            json!({
                "goal": &proposal.goal,
                "scope": &proposal.scope,
                "constraints": &proposal.constraints,
            }),
        )?;
        info!(proposal = %proposal.id, agent = %proposal.agent, "proposal created");
        Ok(proposal)
    }

    /// Evaluate a proposal against a policy document and its submitted
    /// evidence, attaching both snapshots.
    ///
    /// Policy violations and evidence failures are soft outcomes recorded
    /// on the proposal; the only observable effect is that the proposal
    /// does not advance to `evaluated`. A missing evidence document is
    /// likewise soft. Re-evaluation replaces the snapshots wholesale.
    pub fn evaluate(
        &self,
        proposal_id: &str,
        policy_path: Option<&Path>,
        evidence: EvidenceSource,
    ) -> GateResult<EvaluationOutcome> {
        let guard = self.store.lock(proposal_id)?;
        let mut proposal = self.store.load(proposal_id)?;
        if proposal.state.is_terminal() {
            return Err(GateError::Validation {
                field: "state".to_string(),
                message: format!(
                    "proposal {} is {}; cannot evaluate",
                    proposal.id, proposal.state
                ),
            });
        }

        let policy_file = policy_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.config.default_policy_file.clone());
        let policy = load_policy(&policy_file)?;
        let policy_hash = hash_file(&policy_file)?;
        let policy_eval = self.engine.evaluate(&proposal, &policy);
        proposal.policy = Some(PolicySnapshot {
            name: policy_eval.policy_name.clone(),
            path: policy_file.display().to_string(),
            hash: policy_hash,
            passed: policy_eval.passed,
            violations: policy_eval.violations.clone(),
            required_evidence: policy_eval.required_evidence.clone(),
            performance_budget_ms: policy_eval.performance_budget_ms,
            evaluated_at: utc_now(),
        });

        let (evidence_label, loaded) = match evidence {
            EvidenceSource::Inline(document) => ("inline".to_string(), Ok(document)),
            EvidenceSource::File(path) => (path.display().to_string(), load_evidence(&path)),
            EvidenceSource::Default => {
                let path = self.config.evidence_path(proposal_id);
                (path.display().to_string(), load_evidence(&path))
            }
        };
        let required_metadata: Vec<String> =
            REQUIRED_METADATA.iter().map(|s| s.to_string()).collect();
        let evidence_eval = match loaded {
            Ok(document) => Some(self.validator.evaluate(
                &document,
                &policy_eval.required_evidence,
                &required_metadata,
                policy_eval.performance_budget_ms,
            )),
            Err(GateError::NotFound { .. }) => None,
            Err(other) => return Err(other),
        };
        proposal.evidence = Some(match &evidence_eval {
            Some(ev) => EvidenceSnapshot {
                path: evidence_label,
                passed: ev.passed,
                missing: ev.missing.clone(),
                failures: ev.failures.clone(),
                metadata_missing: ev.metadata_missing.clone(),
                metadata_invalid: ev.metadata_invalid.clone(),
                performance: ev.performance,
                performance_budget_ms: ev.performance_budget_ms,
                evaluated_at: utc_now(),
            },
            None => EvidenceSnapshot {
                failures: vec![format!("evidence missing or empty at {}", evidence_label)],
                path: evidence_label,
                passed: false,
                missing: policy_eval.required_evidence.clone(),
                metadata_missing: Vec::new(),
                metadata_invalid: Vec::new(),
                performance: None,
                performance_budget_ms: None,
                evaluated_at: utc_now(),
            },
        });

        let evidence_passed = evidence_eval.as_ref().map_or(false, |ev| ev.passed);
        if policy_eval.passed && evidence_passed && proposal.state == ProposalState::Proposed {
            proposal.apply_state(ProposalState::Evaluated)?;
        }
        self.store.save(&mut proposal, &guard)?;
        drop(guard);

        self.audit.record(
            EventKind::Evaluate,
            proposal_id,
            &proposal.agent,
            json!({
                "policy_passed": policy_eval.passed,
                "policy_violations": &policy_eval.violations,
                "evidence_passed": evidence_passed,
            }),
        )?;
        info!(
            proposal = %proposal.id,
            policy_passed = policy_eval.passed,
            evidence_passed,
            state = %proposal.state,
            "proposal evaluated"
        );
        Ok(EvaluationOutcome {
            policy: policy_eval,
            evidence: evidence_eval,
            state: proposal.state,
        })
    }

    /// Record a human accept/reject decision, persisting the proposal and
    /// the independent decision artifact atomically under the proposal's
    /// lock. A decision, once recorded, is never overwritten: a second
    /// call fails at the state-machine step.
    pub fn decide(
        &self,
        proposal_id: &str,
        decision: &str,
        actor: &str,
        reason: &str,
        otp: &str,
    ) -> GateResult<DecisionRecord> {
        let guard = self.store.lock(proposal_id)?;
        let mut proposal = self.store.load(proposal_id)?;
        let record = self
            .authority
            .authorize(&mut proposal, decision, actor, reason, otp)?;
        self.store.save(&mut proposal, &guard)?;
        let mut artifact = serde_json::to_vec_pretty(&record)?;
        artifact.push(b'\n');
        write_atomic(&self.config.decision_path(proposal_id), &artifact)?;
        drop(guard);

        self.audit.record(
            EventKind::Decision,
            proposal_id,
            actor,
            json!({
                "decision": record.decision.as_str(),
                "reason": &record.reason,
            }),
        )?;
        info!(
            proposal = %proposal.id,
            decision = %record.decision,
            by = %record.by,
            "decision recorded"
        );
        Ok(record)
    }

    /// Materialize an accepted proposal through the external collaborator
    /// and advance it to `committed`.
    ///
    /// Every staged path must fall under at least one declared scope
    /// prefix; the proposal record's own consistency is guaranteed under
    /// its lock, while ordering against the underlying version-control
    /// state is the collaborator's responsibility.
    pub fn commit(
        &self,
        proposal_id: &str,
        materializer: &dyn CommitMaterializer,
    ) -> GateResult<CommitRecord> {
        let proposal = self.store.load(proposal_id)?;
        if proposal.state != ProposalState::Accepted {
            return Err(GateError::IllegalTransition {
                from: proposal.state,
                to: ProposalState::Committed,
            });
        }
        if proposal.scope.is_empty() {
            return Err(GateError::Validation {
                field: "scope".to_string(),
                message: format!("proposal {} declares no scope; nothing may be committed", proposal.id),
            });
        }
        let staged = materializer.staged_paths()?;
        if staged.is_empty() {
            return Err(GateError::Validation {
                field: "staged".to_string(),
                message: "no staged changes to materialize".to_string(),
            });
        }
        let outside: Vec<String> = staged
            .into_iter()
            .filter(|path| !proposal.scope.iter().any(|prefix| path.starts_with(prefix.as_str())))
            .collect();
        if !outside.is_empty() {
            return Err(GateError::ScopeViolation { paths: outside });
        }

        let record = materializer.materialize(&proposal)?;

        let guard = self.store.lock(proposal_id)?;
        let mut proposal = self.store.load(proposal_id)?;
        proposal.apply_state(ProposalState::Committed)?;
        proposal.commit = Some(record.clone());
        self.store.save(&mut proposal, &guard)?;
        drop(guard);

        self.audit.record(
            EventKind::Commit,
            proposal_id,
            "system",
            json!({
                "sha": &record.sha,
                "tag": &record.tag,
                "pushed": record.pushed,
                "branch": &record.branch,
            }),
        )?;
        info!(proposal = %proposal_id, sha = %record.sha, "proposal committed");
        Ok(record)
    }

    /// List all proposals, most recently updated first.
    pub fn list(&self) -> GateResult<Vec<Proposal>> {
        self.store.list()
    }

    /// Load one proposal by id.
    pub fn load(&self, proposal_id: &str) -> GateResult<Proposal> {
        self.store.load(proposal_id)
    }
}
