//! Proposal lifecycle state machine.
//!
//! The transition graph is fixed: extending it is a new version of the
//! system, not configuration.

use crate::error::{GateError, GateResult};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a proposal.
///
/// `Draft` is transient: a proposal is persisted only after the
/// `Draft -> Proposed` transition, so no persisted record is ever a draft.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    Draft,
    Proposed,
    Evaluated,
    Accepted,
    Rejected,
    Committed,
}

impl ProposalState {
    pub const ALL: [ProposalState; 6] = [
        Self::Draft,
        Self::Proposed,
        Self::Evaluated,
        Self::Accepted,
        Self::Rejected,
        Self::Committed,
    ];

    /// States reachable from `self` in one transition.
    pub fn allowed_targets(self) -> &'static [ProposalState] {
        match self {
            Self::Draft => &[Self::Proposed],
            Self::Proposed => &[Self::Evaluated, Self::Rejected],
            Self::Evaluated => &[Self::Accepted, Self::Rejected],
            Self::Accepted => &[Self::Committed],
            Self::Rejected | Self::Committed => &[],
        }
    }

    pub fn can_transition(self, target: ProposalState) -> bool {
        self.allowed_targets().contains(&target)
    }

    /// Rejected and committed proposals admit no further transitions.
    pub fn is_terminal(self) -> bool {
        self.allowed_targets().is_empty()
    }

    /// Parse a state from its persisted text, returning an error for
    /// unknown values rather than coercing to a default.
    pub fn parse(s: &str) -> GateResult<Self> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "proposed" => Ok(Self::Proposed),
            "evaluated" => Ok(Self::Evaluated),
            "accepted" => Ok(Self::Accepted),
            "rejected" => Ok(Self::Rejected),
            "committed" => Ok(Self::Committed),
            _ => Err(GateError::UnknownState { value: s.to_string() }),
        }
    }

    /// Convert state to canonical string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Proposed => "proposed",
            Self::Evaluated => "evaluated",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Committed => "committed",
        }
    }
}

impl std::fmt::Display for ProposalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProposalState {
    type Err = GateError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Return `target` if the transition is allowed from `current`; otherwise
/// fail with `IllegalTransition` naming both states.
pub fn transition(current: ProposalState, target: ProposalState) -> GateResult<ProposalState> {
    if current.can_transition(target) {
        Ok(target)
    } else {
        Err(GateError::IllegalTransition { from: current, to: target })
    }
}
