//! Filesystem layout and credential configuration.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use subtle::{Choice, ConstantTimeEq};

/// Configuration for the governance control-plane: storage layout,
/// credential sources, and lock behavior.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Base directory for all governance state.
    pub root: PathBuf,
    /// Policy applied when an operation names none.
    pub default_policy_file: PathBuf,
    /// Decision allowlist, one actor per line.
    pub allowlist_file: PathBuf,
    /// Append-only audit log.
    pub audit_log_file: PathBuf,
    /// API tokens for transport-layer callers, one per line.
    pub api_token_file: PathBuf,
    /// Environment variable holding the shared TOTP secret.
    pub totp_secret_env: String,
    /// Environment variable holding a transport API token.
    pub api_token_env: String,
    /// Prefix for tags the commit collaborator creates.
    pub tag_prefix: String,
    /// Budget for advisory lock acquisition before a retryable timeout.
    pub lock_timeout: Duration,
}

impl GateConfig {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    /// Build a configuration rooted at `root`, with the conventional
    /// layout underneath it.
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            default_policy_file: root.join("policies").join("default.json"),
            allowlist_file: root.join("auth_allowlist.txt"),
            audit_log_file: root.join("audit.log"),
            api_token_file: root.join("api_tokens.txt"),
            totp_secret_env: "AGK_TOTP_SECRET".to_string(),
            api_token_env: "AGK_API_TOKEN".to_string(),
            tag_prefix: "agk/".to_string(),
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            root,
        }
    }

    pub fn proposals_dir(&self) -> PathBuf {
        self.root.join("proposals")
    }

    pub fn policies_dir(&self) -> PathBuf {
        self.root.join("policies")
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.root.join("evidence")
    }

    pub fn decisions_dir(&self) -> PathBuf {
        self.root.join("decisions")
    }

    pub fn locks_dir(&self) -> PathBuf {
        self.root.join("locks")
    }

    /// Conventional location of a proposal's submitted evidence.
    pub fn evidence_path(&self, proposal_id: &str) -> PathBuf {
        self.evidence_dir().join(proposal_id).join("results.json")
    }

    /// Location of a proposal's independent decision artifact.
    pub fn decision_path(&self, proposal_id: &str) -> PathBuf {
        self.decisions_dir().join(format!("{}.json", proposal_id))
    }

    /// Load the transport API token set from the environment plus the
    /// token file. Re-read on every call so rotation takes effect
    /// immediately. `#`-prefixed comment lines are ignored.
    pub fn load_api_tokens(&self) -> HashSet<String> {
        let mut tokens = HashSet::new();
        if let Ok(token) = std::env::var(&self.api_token_env) {
            let token = token.trim();
            if !token.is_empty() {
                tokens.insert(token.to_string());
            }
        }
        if let Ok(text) = std::fs::read_to_string(&self.api_token_file) {
            for line in text.lines() {
                let line = line.trim();
                if !line.is_empty() && !line.starts_with('#') {
                    tokens.insert(line.to_string());
                }
            }
        }
        tokens
    }

    /// Check a presented token against the configured set in constant
    /// time per candidate.
    pub fn verify_api_token(&self, provided: &str) -> bool {
        if provided.is_empty() {
            return false;
        }
        let tokens = self.load_api_tokens();
        let mut matched = Choice::from(0u8);
        for token in &tokens {
            matched |= token.as_bytes().ct_eq(provided.as_bytes());
        }
        bool::from(matched)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self::rooted(Path::new("governance"))
    }
}
