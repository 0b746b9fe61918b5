//! Decision authorization: actor allowlist and time-based one-time codes.

use crate::error::{GateError, GateResult};
use crate::types::{utc_now, DecisionKind, DecisionRecord, Proposal};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

type HmacSha1 = Hmac<Sha1>;

/// Read the decision allowlist: one actor identifier per line, lowercased,
/// `#`-prefixed comment lines ignored. A missing file yields an empty set.
pub fn read_allowlist(path: &Path) -> HashSet<String> {
    let Ok(text) = std::fs::read_to_string(path) else {
        return HashSet::new();
    };
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.to_lowercase())
        .collect()
}

// RFC 4648 base32, strict: uppercase alphabet, '=' padding only at the end,
// total length a multiple of eight. Anything else is not base32.
fn decode_base32(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ234567";
    if input.is_empty() || input.len() % 8 != 0 {
        return None;
    }
    let data = input.trim_end_matches('=');
    if data.contains('=') {
        return None;
    }
    let mut bits: u32 = 0;
    let mut nbits = 0u32;
    let mut out = Vec::with_capacity(data.len() * 5 / 8);
    for ch in data.bytes() {
        let index = ALPHABET.iter().position(|&a| a == ch)? as u32;
        bits = (bits << 5) | index;
        nbits += 5;
        if nbits >= 8 {
            nbits -= 8;
            out.push((bits >> nbits) as u8);
            bits &= (1 << nbits) - 1;
        }
    }
    Some(out)
}

/// Time-based one-time code generator/validator (HMAC-SHA1, 30-second
/// steps, six digits).
#[derive(Clone)]
pub struct Totp {
    secret: Vec<u8>,
    pub interval: u64,
    pub digits: u32,
}

impl std::fmt::Debug for Totp {
    // The shared secret never appears in debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Totp")
            .field("interval", &self.interval)
            .field("digits", &self.digits)
            .finish()
    }
}

impl Totp {
    pub const DEFAULT_INTERVAL: u64 = 30;
    pub const DEFAULT_DIGITS: u32 = 6;

    /// Load the shared secret from the named environment variable.
    pub fn from_env(var: &str) -> GateResult<Self> {
        match std::env::var(var) {
            Ok(raw) if !raw.is_empty() => Ok(Self::from_encoded_secret(&raw)),
            _ => Err(GateError::MissingSecret { var: var.to_string() }),
        }
    }

    /// Base32 secrets decode to raw key bytes; anything that fails strict
    /// base32 decoding is used as the literal byte string.
    pub fn from_encoded_secret(raw: &str) -> Self {
        let secret = decode_base32(&raw.to_uppercase())
            .unwrap_or_else(|| raw.as_bytes().to_vec());
        Self::from_secret(secret)
    }

    pub fn from_secret(secret: Vec<u8>) -> Self {
        Self {
            secret,
            interval: Self::DEFAULT_INTERVAL,
            digits: Self::DEFAULT_DIGITS,
        }
    }

    pub fn current_step(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        now / self.interval
    }

    // RFC 4226 dynamic truncation: low four bits of the final digest byte
    // select a four-byte window, sign bit masked off, reduced modulo 10^d.
    fn raw_code_at_step(&self, step: u64) -> u32 {
        let mut mac = HmacSha1::new_from_slice(&self.secret)
            .expect("hmac accepts keys of any length");
        mac.update(&step.to_be_bytes());
        let digest = mac.finalize().into_bytes();
        let offset = (digest[digest.len() - 1] & 0x0f) as usize;
        let window = [
            digest[offset],
            digest[offset + 1],
            digest[offset + 2],
            digest[offset + 3],
        ];
        (u32::from_be_bytes(window) & 0x7fff_ffff) % 10u32.pow(self.digits)
    }

    /// The zero-padded code for an explicit time step.
    pub fn code_at_step(&self, step: u64) -> String {
        format!("{:0width$}", self.raw_code_at_step(step), width = self.digits as usize)
    }

    /// The code for the current time step.
    pub fn generate(&self) -> String {
        self.code_at_step(self.current_step())
    }

    /// Validate a code against the current step with a one-step window on
    /// either side to absorb clock skew.
    pub fn validate(&self, provided: &str) -> bool {
        self.validate_at(provided, self.current_step(), 1)
    }

    /// Validate a code against an explicit step and window.
    pub fn validate_at(&self, provided: &str, step: u64, window: u64) -> bool {
        let Ok(value) = provided.trim().parse::<u32>() else {
            return false;
        };
        let low = step.saturating_sub(window);
        (low..=step.saturating_add(window)).any(|s| self.raw_code_at_step(s) == value)
    }
}

/// Verifies actor identity and the one-time credential, then drives the
/// accept/reject transition. Allowlist and secret are re-read on every call
/// so credential rotation takes effect without a restart.
#[derive(Debug, Clone)]
pub struct DecisionAuthority {
    allowlist_path: PathBuf,
    secret_env: String,
}

impl DecisionAuthority {
    pub fn new(allowlist_path: PathBuf, secret_env: String) -> Self {
        Self { allowlist_path, secret_env }
    }

    pub fn is_allowed_actor(&self, actor: &str) -> bool {
        !actor.is_empty() && read_allowlist(&self.allowlist_path).contains(&actor.to_lowercase())
    }

    /// Authorize a decision and apply it to the proposal.
    ///
    /// Check order is part of the contract: decision syntax, then allowlist
    /// membership, then the one-time code - an unauthorized actor's
    /// credential is never evaluated. Any failure leaves the proposal
    /// untouched.
    pub fn authorize(
        &self,
        proposal: &mut Proposal,
        decision: &str,
        actor: &str,
        reason: &str,
        otp: &str,
    ) -> GateResult<DecisionRecord> {
        let kind = DecisionKind::parse(decision)?;

        if !self.is_allowed_actor(actor) {
            warn!(actor, proposal = %proposal.id, "decision denied: actor not allowlisted");
            return Err(GateError::Authorization { actor: actor.to_string() });
        }

        if otp.is_empty() {
            return Err(GateError::InvalidCredential {
                reason: "otp code required".to_string(),
            });
        }
        let totp = Totp::from_env(&self.secret_env)?;
        if !totp.validate(otp) {
            warn!(actor, proposal = %proposal.id, "decision denied: otp code rejected");
            return Err(GateError::InvalidCredential {
                reason: "otp code rejected".to_string(),
            });
        }

        proposal.apply_state(kind.target_state())?;
        let record = DecisionRecord {
            proposal_id: proposal.id.clone(),
            decision: kind,
            by: actor.to_string(),
            reason: reason.to_string(),
            timestamp: utc_now(),
        };
        proposal.decision = Some(record.clone());
        Ok(record)
    }
}
