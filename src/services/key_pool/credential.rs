//! Credential state and health bookkeeping
//!
//! A `CredentialState` is one upstream API key plus everything the key
//! manager tracks about it. It is only ever touched while the manager's lock
//! is held, so the fields are plain values rather than atomics.

use chrono::{DateTime, Utc};
use serde::Serialize;

// ============================================================================
// Masking
// ============================================================================

/// Produce a display-safe form of a secret: first 4 and last 4 characters.
///
/// Secrets shorter than 8 characters are fully hidden.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

// ============================================================================
// Credential State
// ============================================================================

/// One upstream API key with its tracked health and cooldown
#[derive(Clone)]
pub struct CredentialState {
    index: usize,
    secret: String,
    secret_masked: String,
    pub(crate) success_count: u64,
    pub(crate) failure_count: u64,
    pub(crate) consecutive_failures: u32,
    pub(crate) last_used_at: Option<DateTime<Utc>>,
    pub(crate) last_error: Option<String>,
    pub(crate) cooldown_until: Option<DateTime<Utc>>,
}

impl CredentialState {
    /// Create a credential with zeroed health state
    pub fn new(index: usize, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self {
            index,
            secret_masked: mask_secret(&secret),
            secret,
            success_count: 0,
            failure_count: 0,
            consecutive_failures: 0,
            last_used_at: None,
            last_error: None,
            cooldown_until: None,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn secret_masked(&self) -> &str {
        &self.secret_masked
    }

    /// A credential is available when it has no cooldown or the cooldown has elapsed
    pub fn is_available_at(&self, now: DateTime<Utc>) -> bool {
        match self.cooldown_until {
            Some(until) => until <= now,
            None => true,
        }
    }

    /// Whether a cooldown is set and still in the future
    pub fn is_cooling_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_available_at(now)
    }

    /// Whether a cooldown is set but has already run out
    pub(crate) fn cooldown_elapsed_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.cooldown_until, Some(until) if until <= now)
    }

    pub(crate) fn mark_success(&mut self, now: DateTime<Utc>) {
        self.success_count += 1;
        self.last_used_at = Some(now);
        self.last_error = None;
        self.consecutive_failures = 0;
    }

    pub(crate) fn mark_failure(&mut self, description: &str, now: DateTime<Utc>) {
        self.failure_count += 1;
        self.last_used_at = Some(now);
        self.last_error = Some(description.to_string());
        self.consecutive_failures += 1;
    }

    /// Extend the cooldown to `until`; an existing later cooldown is kept
    pub(crate) fn extend_cooldown(&mut self, until: DateTime<Utc>) {
        self.cooldown_until = Some(match self.cooldown_until {
            Some(current) if current > until => current,
            _ => until,
        });
    }

    pub(crate) fn clear_cooldown(&mut self) {
        self.cooldown_until = None;
        self.consecutive_failures = 0;
    }

    /// Snapshot for statistics reporting
    pub fn snapshot(&self, now: DateTime<Utc>) -> CredentialSnapshot {
        CredentialSnapshot {
            index: self.index,
            masked_key: self.secret_masked.clone(),
            success_count: self.success_count,
            failure_count: self.failure_count,
            consecutive_failures: self.consecutive_failures,
            is_rate_limited: self.is_cooling_at(now),
            rate_limit_until: self.cooldown_until,
            last_used: self.last_used_at,
            last_error: self.last_error.clone(),
        }
    }
}

impl std::fmt::Debug for CredentialState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialState")
            .field("index", &self.index)
            .field("secret", &self.secret_masked)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("cooldown_until", &self.cooldown_until)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Snapshots
// ============================================================================

/// Read-only view of a credential, safe to serialize (the secret is masked)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialSnapshot {
    pub index: usize,
    pub masked_key: String,
    pub success_count: u64,
    pub failure_count: u64,
    pub consecutive_failures: u32,
    pub is_rate_limited: bool,
    pub rate_limit_until: Option<DateTime<Utc>>,
    pub last_used: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// The credential handed out by `KeyManager::select_next`
#[derive(Clone, PartialEq, Eq)]
pub struct SelectedCredential {
    pub index: usize,
    pub secret: String,
    /// Set when every credential was cooling down and this is only the one
    /// that recovers soonest
    pub still_cooling: bool,
}

impl SelectedCredential {
    pub fn masked(&self) -> String {
        mask_secret(&self.secret)
    }
}

impl std::fmt::Debug for SelectedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedCredential")
            .field("index", &self.index)
            .field("secret", &self.masked())
            .field("still_cooling", &self.still_cooling)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("hf_abcdefghijklmnop"), "hf_a...mnop");
        assert_eq!(mask_secret("12345678"), "1234...5678");
        assert_eq!(mask_secret("short"), "***");
        assert_eq!(mask_secret(""), "***");
    }

    #[test]
    fn test_new_credential_is_available() {
        let cred = CredentialState::new(0, "hf_test_key_value");
        let now = Utc::now();
        assert!(cred.is_available_at(now));
        assert!(!cred.is_cooling_at(now));
        assert_eq!(cred.secret_masked(), "hf_t...alue");
    }

    #[test]
    fn test_success_clears_error_and_streak() {
        let mut cred = CredentialState::new(0, "hf_test_key_value");
        let now = Utc::now();

        cred.mark_failure("boom", now);
        cred.mark_failure("boom again", now);
        assert_eq!(cred.consecutive_failures, 2);
        assert_eq!(cred.last_error.as_deref(), Some("boom again"));

        cred.mark_success(now);
        assert_eq!(cred.success_count, 1);
        assert_eq!(cred.failure_count, 2);
        assert_eq!(cred.consecutive_failures, 0);
        assert!(cred.last_error.is_none());
    }

    #[test]
    fn test_extend_cooldown_never_shortens() {
        let mut cred = CredentialState::new(0, "hf_test_key_value");
        let now = Utc::now();

        cred.extend_cooldown(now + Duration::minutes(5));
        cred.extend_cooldown(now + Duration::seconds(60));
        assert_eq!(cred.cooldown_until, Some(now + Duration::minutes(5)));
    }

    #[test]
    fn test_cooldown_elapsed() {
        let mut cred = CredentialState::new(0, "hf_test_key_value");
        let now = Utc::now();
        cred.extend_cooldown(now + Duration::seconds(10));

        assert!(cred.is_cooling_at(now));
        assert!(!cred.cooldown_elapsed_at(now));
        assert!(cred.cooldown_elapsed_at(now + Duration::seconds(10)));
        assert!(cred.is_available_at(now + Duration::seconds(11)));
    }

    #[test]
    fn test_selected_credential_debug_hides_secret() {
        let selected = SelectedCredential {
            index: 1,
            secret: "hf_super_secret_value".to_string(),
            still_cooling: false,
        };
        let rendered = format!("{:?}", selected);
        assert!(!rendered.contains("super_secret"));
        assert!(rendered.contains("hf_s...alue"));
    }
}
