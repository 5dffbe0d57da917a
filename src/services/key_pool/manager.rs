//! Key Manager Implementation
//!
//! The `KeyManager` owns the upstream credentials, hands them out in
//! round-robin order while skipping keys on cooldown, and records the
//! outcome of every attempt. All state sits behind one mutex; each public
//! method is a single critical section.

use super::credential::{CredentialSnapshot, CredentialState, SelectedCredential};
use crate::services::failure::{classify_failure, FailureKind};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;

// ============================================================================
// Configuration
// ============================================================================

/// Cooldown policy for failing credentials
#[derive(Debug, Clone)]
pub struct KeyManagerConfig {
    /// Cooldown applied when a failure is a throttling signal
    pub throttle_cooldown: Duration,
    /// Consecutive failures that trigger the longer cooldown
    pub max_consecutive_failures: u32,
    /// Cooldown applied once `max_consecutive_failures` is reached
    pub failure_cooldown: Duration,
}

impl Default for KeyManagerConfig {
    fn default() -> Self {
        Self {
            throttle_cooldown: Duration::seconds(60),
            max_consecutive_failures: 3,
            failure_cooldown: Duration::minutes(5),
        }
    }
}

// ============================================================================
// Key Manager
// ============================================================================

#[derive(Debug, Default)]
struct PoolState {
    credentials: Vec<CredentialState>,
    cursor: usize,
}

/// Rotating pool of upstream API keys with per-key health tracking
#[derive(Debug)]
pub struct KeyManager {
    state: Mutex<PoolState>,
    config: KeyManagerConfig,
}

impl KeyManager {
    /// Create a manager from the configured secrets (index = position)
    pub fn new(secrets: Vec<String>) -> Self {
        Self::with_config(secrets, KeyManagerConfig::default())
    }

    pub fn with_config(secrets: Vec<String>, config: KeyManagerConfig) -> Self {
        let credentials: Vec<CredentialState> = secrets
            .into_iter()
            .enumerate()
            .map(|(index, secret)| CredentialState::new(index, secret))
            .collect();

        tracing::info!(key_count = credentials.len(), "Initialized key manager");

        Self {
            state: Mutex::new(PoolState {
                credentials,
                cursor: 0,
            }),
            config,
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick the next credential to use
    pub fn select_next(&self) -> Option<SelectedCredential> {
        self.select_next_at(Utc::now())
    }

    /// Selection against an explicit clock.
    ///
    /// Scans once from the cursor for a credential whose cooldown is unset or
    /// elapsed; an elapsed cooldown is cleared on the way out. When every key
    /// is still cooling down, the one recovering soonest (lowest index on
    /// ties) is returned with `still_cooling` set and its cooldown untouched.
    pub fn select_next_at(&self, now: DateTime<Utc>) -> Option<SelectedCredential> {
        let mut state = self.state.lock();
        let len = state.credentials.len();
        if len == 0 {
            return None;
        }

        for offset in 0..len {
            let idx = (state.cursor + offset) % len;
            let cred = &mut state.credentials[idx];
            if !cred.is_available_at(now) {
                continue;
            }
            if cred.cooldown_elapsed_at(now) {
                cred.clear_cooldown();
                tracing::info!(
                    key_index = idx,
                    key = %cred.secret_masked(),
                    "Cooldown expired, credential reinstated"
                );
            }
            let selected = Self::selected(cred, false);
            state.cursor = (idx + 1) % len;
            return Some(selected);
        }

        let soonest = state
            .credentials
            .iter()
            .min_by_key(|c| (c.cooldown_until, c.index()))
            .map(|c| c.index())?;
        state.cursor = (soonest + 1) % len;

        tracing::warn!(
            key_index = soonest,
            cooldown_until = ?state.credentials[soonest].cooldown_until,
            "All credentials cooling down, using the one that recovers soonest"
        );

        Some(Self::selected(&state.credentials[soonest], true))
    }

    fn selected(cred: &CredentialState, still_cooling: bool) -> SelectedCredential {
        SelectedCredential {
            index: cred.index(),
            secret: cred.secret().to_string(),
            still_cooling,
        }
    }

    /// Record a successful attempt; unknown indices are ignored
    pub fn record_success(&self, index: usize) {
        self.record_success_at(index, Utc::now());
    }

    pub fn record_success_at(&self, index: usize, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        if let Some(cred) = state.credentials.get_mut(index) {
            cred.mark_success(now);
            tracing::debug!(key_index = index, successes = cred.success_count, "Recorded success");
        }
    }

    /// Record a failed attempt, classifying the description to decide
    /// whether it is a throttling signal
    pub fn record_failure(&self, index: usize, description: &str) {
        self.record_failure_at(index, description, Utc::now());
    }

    pub fn record_failure_at(&self, index: usize, description: &str, now: DateTime<Utc>) {
        let kind = classify_failure(None, description);
        self.record_classified_failure_at(index, description, kind, now);
    }

    /// Record a failed attempt whose kind the caller already knows
    pub fn record_classified_failure(&self, index: usize, description: &str, kind: FailureKind) {
        self.record_classified_failure_at(index, description, kind, Utc::now());
    }

    pub fn record_classified_failure_at(
        &self,
        index: usize,
        description: &str,
        kind: FailureKind,
        now: DateTime<Utc>,
    ) {
        let mut state = self.state.lock();
        let Some(cred) = state.credentials.get_mut(index) else {
            return;
        };

        cred.mark_failure(description, now);

        if kind == FailureKind::Throttled {
            cred.extend_cooldown(now + self.config.throttle_cooldown);
            tracing::warn!(
                key_index = index,
                key = %cred.secret_masked(),
                cooldown_until = ?cred.cooldown_until,
                "Credential rate limited"
            );
        }

        if cred.consecutive_failures >= self.config.max_consecutive_failures {
            cred.extend_cooldown(now + self.config.failure_cooldown);
            tracing::warn!(
                key_index = index,
                key = %cred.secret_masked(),
                consecutive_failures = cred.consecutive_failures,
                cooldown_until = ?cred.cooldown_until,
                "Credential disabled after consecutive failures"
            );
        }

        tracing::debug!(
            key_index = index,
            kind = %kind,
            failures = cred.failure_count,
            error = %description,
            "Recorded failure"
        );
    }

    /// Clear a credential's cooldown and failure streak.
    ///
    /// Returns `false` when the index is unknown.
    pub fn reset_cooldown(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        match state.credentials.get_mut(index) {
            Some(cred) => {
                cred.clear_cooldown();
                tracing::info!(key_index = index, "Credential cooldown reset");
                true
            }
            None => false,
        }
    }

    /// Append a credential at runtime and return its index
    pub fn add_credential(&self, secret: impl Into<String>) -> usize {
        let mut state = self.state.lock();
        let index = state.credentials.len();
        let cred = CredentialState::new(index, secret);
        tracing::info!(key_index = index, key = %cred.secret_masked(), "Added credential");
        state.credentials.push(cred);
        index
    }

    /// Aggregate health statistics
    pub fn statistics(&self) -> KeyStatistics {
        self.statistics_at(Utc::now())
    }

    pub fn statistics_at(&self, now: DateTime<Utc>) -> KeyStatistics {
        let state = self.state.lock();
        let per_credential: Vec<CredentialSnapshot> =
            state.credentials.iter().map(|c| c.snapshot(now)).collect();
        drop(state);

        let total_count = per_credential.len();
        let cooldown_count = per_credential.iter().filter(|c| c.is_rate_limited).count();
        let total_success: u64 = per_credential.iter().map(|c| c.success_count).sum();
        let total_failures: u64 = per_credential.iter().map(|c| c.failure_count).sum();
        let attempts = total_success + total_failures;
        let success_rate_percent = if attempts > 0 {
            total_success as f64 / attempts as f64 * 100.0
        } else {
            0.0
        };

        KeyStatistics {
            total_count,
            available_count: total_count - cooldown_count,
            cooldown_count,
            total_success,
            total_failures,
            success_rate_percent,
            per_credential,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Snapshot of the key pool's health
#[derive(Debug, Clone, Serialize)]
pub struct KeyStatistics {
    pub total_count: usize,
    pub available_count: usize,
    pub cooldown_count: usize,
    pub total_success: u64,
    pub total_failures: u64,
    pub success_rate_percent: f64,
    pub per_credential: Vec<CredentialSnapshot>,
}

impl KeyStatistics {
    /// Success rate rounded to two decimals for display
    pub fn success_rate_rounded(&self) -> f64 {
        (self.success_rate_percent * 100.0).round() / 100.0
    }

    /// True when keys exist but none can be used right now
    pub fn all_cooling(&self) -> bool {
        self.total_count > 0 && self.available_count == 0
    }
}

// ============================================================================
// Tests
// ============================================================================
