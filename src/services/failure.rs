//! Upstream failure taxonomy
//!
//! Every failed upstream attempt is reduced to one `FailureKind`. Both the
//! orchestrator's retry decisions and the key manager's throttle cooldown
//! go through `classify_failure`, so the substring rules live only here.

use serde::Serialize;
use thiserror::Error;

/// Description recorded when the provider answers with no text
pub const EMPTY_RESPONSE: &str = "empty response from model";

const THROTTLE_MARKERS: &[&str] = &["rate limit", "rate_limit", "too many requests", "quota"];
const UNAUTHORIZED_MARKERS: &[&str] = &["unauthorized", "invalid api key", "invalid credentials"];
const MODEL_UNAVAILABLE_MARKERS: &[&str] = &["not found", "not accessible", "does not exist"];
const TIMEOUT_MARKERS: &[&str] = &["timed out", "timeout", "deadline"];

// ============================================================================
// Failure Kind
// ============================================================================

/// Classification of a failed upstream attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The credential was rejected; no model will work with it
    Unauthorized,
    /// The model does not exist or this credential cannot reach it
    ModelUnavailable,
    /// The credential hit a rate limit or quota
    Throttled,
    /// The attempt exceeded its deadline
    Timeout,
    /// Anything else
    Unknown,
}

impl FailureKind {
    /// Failures scoped to the credential abandon the remaining models for it
    pub fn abandons_credential(self) -> bool {
        matches!(self, FailureKind::Unauthorized | FailureKind::Throttled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FailureKind::Unauthorized => "unauthorized",
            FailureKind::ModelUnavailable => "model_unavailable",
            FailureKind::Throttled => "throttled",
            FailureKind::Timeout => "timeout",
            FailureKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an HTTP status (if any) and a message to a failure kind.
///
/// The status wins when it is one of the well-known codes; otherwise the
/// message is matched case-insensitively.
pub fn classify_failure(status: Option<u16>, message: &str) -> FailureKind {
    match status {
        Some(401) | Some(403) => return FailureKind::Unauthorized,
        Some(404) => return FailureKind::ModelUnavailable,
        Some(429) => return FailureKind::Throttled,
        Some(408) | Some(504) => return FailureKind::Timeout,
        _ => {}
    }

    let lower = message.to_lowercase();
    let contains_any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if mentions_status(&lower, "429") || contains_any(THROTTLE_MARKERS) {
        FailureKind::Throttled
    } else if mentions_status(&lower, "401") || contains_any(UNAUTHORIZED_MARKERS) {
        FailureKind::Unauthorized
    } else if mentions_status(&lower, "404") || contains_any(MODEL_UNAVAILABLE_MARKERS) {
        FailureKind::ModelUnavailable
    } else if contains_any(TIMEOUT_MARKERS) {
        FailureKind::Timeout
    } else {
        FailureKind::Unknown
    }
}

/// A status code counts only as a whole number, so `14291` is not a 429
fn mentions_status(message: &str, code: &str) -> bool {
    message
        .split(|c: char| !c.is_ascii_digit())
        .any(|token| token == code)
}

// ============================================================================
// Upstream Failure
// ============================================================================

/// A failed call to the upstream provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamFailure {
    #[error("Upstream returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Upstream transport error: {0}")]
    Transport(String),

    #[error("Malformed upstream response: {0}")]
    Malformed(String),
}

impl UpstreamFailure {
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        UpstreamFailure::Status {
            status,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            UpstreamFailure::Status { status, message } => classify_failure(Some(*status), message),
            UpstreamFailure::Timeout(_) => FailureKind::Timeout,
            UpstreamFailure::Transport(msg) | UpstreamFailure::Malformed(msg) => {
                classify_failure(None, msg)
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(classify_failure(Some(401), ""), FailureKind::Unauthorized);
        assert_eq!(classify_failure(Some(403), ""), FailureKind::Unauthorized);
        assert_eq!(classify_failure(Some(404), ""), FailureKind::ModelUnavailable);
        assert_eq!(classify_failure(Some(429), ""), FailureKind::Throttled);
        assert_eq!(classify_failure(Some(504), ""), FailureKind::Timeout);
        assert_eq!(classify_failure(Some(503), "overloaded"), FailureKind::Unknown);
        assert_eq!(classify_failure(Some(500), ""), FailureKind::Unknown);
    }

    #[test]
    fn test_message_markers() {
        assert_eq!(classify_failure(None, "Rate limit reached"), FailureKind::Throttled);
        assert_eq!(classify_failure(None, "Monthly QUOTA exceeded"), FailureKind::Throttled);
        assert_eq!(classify_failure(None, "Too Many Requests"), FailureKind::Throttled);
        assert_eq!(
            classify_failure(None, "Model is not accessible with this token"),
            FailureKind::ModelUnavailable
        );
        assert_eq!(classify_failure(None, "Unauthorized"), FailureKind::Unauthorized);
        assert_eq!(classify_failure(None, "operation timed out"), FailureKind::Timeout);
        assert_eq!(classify_failure(None, "something odd"), FailureKind::Unknown);
        assert_eq!(classify_failure(None, EMPTY_RESPONSE), FailureKind::Unknown);
    }

    #[test]
    fn test_status_codes_in_messages_match_whole_numbers() {
        assert_eq!(classify_failure(None, "429 Too Many"), FailureKind::Throttled);
        assert_eq!(classify_failure(None, "HTTP 401"), FailureKind::Unauthorized);
        assert_eq!(classify_failure(None, "error 404: gone"), FailureKind::ModelUnavailable);
        assert_eq!(
            classify_failure(None, "500: request 14291 failed"),
            FailureKind::Unknown
        );
        assert_eq!(classify_failure(None, "trace 4040 aborted"), FailureKind::Unknown);
    }

    #[test]
    fn test_status_takes_precedence_over_message() {
        assert_eq!(
            classify_failure(Some(404), "rate limit"),
            FailureKind::ModelUnavailable
        );
        assert_eq!(
            classify_failure(Some(503), "quota exceeded"),
            FailureKind::Throttled
        );
    }

    #[test]
    fn test_upstream_failure_display_round_trips_through_classifier() {
        let failure = UpstreamFailure::status(429, "slow down");
        assert_eq!(failure.kind(), FailureKind::Throttled);
        assert_eq!(
            classify_failure(None, &failure.to_string()),
            FailureKind::Throttled
        );

        let failure = UpstreamFailure::status(404, "no such model");
        assert_eq!(
            classify_failure(None, &failure.to_string()),
            FailureKind::ModelUnavailable
        );

        assert_eq!(UpstreamFailure::Timeout(30).kind(), FailureKind::Timeout);
    }

    #[test]
    fn test_abandons_credential() {
        assert!(FailureKind::Unauthorized.abandons_credential());
        assert!(FailureKind::Throttled.abandons_credential());
        assert!(!FailureKind::ModelUnavailable.abandons_credential());
        assert!(!FailureKind::Timeout.abandons_credential());
        assert!(!FailureKind::Unknown.abandons_credential());
    }
}
