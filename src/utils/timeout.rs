//! Per-attempt deadlines for upstream calls
//!
//! Each upstream endpoint class has its own budget. An expired deadline
//! cancels that single attempt only; the orchestrator moves on.

use std::future::Future;
use std::time::Duration;

/// Deadlines for the upstream endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Budget for chat-router calls (default: 30s)
    pub router_timeout: Duration,

    /// Budget for legacy inference calls, which cold-start slowly (default: 45s)
    pub inference_timeout: Duration,

    /// TCP connect timeout for the HTTP client (default: 10s)
    pub connect_timeout: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            router_timeout: Duration::from_secs(30),
            inference_timeout: Duration::from_secs(45),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TimeoutConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_router_timeout(mut self, timeout: Duration) -> Self {
        self.router_timeout = timeout;
        self
    }

    pub fn with_inference_timeout(mut self, timeout: Duration) -> Self {
        self.inference_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Run `future` under a deadline.
///
/// The inner error is preserved; expiry becomes `TimeoutError::Timeout`.
pub async fn with_timeout<T, E>(
    timeout: Duration,
    future: impl Future<Output = Result<T, E>>,
) -> Result<T, TimeoutError<E>> {
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(TimeoutError::Inner(err)),
        Err(_) => Err(TimeoutError::Timeout(timeout)),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TimeoutError<E> {
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Inner(E),
}

impl<E> TimeoutError<E> {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TimeoutError::Timeout(_))
    }
}
