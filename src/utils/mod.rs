//! Utility modules
//!
//! Per-attempt timeouts and string helpers.

pub mod string;
pub mod timeout;

pub use string::{body_preview, truncate_str};
pub use timeout::{with_timeout, TimeoutConfig, TimeoutError};
