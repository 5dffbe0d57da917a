//! Error handling module

mod types;

pub use types::{ApiError, KeyPoolStatus, RETRY_AFTER_SECS};
