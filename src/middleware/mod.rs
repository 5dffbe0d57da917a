//! Middleware module
//!
//! Contains HTTP middleware for admin authentication, logging, and metrics.

pub mod auth;
pub mod logging;
pub mod metrics;

pub use auth::{extract_api_key, require_admin_key, AdminAuth};
pub use logging::{log_request, TraceId, REQUEST_ID_HEADER, TRACE_ID_HEADER};
pub use metrics::Metrics;
