//! API endpoint handlers module
//!
//! Contains all HTTP endpoint handler implementations.

pub mod generate;
pub mod health;
pub mod keys;
pub mod metrics;
