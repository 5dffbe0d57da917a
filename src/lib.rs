//! Text-generation proxy library
//!
//! Forwards generation requests to Hugging Face, rotating across a pool of
//! API keys and falling back across models when keys or models fail.

// Public modules
pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod middleware;
pub mod schemas;
pub mod server;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Settings;
pub use error::ApiError;
pub use server::{App, AppState};
pub use services::{GenerationOrchestrator, KeyManager};
