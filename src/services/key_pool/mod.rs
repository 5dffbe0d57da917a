//! Key Pool Module
//!
//! Tracks the upstream API keys, rotates between them and keeps each key's
//! health so that throttled or failing keys sit out a cooldown window.
//!
//! # Example
//! ```ignore
//! use key_pool::KeyManager;
//!
//! let manager = KeyManager::new(vec!["hf_key_one".into(), "hf_key_two".into()]);
//!
//! if let Some(selected) = manager.select_next() {
//!     // call the provider with selected.secret, then report back
//!     manager.record_success(selected.index);
//! }
//! ```

mod credential;
mod manager;

pub use credential::{mask_secret, CredentialSnapshot, CredentialState, SelectedCredential};
pub use manager::{KeyManager, KeyManagerConfig, KeyStatistics};
