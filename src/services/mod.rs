//! Services module
//!
//! Key rotation, failure classification, the upstream client and the
//! generation loop that ties them together.

pub mod failure;
pub mod key_pool;
pub mod orchestrator;
pub mod upstream;

pub use failure::{classify_failure, FailureKind, UpstreamFailure, EMPTY_RESPONSE};
pub use key_pool::{KeyManager, KeyManagerConfig, KeyStatistics, SelectedCredential};
pub use orchestrator::{AttemptFailure, Generation, GenerationError, GenerationOrchestrator};
pub use upstream::{HuggingFaceClient, HuggingFaceConfig, UpstreamClient, UpstreamRequest};
