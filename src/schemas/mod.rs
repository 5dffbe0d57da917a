//! Schema module
//!
//! Request/response bodies for the public API and the upstream provider.

pub mod generate;
pub mod huggingface;

pub use generate::{
    AddKeyRequest, AddKeyResponse, GenerateMetadata, GenerateRequest, GenerateResponse,
    GenerationParams, KeyPoolSummary, KeyResetResponse, KeyStatusResponse,
};
