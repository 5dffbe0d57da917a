//! Text generation endpoint
//!
//! `POST /api/generate` validates the form input, builds the prompt and
//! hands it to the orchestrator. Upstream failures are mapped to the public
//! error envelope by `ApiError::from_generation`.

use axum::{extract::State, Json};
use chrono::Utc;

use crate::error::ApiError;
use crate::schemas::generate::{
    count_words, first_validation_message, GenerateMetadata, GenerateRequest, GenerateResponse,
    KeyPoolSummary,
};
use crate::server::state::AppState;

/// POST /api/generate
pub async fn generate(
    State(state): State<AppState>,
    payload: Result<Json<GenerateRequest>, axum::extract::rejection::JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload.map_err(|rejection| {
        state.metrics.observe_generation("invalid");
        ApiError::from(rejection)
    })?;

    let params = request.into_params().map_err(|errors| {
        state.metrics.observe_generation("invalid");
        ApiError::Validation(first_validation_message(&errors))
    })?;

    let before = state.key_manager.statistics();
    tracing::info!(
        content_type = %params.content_type,
        tone = %params.tone,
        word_count = params.word_count,
        requested_model = ?params.model,
        keys_available = before.available_count,
        keys_total = before.total_count,
        "Generating content"
    );

    let prompt = params.prompt();
    let outcome = state
        .orchestrator
        .generate(&prompt, params.model.as_deref(), Some(params.max_tokens()))
        .await;

    let stats = state.key_manager.statistics();
    state.metrics.update_key_gauges(&stats);

    let generation = match outcome {
        Ok(generation) => generation,
        Err(err) => {
            let api_error = ApiError::from_generation(err, &stats);
            state.metrics.observe_generation(api_error.error_type());
            return Err(api_error);
        }
    };

    state.metrics.observe_generation("success");

    Ok(Json(GenerateResponse {
        success: true,
        metadata: GenerateMetadata {
            content_type: params.content_type,
            tone: params.tone,
            word_count: params.word_count,
            generated_words: count_words(&generation.text),
            model: generation.model,
            attempts: generation.attempts,
            timestamp: Utc::now(),
            api_keys: KeyPoolSummary::from(&stats),
        },
        result: generation.text,
    }))
}
