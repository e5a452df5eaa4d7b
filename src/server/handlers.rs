use axum::body::Bytes;
use axum::{extract::State, Json};
use serde::de::DeserializeOwned;

use crate::error::{Result, TokenError};
use crate::server::server::AppState;
use crate::service::orchestrator::{
    BatchRequest, BatchResponse, ClearRequest, ClearResponse, HealthResponse, StatsResponse,
    TokenRequest, TokenResponse,
};

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.token_service.health().await)
}

pub async fn token(State(state): State<AppState>, body: Bytes) -> Result<Json<TokenResponse>> {
    let request: TokenRequest = parse_body(&body)?;
    state.token_service.get_token(request).await.map(Json)
}

pub async fn tokens_batch(State(state): State<AppState>, body: Bytes) -> Result<Json<BatchResponse>> {
    let request: BatchRequest = parse_body(&body)?;
    state.token_service.get_tokens_batch(request).await.map(Json)
}

pub async fn cache_clear(State(state): State<AppState>, body: Bytes) -> Result<Json<ClearResponse>> {
    let request: ClearRequest = parse_body(&body)?;
    Ok(Json(state.token_service.clear_cache(request).await))
}

pub async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.token_service.stats().await)
}

/// Empty body reads as `{}`; anything else must be a JSON object of the right shape.
/// Content-Type is not checked.
fn parse_body<T: DeserializeOwned + Default>(body: &Bytes) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| TokenError::Validation(format!("invalid JSON body: {}", e)))
}
