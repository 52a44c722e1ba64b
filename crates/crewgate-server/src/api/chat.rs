use crate::api::ApiError;
use axum::{
    Json, Router,
    extract::Extension,
    routing::post,
};
use crewgate_core::AppCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub fn router() -> Router {
    Router::new().route("/", post(chat))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
    model: String,
}

/// POST /api/chat - forward a message to the inference server's generate endpoint
async fn chat(
    Extension(core): Extension<Arc<AppCore>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let model = req
        .model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| core.config.research.default_model.clone());

    tracing::debug!(model = %model, stream = req.stream, "Chat request");
    let response = core
        .inference
        .generate(&model, &req.message, req.stream)
        .await?;

    Ok(Json(ChatResponse { response, model }))
}
