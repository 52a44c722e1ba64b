use axum::{Json, Router, extract::Extension, routing::get};
use crewgate_core::{AppCore, models::ModelList};
use std::sync::Arc;

pub fn router() -> Router {
    Router::new().route("/", get(list_models))
}

/// GET /api/models - local inference models followed by the cloud catalog
async fn list_models(Extension(core): Extension<Arc<AppCore>>) -> Json<ModelList> {
    Json(crewgate_core::models::list_models(&core.inference, &core.config.research.cloud_models).await)
}
