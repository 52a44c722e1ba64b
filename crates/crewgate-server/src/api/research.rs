use crate::api::ApiError;
use axum::{
    Json, Router,
    extract::{Extension, Path},
    http::header,
    response::IntoResponse,
    routing::{get, post},
};
use crewgate_core::{
    AppCore, Backend,
    error::DownloadError,
    report,
    research::{ResearchRequest, ResearchResponse},
};
use std::sync::Arc;

pub fn router() -> Router {
    Router::new()
        .route("/", post(run_research))
        .route("/report/{backend}/{filename}", get(download_report))
}

/// POST /api/research - run the orchestration tool; failures are reported in the body
async fn run_research(
    Extension(core): Extension<Arc<AppCore>>,
    Json(req): Json<ResearchRequest>,
) -> Json<ResearchResponse> {
    Json(core.research.run(req).await)
}

/// GET /api/research/report/{backend}/{filename} - download an extracted report
async fn download_report(
    Extension(core): Extension<Arc<AppCore>>,
    Path((backend, filename)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    report::validate_report_filename(&filename)?;

    let backend = backend
        .parse::<Backend>()
        .map_err(|_| DownloadError::UnknownBackend(backend.clone()))?;
    let project_dir = core
        .registry
        .project_dir(backend)
        .ok_or_else(|| DownloadError::UnknownBackend(backend.to_string()))?;

    let bytes = report::read_report(project_dir, &filename)?;
    tracing::info!(backend = %backend, filename = %filename, bytes = bytes.len(), "Report downloaded");

    Ok((
        [
            (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        bytes,
    ))
}
