use crate::{api, static_assets};
use axum::{Extension, Router, routing::get};
use crewgate_core::AppCore;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub fn build_router(core: Arc<AppCore>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api::router())
        .fallback(static_assets::static_handler)
        .layer(cors)
        .layer(Extension(core))
}

async fn health_check() -> &'static str {
    "OK"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode, header};
    use crewgate_core::config::{InferenceSettings, ResearchSettings};
    use crewgate_core::{Backend, BackendDescriptor, CrewgateConfig};
    use serde_json::{Value, json};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;
    use tower::ServiceExt;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_app(root: &Path, inference_url: &str, command: &str) -> Router {
        let local = root.join("local");
        let cloud = root.join("cloud");
        fs::create_dir_all(&local).unwrap();
        fs::create_dir_all(&cloud).unwrap();

        let config = CrewgateConfig {
            inference: InferenceSettings {
                url: inference_url.to_string(),
                ..Default::default()
            },
            research: ResearchSettings {
                command: command.to_string(),
                ..Default::default()
            },
            backends: vec![
                BackendDescriptor::new(Backend::LocalInference, local),
                BackendDescriptor::new(Backend::CloudGenerative, cloud),
            ],
            ..Default::default()
        };
        build_router(Arc::new(AppCore::new(config).unwrap()))
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_health_and_landing_page() {
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), "http://127.0.0.1:9", "crewai run");

        let (status, body) = send(app.clone(), get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");

        let response = app.oneshot(get("/")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }

    #[tokio::test]
    async fn test_chat_returns_generated_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"response": "Hello there"})),
            )
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), &server.uri(), "crewai run");

        let (status, body) = send(
            app,
            post_json("/api/chat", json!({"message": "hi", "model": "llama3"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["response"], "Hello there");
        assert_eq!(body["model"], "llama3");
    }

    #[tokio::test]
    async fn test_chat_mirrors_upstream_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model crashed"))
            .mount(&server)
            .await;
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), &server.uri(), "crewai run");

        let (status, body) = send(app, post_json("/api/chat", json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["error"]["code"], 500);
    }

    #[tokio::test]
    async fn test_chat_unreachable_server_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), "http://127.0.0.1:9", "crewai run");

        let (status, _) = send(app, post_json("/api/chat", json!({"message": "hi"}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_models_fall_back_to_cloud_catalog() {
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), "http://127.0.0.1:9", "crewai run");

        let (status, body) = send(app, get("/api/models")).await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 3);
        assert!(models.iter().all(|m| m["backend"] == "cloud-generative"));
    }

    #[tokio::test]
    async fn test_research_unknown_backend_reports_in_body() {
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), "http://127.0.0.1:9", "crewai run");

        let (status, body) = send(
            app,
            post_json(
                "/api/research",
                json!({"topic": "rust", "model": "m", "backend": "mainframe"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("mainframe"));
        assert!(body.get("report_content").is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_research_then_download_report() {
        let dir = TempDir::new().unwrap();
        let app = test_app(
            dir.path(),
            "http://127.0.0.1:9",
            r##"/bin/sh -c 'printf "# Findings on $TOPIC\n" > report.md; echo done'"##,
        );

        let (status, body) = send(
            app.clone(),
            post_json(
                "/api/research",
                json!({"topic": "Rust Async", "model": "phi3", "backend": "local-inference"}),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["model_label"], "local-inference/phi3");
        assert_eq!(body["report_content"], "# Findings on Rust Async\n");
        let filename = body["report_filename"].as_str().unwrap().to_string();
        assert!(filename.starts_with("research_rust_async_"));

        let env = fs::read_to_string(dir.path().join("local/.env")).unwrap();
        assert_eq!(env, "MODEL=local-inference/phi3\n");

        let response = app
            .oneshot(get(&format!("/api/research/report/local-inference/{filename}")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let disposition = response.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&filename));
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"# Findings on Rust Async\n");
    }

    #[tokio::test]
    async fn test_download_rejects_traversal_and_missing_files() {
        let dir = TempDir::new().unwrap();
        let app = test_app(dir.path(), "http://127.0.0.1:9", "crewai run");

        let (status, _) = send(
            app.clone(),
            get("/api/research/report/local-inference/..%2F..%2Fetc%2Fpasswd"),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(app.clone(), get("/api/research/report/mainframe/report.md")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            app,
            get("/api/research/report/cloud-generative/research_missing.md"),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
