use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crewgate_core::error::{DownloadError, InferenceError};
use serde_json::json;

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(resource: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("{} not found", resource))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.status.as_u16(),
                "message": self.message,
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<InferenceError> for ApiError {
    fn from(err: InferenceError) -> Self {
        let status = match &err {
            InferenceError::Connectivity(_) => StatusCode::SERVICE_UNAVAILABLE,
            InferenceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            InferenceError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            InferenceError::Malformed(_) => StatusCode::BAD_GATEWAY,
            InferenceError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(status = status.as_u16(), error = %err, "Inference request failed");
        Self::new(status, err.to_string())
    }
}

impl From<DownloadError> for ApiError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::InvalidFilename(_)
            | DownloadError::UnknownBackend(_)
            | DownloadError::OutsideProject => {
                tracing::warn!(error = %err, "Rejected report download");
                Self::bad_request(err.to_string())
            }
            DownloadError::NotFound(name) => Self::not_found(&format!("Report '{}'", name)),
            DownloadError::Io { .. } => {
                tracing::error!(error = %err, "Report download failed");
                Self::internal(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inference_error_status_mapping() {
        let cases = [
            (InferenceError::Connectivity("refused".into()), 503),
            (InferenceError::Timeout("slow".into()), 504),
            (
                InferenceError::Upstream {
                    status: 404,
                    body: "model not found".into(),
                },
                404,
            ),
            (
                InferenceError::Upstream {
                    status: 302,
                    body: String::new(),
                },
                502,
            ),
            (InferenceError::Malformed("eof".into()), 502),
            (InferenceError::Other("?".into()), 500),
        ];
        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status.as_u16(), expected);
        }
    }

    #[test]
    fn test_download_error_status_mapping() {
        assert_eq!(
            ApiError::from(DownloadError::InvalidFilename("..".into())).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DownloadError::OutsideProject).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(DownloadError::NotFound("x.md".into())).status,
            StatusCode::NOT_FOUND
        );
    }
}
