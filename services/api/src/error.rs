use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use punchout_core::TrainingError;
use serde_json::json;

/// Errors returned from HTTP handlers, rendered as `{"detail": "..."}`.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub TrainingError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            TrainingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            TrainingError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        tracing::debug!(%status, error = %self, "request rejected");
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
