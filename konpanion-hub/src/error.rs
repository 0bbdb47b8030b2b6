use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Erreurs exposées par l'API HTTP du hub
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    #[error("{0}")]
    NotFound(String),
    #[error("Not logged in")]
    Unauthorized,
    #[error("Invalid ingest token.")]
    InvalidToken,
    #[error("Forbidden")]
    Forbidden,
    #[error("{0}")]
    InvalidTelemetry(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    pub fn status(&self) -> StatusCode {
        match self {
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::Unauthorized | HubError::InvalidToken => StatusCode::UNAUTHORIZED,
            HubError::Forbidden => StatusCode::FORBIDDEN,
            HubError::InvalidTelemetry(_) => StatusCode::UNPROCESSABLE_ENTITY,
            HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, Json(serde_json::json!({ "detail": self.to_string() }))).into_response()
    }
}
