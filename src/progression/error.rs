use axum::{response::IntoResponse, Json};

#[derive(Debug, thiserror::Error)]
pub enum ProgressionError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),
    #[error("Precondition not met: {0}")]
    PreconditionNotMet(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ProgressionError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;
        let (status, message) = match &self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::InvalidSubmission(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::PreconditionNotMet(msg) => (StatusCode::PRECONDITION_FAILED, msg.clone()),
            Self::UpstreamUnavailable(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };
        (
            status,
            Json(serde_json::json!({ "success": false, "error": message })),
        )
            .into_response()
    }
}
