use foam_core::CoreError;
use foam_model::RunId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Core(#[from] CoreError),
}

impl ApiError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::InvalidRequest(_) => 400,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Internal(_) => 500,
            ApiError::Core(e) => match e {
                CoreError::InvalidSpec(_) | CoreError::Config(_) => 400,
                CoreError::UnknownRun(_) => 404,
                CoreError::AlreadyRunning(_)
                | CoreError::NotRunning(_)
                | CoreError::StillActive(_)
                | CoreError::InvalidTransition { .. } => 409,
                CoreError::Launch { .. } | CoreError::Io(_) => 500,
            },
        }
    }

    /// Run the error refers to, if any.
    pub fn run_id(&self) -> Option<&RunId> {
        match self {
            ApiError::Core(
                CoreError::AlreadyRunning(id)
                | CoreError::NotRunning(id)
                | CoreError::UnknownRun(id)
                | CoreError::StillActive(id)
                | CoreError::InvalidTransition { run_id: id, .. }
                | CoreError::Launch { run_id: id, .. },
            ) => Some(id),
            _ => None,
        }
    }
}

#[cfg(feature = "http")]
impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        use axum::{Json, http::StatusCode};

        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::warn!(target: "foam.api", error = %self, "request failed");
        } else {
            tracing::debug!(target: "foam.api", error = %self, "request rejected");
        }

        let mut body = serde_json::json!({
            "status": "error",
            "message": self.to_string(),
        });
        if let Some(run_id) = self.run_id() {
            body["run_id"] = serde_json::Value::String(run_id.to_string());
        }
        (status, Json(body)).into_response()
    }
}
