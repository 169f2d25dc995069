use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Failures of the mock endpoint surface, each with a fixed HTTP status.
#[derive(Debug, Error)]
pub enum MockError {
    #[error("Method not allowed")]
    MethodNotAllowed,
    #[error("Missing API key")]
    MissingCredential,
    #[error("Invalid API key")]
    InvalidCredential,
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Validation(String),
    /// Stored route or dataset content could not be rendered; the message is safe to expose.
    #[error("{0}")]
    Render(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl MockError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::MissingCredential | Self::InvalidCredential => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Render(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for MockError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            StoreError::Validation(msg) => Self::Validation(msg),
            StoreError::Internal(e) => Self::Internal(e),
        }
    }
}

impl IntoResponse for MockError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                tracing::error!(error = %e, "mock request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, axum::Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_keep_their_class() {
        assert_eq!(
            MockError::from(StoreError::Conflict("dup".to_string())).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            MockError::from(StoreError::Validation("bad".to_string())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            MockError::from(StoreError::Internal(anyhow::anyhow!("db down"))).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let resp = MockError::Internal(anyhow::anyhow!("secret detail")).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
