//! HTTP error response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use convoflow_domain::error::{ConvoFlowError, ValidationError};

/// JSON error body returned by API endpoints.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Maps [`ConvoFlowError`] to an HTTP response with appropriate status code.
#[derive(Debug)]
pub struct ApiError(ConvoFlowError);

impl ApiError {
    /// A path segment that is not a valid id.
    pub(crate) fn invalid_id(raw: &str) -> Self {
        Self(ValidationError::InvalidId(raw.to_string()).into())
    }
}

impl From<ConvoFlowError> for ApiError {
    fn from(err: ConvoFlowError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ConvoFlowError::Validation(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            ConvoFlowError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            ConvoFlowError::Configuration(err) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            ConvoFlowError::JobState(err) => (StatusCode::CONFLICT, err.to_string()),
            ConvoFlowError::Execution(err) => {
                tracing::warn!(error = %err, "automation walk failed");
                (StatusCode::BAD_GATEWAY, err.to_string())
            }
            ConvoFlowError::Delivery(err) => (StatusCode::BAD_GATEWAY, err.to_string()),
            ConvoFlowError::Storage(err) => {
                tracing::error!(error = %err, "storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
