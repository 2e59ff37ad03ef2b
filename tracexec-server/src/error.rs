//! Error types for the emulator API layer.

use std::error::Error;

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracexec_types::ParamError;

/// Error type for API operations.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The workload parameters are missing or malformed.
    ///
    /// The call is rejected before any timing phase starts.
    #[error("bad request: {0}")]
    BadRequest(#[from] ParamError),

    /// Server errors, indicating that something went wrong while executing a workload.
    #[error("server error: {0}")]
    Server(#[source] Box<dyn Error + Send + Sync>),
}

/// Result type for API operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// A JSON error response returned by the API.
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiErrorResponse {
    /// The main error message.
    #[serde(default)]
    pub detail: Option<String>,
    /// Chain of error causes.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub causes: Vec<String>,
}

impl ApiErrorResponse {
    /// Creates an error response from an error, extracting the full cause chain.
    pub fn from_error<E: Error + ?Sized>(error: &E) -> Self {
        let detail = Some(error.to_string());

        let mut causes = Vec::new();
        let mut source = error.source();
        while let Some(s) = source {
            causes.push(s.to_string());
            source = s.source();
        }

        Self { detail, causes }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(err) => {
                tracing::debug!("bad request: {err}");
                StatusCode::BAD_REQUEST
            }
            ApiError::Server(_) => {
                tracing::error!(error = &self as &dyn Error, "error handling request");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = ApiErrorResponse::from_error(&self);
        (status, Json(body)).into_response()
    }
}
