//! HTTP error handling for the ingestion API.
//!
//! Core errors become JSON bodies of the form
//! `{"code": "E002", "message": "...", "details": "..."}` with the HTTP status
//! derived from the error code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// API error response body.
#[derive(Debug, Clone, Serialize)]
pub struct ApiError {
    /// Error code (e.g., "E004" for a late chunk)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable error message
    pub message: String,
    /// Additional details about the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(skip)]
    status: Option<StatusCode>,
}

impl ApiError {
    /// Create a new API error with a message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            details: None,
            status: None,
        }
    }

    /// Create a new API error with code and message.
    #[must_use]
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::new(message)
        }
    }

    /// Add details to the error.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Override the status derived from the code.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    /// Get the HTTP status code for this error.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        if let Some(status) = self.status {
            return status;
        }
        match self.code.as_deref() {
            Some("E001") => StatusCode::BAD_REQUEST,
            Some("E002" | "E003" | "E004" | "E010") => StatusCode::CONFLICT,
            Some("E006" | "E007") => StatusCode::SERVICE_UNAVAILABLE,
            Some("E008" | "E009") => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create a bad request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code("E001", message)
    }

    /// Create an internal server error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let api = Self {
            code: err.code().map(String::from),
            message: err.to_string(),
            details: None,
            status: None,
        };
        match &err {
            Error::SinkWriteFailed { .. } => {
                api.with_details("chunks are kept; retry assembly to finish the transfer")
            }
            Error::Rejected { .. } | Error::RequestFailed(_) => {
                api.with_status(StatusCode::BAD_GATEWAY)
            }
            _ => api,
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        Self::new(format!("I/O error: {err}"))
    }
}

/// Result type for web handlers.
pub type ApiResult<T> = Result<T, ApiError>;

/// Extension trait for converting Results to ApiResults.
pub trait IntoApiResult<T> {
    /// Convert to an API result.
    #[allow(clippy::missing_errors_doc)]
    fn into_api_result(self) -> ApiResult<T>;
}

impl<T> IntoApiResult<T> for crate::error::Result<T> {
    fn into_api_result(self) -> ApiResult<T> {
        self.map_err(ApiError::from)
    }
}
