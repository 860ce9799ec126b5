//! HTTP error responses.
//!
//! Bridges [`OrderError`] to HTTP by implementing axum's `IntoResponse`.
//! Clients only see a fixed message per error kind; the underlying error
//! is logged.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use order_info_core::OrderError;
use serde::Serialize;
use std::fmt;

/// Error returned by API handlers.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: &'static str,
    source: Option<OrderError>,
}

impl ApiError {
    /// 400 for malformed path or query parameters.
    #[must_use]
    pub const fn bad_request() -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: "Invalid request parameters",
            source: None,
        }
    }

    /// The HTTP status this error maps to.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The message shown to clients.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        self.message
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        let (status, message) = match &err {
            OrderError::NotFound(_) => (StatusCode::NOT_FOUND, "Order not found"),
            OrderError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid request parameters"),
            OrderError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Database error"),
            OrderError::Messaging(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Kafka service error"),
        };
        Self {
            status,
            message,
            source: Some(err),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.status.as_u16(), self.message)
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    message: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let cause = self
            .source
            .as_ref()
            .map_or_else(String::new, ToString::to_string);

        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %cause, "Request failed");
        } else {
            tracing::warn!(status = %self.status, error = %cause, "Client error");
        }

        let body = ErrorResponse {
            status: self.status.as_u16(),
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}
