//! API error handling
//!
//! Author: hephaex@gmail.com

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use qgate_core::{DenyKind, DenyReason};
use serde::{Deserialize, Serialize};

/// API error response
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    /// Error code
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn unauthorized() -> Self {
        Self::new("UNAUTHORIZED", "Valid API key required")
    }

    pub fn forbidden() -> Self {
        Self::new("FORBIDDEN", "Access denied")
    }

    pub fn internal_error() -> Self {
        Self::new("INTERNAL_ERROR", "Internal server error")
    }
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    /// Authorization denied by the evaluator
    Denied(DenyReason),
    BadRequest(String),
    /// Request body larger than the configured limit (bytes)
    PayloadTooLarge(usize),
    /// Upstream unreachable or returned an unreadable response
    BadGateway(String),
    GatewayTimeout,
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Denied(reason) => match reason.kind() {
                DenyKind::Unauthenticated => StatusCode::UNAUTHORIZED,
                DenyKind::Forbidden => StatusCode::FORBIDDEN,
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            AppError::Denied(reason) => {
                let base = match reason.kind() {
                    DenyKind::Unauthenticated => ApiError::unauthorized(),
                    DenyKind::Forbidden => ApiError::forbidden(),
                };
                base.with_details(reason.as_str())
            }
            AppError::BadRequest(msg) => ApiError::new("BAD_REQUEST", msg),
            AppError::PayloadTooLarge(limit) => ApiError::new(
                "PAYLOAD_TOO_LARGE",
                format!("Request body exceeds {limit} bytes"),
            ),
            AppError::BadGateway(msg) => {
                ApiError::new("BAD_GATEWAY", "Upstream request failed").with_details(msg)
            }
            AppError::GatewayTimeout => {
                ApiError::new("GATEWAY_TIMEOUT", "Upstream did not respond in time")
            }
            AppError::Internal(msg) => ApiError::internal_error().with_details(msg),
        };

        (status, Json(error)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::GatewayTimeout
        } else {
            AppError::BadGateway(err.to_string())
        }
    }
}
