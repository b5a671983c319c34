//! Error types and handling for the inference relay.
//!
//! [`RelayError`] is the failure side of a relay call and knows which HTTP
//! status it maps to. [`AppError`] wraps it together with the errors raised
//! while decoding inbound requests and implements the HTTP response
//! conversion: every failure becomes `{"error": ..., "details": ...}`.

use crate::services::provider::Operation;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

/// Failure of a single relay call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// A required inbound field is missing or blank. No provider was called.
    #[error("missing field: {0}")]
    Validation(&'static str),

    /// Every provider for the operation lacks an API key.
    #[error("no provider configured for {0}")]
    NotConfigured(Operation),

    /// The provider's payload shape cannot carry this request.
    #[error("{provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: Operation,
    },

    /// The provider answered with a non-2xx status.
    #[error("{provider} request failed ({status})")]
    Upstream {
        provider: String,
        status: u16,
        body: String,
    },

    /// Connection failure, timeout or body read error.
    #[error("{provider} request failed: {message}")]
    Transport { provider: String, message: String },

    /// The provider answered 2xx but no extraction strategy matched.
    #[error("no valid field in response")]
    NoValidField { provider: String, body: String },

    /// Every provider in a fallback chain failed.
    #[error("all providers failed")]
    Exhausted { attempts: Vec<RelayError> },
}

impl RelayError {
    /// HTTP status returned to the caller.
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::Validation(_) => StatusCode::BAD_REQUEST,
            RelayError::NotConfigured(_) | RelayError::Unsupported { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // Upstream client and server errors pass through; anything else
            // that is still not a success is reported as a bad gateway.
            RelayError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::BAD_GATEWAY),
            RelayError::Transport { .. }
            | RelayError::NoValidField { .. }
            | RelayError::Exhausted { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// Diagnostic payload attached to the error response.
    pub fn details(&self) -> Option<Value> {
        match self {
            RelayError::Upstream { body, .. } | RelayError::NoValidField { body, .. } => {
                Some(Value::String(body.clone()))
            }
            RelayError::Exhausted { attempts } => Some(Value::Array(
                attempts
                    .iter()
                    .map(|attempt| {
                        let mut entry = json!({
                            "provider": attempt.provider(),
                            "status": attempt.status().as_u16(),
                            "error": attempt.to_string(),
                        });
                        if let Some(details) = attempt.details() {
                            entry["details"] = details;
                        }
                        entry
                    })
                    .collect(),
            )),
            _ => None,
        }
    }

    /// Name of the provider that produced this failure, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            RelayError::Unsupported { provider, .. }
            | RelayError::Upstream { provider, .. }
            | RelayError::Transport { provider, .. }
            | RelayError::NoValidField { provider, .. } => Some(provider),
            _ => None,
        }
    }

    /// Metric label for a failed provider attempt.
    pub fn outcome(&self) -> &'static str {
        match self {
            RelayError::Upstream { .. } => "upstream_error",
            RelayError::Transport { .. } => "transport_error",
            RelayError::NoValidField { .. } => "no_valid_field",
            RelayError::Unsupported { .. } => "unsupported",
            RelayError::Validation(_) => "validation_error",
            RelayError::NotConfigured(_) => "not_configured",
            RelayError::Exhausted { .. } => "exhausted",
        }
    }
}

/// Main error type for the HTTP layer.
#[derive(Error, Debug)]
pub enum AppError {
    /// A relay call failed
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// The inbound body could not be decoded
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Generic internal server errors with custom message
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, details) = match self {
            AppError::Relay(err) => {
                let status = err.status();
                if status.is_server_error() {
                    tracing::warn!(status = status.as_u16(), error = %err, "Relay failed");
                } else {
                    tracing::debug!(status = status.as_u16(), error = %err, "Relay rejected request");
                }
                (status, err.to_string(), err.details())
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg, None)
            }
        };

        let body = match details {
            Some(details) => json!({ "error": error_message, "details": details }),
            None => json!({ "error": error_message }),
        };

        (status, Json(body)).into_response()
    }
}

/// Convenience type alias for Results using [`AppError`].
pub type Result<T> = std::result::Result<T, AppError>;
