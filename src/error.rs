//! Service error types with HTTP status code mapping.
//!
//! [`PubSubError`] is the central error type for the service. Each variant
//! maps to a specific HTTP status code and structured JSON error response.
//!
//! Connection-level failures (slow consumers, dead connections, client
//! disconnects) have no variant here. They close the affected channel and
//! never reach publishers.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

/// Body of every non-2xx JSON response.
///
/// ```json
/// {
///   "error": {
///     "code": 1004,
///     "message": "payload too large: 90000 bytes exceeds limit of 65536 bytes",
///     "details": "limit_bytes=65536"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// The error itself.
    pub error: ErrorBody,
}

/// Code, message and optional machine-readable hint.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see code ranges on [`PubSubError`]).
    pub code: u32,
    /// What went wrong.
    pub message: String,
    /// `key=value` hint for clients, omitted when there is none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Server-side error enum with HTTP status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category        | HTTP Status                    |
/// |-----------|-----------------|--------------------------------|
/// | 1000–1999 | Validation      | 400 Bad Request / 413          |
/// | 2000–2999 | Not Found       | 404 Not Found                  |
/// | 3000–3999 | Server          | 500 / 503                      |
#[derive(Debug, thiserror::Error)]
pub enum PubSubError {
    /// Topic name is empty, too long, or contains forbidden characters.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Payload could not be encoded into an event envelope.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Encoded envelope exceeds the configured size limit.
    #[error("payload too large: {size} bytes exceeds limit of {limit} bytes")]
    PayloadTooLarge {
        /// Encoded size in bytes.
        size: usize,
        /// Configured maximum in bytes.
        limit: usize,
    },

    /// Stream or admin request failed validation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// No open channel with the given id.
    #[error("channel not found: {0}")]
    ChannelNotFound(uuid::Uuid),

    /// Every retained topic has subscribers, so no log is free for a new one.
    #[error("topic limit reached: {limit} topics are in use")]
    TopicLimitReached {
        /// Configured maximum number of topics.
        limit: usize,
    },

    /// The service is shutting down and accepts no new streams or events.
    #[error("service is shutting down")]
    ShuttingDown,

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PubSubError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::InvalidTopic(_) => 1001,
            Self::InvalidPayload(_) => 1002,
            Self::InvalidRequest(_) => 1003,
            Self::PayloadTooLarge { .. } => 1004,
            Self::ChannelNotFound(_) => 2001,
            Self::Internal(_) => 3000,
            Self::ShuttingDown => 3001,
            Self::TopicLimitReached { .. } => 3002,
        }
    }

    /// Machine-readable hint attached to the response body, if any.
    #[must_use]
    pub fn details(&self) -> Option<String> {
        match self {
            Self::PayloadTooLarge { limit, .. } => Some(format!("limit_bytes={limit}")),
            Self::ChannelNotFound(id) => Some(format!("channel_id={id}")),
            Self::TopicLimitReached { limit } => Some(format!("limit_topics={limit}")),
            _ => None,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidTopic(_) | Self::InvalidPayload(_) | Self::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            Self::ShuttingDown | Self::TopicLimitReached { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for PubSubError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: self.details(),
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

/// Startup configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set but could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue {
        /// Environment variable name.
        key: &'static str,
        /// Raw value found in the environment.
        value: String,
    },

    /// A numeric setting must be strictly positive.
    #[error("{0} must be greater than zero")]
    MustBePositive(&'static str),
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = PubSubError::InvalidTopic("empty".to_string());
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.error_code(), 1001);
    }

    #[test]
    fn shutting_down_maps_to_unavailable() {
        let err = PubSubError::ShuttingDown;
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn topic_limit_maps_to_unavailable_with_limit_hint() {
        let err = PubSubError::TopicLimitReached { limit: 10 };
        assert_eq!(err.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.error_code(), 3002);
        assert_eq!(err.details().as_deref(), Some("limit_topics=10"));
    }

    #[test]
    fn payload_too_large_message_mentions_limit() {
        let err = PubSubError::PayloadTooLarge {
            size: 2048,
            limit: 1024,
        };
        assert_eq!(err.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(err.to_string().contains("1024"));
        assert_eq!(err.details().as_deref(), Some("limit_bytes=1024"));
    }

    #[test]
    fn into_response_sets_status() {
        let response = PubSubError::ChannelNotFound(uuid::Uuid::new_v4()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
