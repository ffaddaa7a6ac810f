//! Client error types.
//!
//! Every failure surfaces as a single `LmStudioError`. Structured logging is
//! done at the call site; these variants carry the context needed to build a
//! meaningful log entry.

use thiserror::Error;

/// Errors that can occur while talking to the LM Studio server.
#[derive(Debug, Error)]
pub enum LmStudioError {
    /// TCP/HTTP transport failure (connect, timeout, body read).
    #[error("LM Studio {context} error: {reason}")]
    Request { context: String, reason: String },

    /// Non-2xx HTTP response from the server.
    #[error("LM Studio {context} error: HTTP {status}: {body}")]
    Http {
        context: String,
        status: u16,
        body: String,
    },

    /// The server answered 2xx but the body had an unexpected shape.
    #[error("LM Studio {context} error: invalid response: {reason}")]
    InvalidResponse { context: String, reason: String },

    /// `stream` was called while streaming is disabled in configuration.
    #[error("Streaming is disabled in configuration")]
    StreamingDisabled,

    /// The operation is not offered by the LM Studio API.
    #[error("{message}")]
    Unsupported { message: String },

    /// Two embedding vectors (or a vector and the configured size) disagree.
    #[error("Embeddings must have the same dimensions (expected {expected}, got {actual})")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Configuration loading or validation error.
    #[error("config error: {reason}")]
    Config { reason: String },

    /// Cache store read/write failure.
    #[error("cache error: {reason}")]
    Cache { reason: String },
}

impl LmStudioError {
    /// Wrap a reqwest transport error with the operation it happened in.
    pub fn request(context: &str, err: &reqwest::Error) -> Self {
        let reason = if err.is_timeout() {
            format!("request timed out: {err}")
        } else if err.is_connect() {
            format!(
                "failed to connect to LM Studio server, make sure it is running \
                 and the local server is enabled: {err}"
            )
        } else {
            err.to_string()
        };
        LmStudioError::Request {
            context: context.to_string(),
            reason,
        }
    }

    /// HTTP status code, if this is an `Http` error.
    pub fn status(&self) -> Option<u16> {
        match self {
            LmStudioError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether this error came from the network/HTTP layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            LmStudioError::Request { .. } | LmStudioError::Http { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_error_message_carries_context() {
        let err = LmStudioError::Http {
            context: "chat".into(),
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(err.to_string(), "LM Studio chat error: HTTP 500: boom");
        assert_eq!(err.status(), Some(500));
        assert!(err.is_transport());
    }

    #[test]
    fn test_streaming_disabled_is_not_transport() {
        let err = LmStudioError::StreamingDisabled;
        assert!(!err.is_transport());
        assert!(err.status().is_none());
        assert_eq!(err.to_string(), "Streaming is disabled in configuration");
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = LmStudioError::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert!(err.to_string().contains("same dimensions"));
    }
}
