// Error types for event ingestion
//
// Client-side rejections (encoding, decode, validation) are recovered by the
// handler and turned into 400 responses. Store failures are not: they bubble
// up to the hosting runtime untouched.

use thiserror::Error;

/// Result type alias for store operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors raised by a durable store write
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Store could not be reached (connection refused, pool closed, ...)
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Store rejected the write because of capacity or rate limits
    #[error("store throttled: {0}")]
    Throttled(String),

    /// Any other database-level failure
    #[error("database error: {0}")]
    Database(String),

    /// Record could not be encoded for the store
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        StoreError::Unavailable(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        StoreError::Database(msg.into())
    }
}

/// Why an invocation did not produce a stored event
#[derive(Debug, Error)]
pub enum IngestError {
    /// Binary (base64) bodies are not accepted
    #[error("base64 encoded payloads are not supported")]
    UnsupportedEncoding,

    /// Body is not valid JSON
    #[error("invalid JSON payload")]
    MalformedPayload {
        /// First characters of the raw body, for the log line only
        preview: String,
    },

    /// Parsed payload lacks a truthy required field
    #[error("missing required field: {field}")]
    MissingField {
        field: &'static str,
        /// Keys present in the payload; values are never captured
        present_keys: Vec<String>,
    },

    /// Durable store write failed
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IngestError {
    /// HTTP status for rejections. Store failures have no status of their own;
    /// they are surfaced by the runtime as an unhandled error.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            IngestError::UnsupportedEncoding
            | IngestError::MalformedPayload { .. }
            | IngestError::MissingField { .. } => Some(400),
            IngestError::Store(_) => None,
        }
    }

    /// Message returned to the client in the response body
    pub fn client_message(&self) -> String {
        self.to_string()
    }

    pub fn is_rejection(&self) -> bool {
        self.status_code().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_messages() {
        assert_eq!(
            IngestError::UnsupportedEncoding.client_message(),
            "base64 encoded payloads are not supported"
        );
        assert_eq!(
            IngestError::MalformedPayload {
                preview: "not json".to_string()
            }
            .client_message(),
            "invalid JSON payload"
        );
        assert_eq!(
            IngestError::MissingField {
                field: "type",
                present_keys: vec!["email".to_string()]
            }
            .client_message(),
            "missing required field: type"
        );
    }

    #[test]
    fn test_rejections_are_client_errors() {
        assert_eq!(IngestError::UnsupportedEncoding.status_code(), Some(400));
        assert!(IngestError::UnsupportedEncoding.is_rejection());
    }

    #[test]
    fn test_store_error_has_no_status() {
        let err = IngestError::from(StoreError::unavailable("connection refused"));
        assert_eq!(err.status_code(), None);
        assert!(!err.is_rejection());
        assert_eq!(err.to_string(), "store unavailable: connection refused");
    }
}
