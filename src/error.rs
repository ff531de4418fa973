//! Error types for request operations
//!
//! Construction-time failures (`Protocol`, `InvalidUri`, `Encode`, `ClientBuild`) never reach a
//! transport. `Connection` and `Status` are retried against the same budget. `Payload` aborts the
//! operation no matter how much budget is left.

/// Terminal error of one request operation.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// The URI scheme is neither `http` nor `https`.
    #[error("unknown protocol: {uri}")]
    Protocol { uri: String },

    /// The URI could not be parsed at all.
    #[error("invalid uri {uri}: {source}")]
    InvalidUri {
        uri: String,
        #[source]
        source: url::ParseError,
    },

    /// The request body could not be serialized to JSON.
    #[error("failed to encode request body: {0}")]
    Encode(#[from] serde_json::Error),

    /// The underlying HTTP client could not be configured.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    /// Establishing or maintaining the connection failed before a status arrived.
    #[error("request failed: {0}")]
    Connection(#[source] reqwest::Error),

    /// The server answered with a status code of 400 or above.
    #[error("unexpected HTTP status code: {status}")]
    Status { status: u16 },

    /// The body of a successful response could not be read to the end.
    #[error("response payload failed after {} bytes: {source}", .partial.len())]
    Payload {
        partial: String,
        #[source]
        source: reqwest::Error,
    },
}

impl RequestError {
    /// Whether another attempt may be scheduled for this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Status { .. })
    }

    /// Status code for `Status` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            _ => None,
        }
    }

    /// Body fragment received before a `Payload` error.
    pub fn partial_payload(&self) -> Option<&str> {
        match self {
            Self::Payload { partial, .. } => Some(partial),
            _ => None,
        }
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    pub fn is_payload(&self) -> bool {
        matches!(self, Self::Payload { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_names_the_code() {
        let err = RequestError::Status { status: 503 };
        assert_eq!(err.to_string(), "unexpected HTTP status code: 503");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
    }

    #[test]
    fn protocol_error_is_fatal() {
        let err = RequestError::Protocol { uri: "ftp://example.com/".into() };
        assert_eq!(err.to_string(), "unknown protocol: ftp://example.com/");
        assert!(err.is_protocol());
        assert!(!err.is_retryable());
        assert!(err.status().is_none());
        assert!(err.partial_payload().is_none());
    }

    #[test]
    fn invalid_uri_keeps_source() {
        use std::error::Error;

        let source = url::Url::parse("not a uri").unwrap_err();
        let err = RequestError::InvalidUri { uri: "not a uri".into(), source };
        assert!(!err.is_retryable());
        assert!(err.source().is_some());
    }

    #[test]
    fn encode_converts_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RequestError = json_err.into();
        assert!(matches!(err, RequestError::Encode(_)));
        assert!(!err.is_retryable());
    }
}
