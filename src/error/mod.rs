//! Flow Engine Error Types
//!
//! Error hierarchy for the flow walkthrough engine, plus mapping helpers
//! for OAuth2 error responses.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Root error type for flow engine operations.
#[derive(Error, Debug)]
pub enum FlowError {
    /// A precondition failed before any network call was made.
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("correlation error: {0}")]
    Correlation(#[from] CorrelationError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("network error: {0}")]
    Network(#[from] NetworkError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl FlowError {
    /// Single-message validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    /// Check if the error is a transient transport failure that a polling
    /// loop may absorb and continue past.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Check if the error means the current grant attempt is dead and the
    /// caller must restart from an earlier step.
    pub fn is_fatal_to_attempt(&self) -> bool {
        matches!(
            self,
            Self::Correlation(_) | Self::Protocol(_) | Self::Timeout(_)
        )
    }
}

/// State or nonce correlation failure. Always fatal to the current attempt;
/// the extracted data must be discarded, never applied.
#[derive(Error, Debug)]
pub enum CorrelationError {
    #[error("state mismatch (possible CSRF): expected {expected}, received {received}")]
    StateMismatch { expected: String, received: String },

    #[error("state parameter missing from callback")]
    StateMissing,

    #[error("nonce claim mismatch in ID token (possible replay)")]
    NonceMismatch,
}

/// The authorization server returned a defined OAuth error, or a response
/// the engine could not interpret.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Server error surfaced verbatim.
    #[error("{error}: {}", .error_description.as_deref().unwrap_or("no description"))]
    OAuth {
        error: String,
        error_description: Option<String>,
    },

    #[error("unexpected HTTP status {status}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("invalid JSON in response: {message}")]
    InvalidJson { message: String },

    #[error("malformed redirect: {message}")]
    MalformedRedirect { message: String },
}

/// Device polling ran out of budget, distinguished from [`ProtocolError`]
/// so the caller can offer "request a new code" remediation.
#[derive(Error, Debug)]
pub enum TimeoutError {
    #[error("device polling exhausted its {attempts}-attempt budget")]
    AttemptBudget { attempts: u32 },

    #[error("device code expired at {expired_at}")]
    DeviceCodeExpired { expired_at: DateTime<Utc> },
}

/// Network/transport failure.
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Key-value store failure.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("read failed: {message}")]
    ReadFailed { message: String },

    #[error("write failed: {message}")]
    WriteFailed { message: String },

    #[error("corrupted data for key {key}: {message}")]
    CorruptedData { key: String, message: String },
}

/// Configuration problem detected before reaching the network.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("missing required field: {field}")]
    MissingRequired { field: String },

    #[error("PKCE is enabled but no verifier/challenge pair has been generated")]
    PkceRequired,

    #[error("invalid endpoint URL: {url}")]
    InvalidEndpoint { url: String },

    #[error("flow {flow} does not use an authorization redirect")]
    NotRedirectBased { flow: String },

    #[error("discovery failed: {message}")]
    DiscoveryFailed { message: String },
}

/// Result type for flow engine operations.
pub type FlowResult<T> = Result<T, FlowError>;

/// OAuth2 error response body from the authorization server.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    /// Some servers attach a replacement polling interval to `slow_down`.
    #[serde(default)]
    pub interval: Option<u64>,
}

/// Standard error codes the device poller treats as non-terminal.
pub const ERROR_AUTHORIZATION_PENDING: &str = "authorization_pending";
pub const ERROR_SLOW_DOWN: &str = "slow_down";

/// Standard error codes that require requesting a new device code.
pub const ERROR_EXPIRED_TOKEN: &str = "expired_token";
pub const ERROR_INVALID_GRANT: &str = "invalid_grant";

/// Parse an OAuth error response from an HTTP body.
pub fn parse_oauth_error(body: &str) -> Option<OAuthErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Create an error from a non-200 HTTP response, surfacing the server's
/// `error`/`error_description` verbatim when the body carries them.
pub fn error_from_response(status: u16, body: &str) -> FlowError {
    if let Some(response) = parse_oauth_error(body) {
        return FlowError::Protocol(ProtocolError::OAuth {
            error: response.error,
            error_description: response.error_description,
        });
    }

    FlowError::Protocol(ProtocolError::UnexpectedStatus {
        status,
        body: body.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oauth_error() {
        let body = r#"{"error":"invalid_grant","error_description":"The code is expired"}"#;
        let response = parse_oauth_error(body).unwrap();
        assert_eq!(response.error, "invalid_grant");
        assert_eq!(
            response.error_description,
            Some("The code is expired".to_string())
        );
    }

    #[test]
    fn test_error_from_response_surfaces_server_error_verbatim() {
        let body = r#"{"error":"access_denied","error_description":"User said no"}"#;
        match error_from_response(400, body) {
            FlowError::Protocol(ProtocolError::OAuth {
                error,
                error_description,
            }) => {
                assert_eq!(error, "access_denied");
                assert_eq!(error_description, Some("User said no".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_response_unparseable_body() {
        match error_from_response(502, "<html>bad gateway</html>") {
            FlowError::Protocol(ProtocolError::UnexpectedStatus { status, .. }) => {
                assert_eq!(status, 502);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_transient_classification() {
        let err = FlowError::Network(NetworkError::ConnectionFailed {
            message: "refused".to_string(),
        });
        assert!(err.is_transient());
        assert!(!err.is_fatal_to_attempt());

        let err = FlowError::Timeout(TimeoutError::AttemptBudget { attempts: 120 });
        assert!(!err.is_transient());
        assert!(err.is_fatal_to_attempt());
    }

    #[test]
    fn test_validation_message_join() {
        let err = FlowError::Validation(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(err.to_string(), "validation failed: a; b");
    }
}
