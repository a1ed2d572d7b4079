//! Error reporting for the command line host.

use mediagrab_core::Error;
use serde::Serialize;
use tracing::error;

/// Structured error response for machine-readable output.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub message: String,
    /// Error category for programmatic handling.
    pub kind: mediagrab_core::ErrorKind,
    /// Whether the error can be retried.
    pub retryable: bool,
    /// Suggested retry delay in seconds, if applicable.
    pub retry_delay_secs: Option<u64>,
}

impl From<&Error> for ErrorResponse {
    fn from(e: &Error) -> Self {
        Self {
            message: e.to_string(),
            kind: e.kind(),
            retryable: e.is_retryable(),
            retry_delay_secs: e.retry_delay_secs(),
        }
    }
}

/// Log the error and render it for the terminal.
///
/// With `json` set the result is a JSON `ErrorResponse`; it falls back to the
/// plain message if serialization fails.
pub fn render(e: &Error, json: bool) -> String {
    error!(
        "Command failed [kind={:?}, retryable={}]: {}",
        e.kind(),
        e.is_retryable(),
        e
    );

    if json {
        serde_json::to_string(&ErrorResponse::from(e)).unwrap_or_else(|_| e.to_string())
    } else {
        format!("Error: {e}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediagrab_core::error::{ExtractionError, TaskError};

    #[test]
    fn test_error_response_from_busy() {
        let err = Error::from(TaskError::Busy { active: 2 });
        let response = ErrorResponse::from(&err);
        assert!(response.retryable);
        assert_eq!(response.retry_delay_secs, Some(1));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "task");
    }

    #[test]
    fn test_render_plain_and_json() {
        let err = Error::from(ExtractionError::Provider {
            url: "https://example.com".to_string(),
            message: "ERROR: Unsupported URL".to_string(),
        });

        assert!(render(&err, false).starts_with("Error: Failed to extract"));

        let json: serde_json::Value = serde_json::from_str(&render(&err, true)).unwrap();
        assert_eq!(json["kind"], "extraction");
        assert_eq!(json["retryable"], true);
    }
}
