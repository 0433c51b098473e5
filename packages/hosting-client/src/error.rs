//! Error types for the hosting client.

use thiserror::Error;

use crate::retry::Retryable;

/// Result type for hosting client operations.
pub type Result<T> = std::result::Result<T, HostingError>;

/// Hosting provider errors.
#[derive(Debug, Error)]
pub enum HostingError {
    /// Configuration error (missing token, invalid settings)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request never produced a response (connect failure, reset, timeout)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Non-2xx response from the provider
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body did not match the expected shape
    #[error("Parse error: {0}")]
    Parse(String),
}

impl HostingError {
    /// HTTP status of the failed call, if the provider answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            HostingError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl Retryable for HostingError {
    /// Only 5xx, 429 and transport failures are worth another attempt.
    fn is_retryable(&self) -> bool {
        match self {
            HostingError::Connection(_) => true,
            HostingError::Api { status, .. } => *status == 429 || (500..600).contains(status),
            HostingError::Config(_) | HostingError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for HostingError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            HostingError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            HostingError::Api {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            // timeouts, refused/reset connections and body read failures
            HostingError::Connection(err.to_string())
        }
    }
}
