//! HTTP error types

use thiserror::Error;

/// Transport level errors
///
/// A response that arrives with a non-success status is *not* an error at
/// this layer: the request engine classifies status codes itself. These
/// variants only describe failures to obtain a response at all.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The server answered, but the body could not be read
    #[error("Failed to read response body ({status}): {message}")]
    Body {
        /// HTTP status code
        status: u16,
        /// Error message
        message: String,
    },
    /// Connection error
    #[error("Connection error: {0}")]
    Connection(String),
    /// Request timeout
    #[error("Request timeout")]
    Timeout,
    /// Invalid request url
    #[error("Invalid url: {0}")]
    Url(String),
    /// Client build error
    #[error("Client build error: {0}")]
    Build(String),
    /// Other error
    #[error("{0}")]
    Other(String),
}

impl HttpError {
    /// Whether the failure happened before any response was received
    pub fn is_connection_level(&self) -> bool {
        matches!(self, HttpError::Connection(_) | HttpError::Timeout)
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            HttpError::Timeout
        } else if err.is_builder() {
            HttpError::Build(err.to_string())
        } else if err.is_connect() {
            HttpError::Connection(err.to_string())
        } else if let Some(status) = err.status() {
            HttpError::Body {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            HttpError::Other(err.to_string())
        }
    }
}

impl From<url::ParseError> for HttpError {
    fn from(err: url::ParseError) -> Self {
        HttpError::Url(err.to_string())
    }
}
