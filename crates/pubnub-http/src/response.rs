//! HTTP response types

use crate::error::HttpError;

/// HTTP Response type - generic over the body type R and error type E
pub type Response<R, E = HttpError> = Result<R, E>;

/// Raw HTTP response: the status code and the fully read body
///
/// The body is kept as text because the engine needs the raw bytes both to
/// validate them as JSON and to hand them back to callers inside envelopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    status: u16,
    body: String,
}

impl RawResponse {
    /// Create a new raw response
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Read a reqwest response to the end
    pub(crate) async fn read(response: reqwest::Response) -> Response<Self> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| HttpError::Body {
            status,
            message: e.to_string(),
        })?;
        Ok(Self { status, body })
    }

    /// Get the HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Get the response body
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Consume the response returning the body
    pub fn into_body(self) -> String {
        self.body
    }

    /// Check if the response status is a success (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if the response status is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}
