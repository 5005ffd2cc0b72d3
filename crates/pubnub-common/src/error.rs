//! Error records carried inside envelopes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of the request that produced a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    /// Subscribe long-poll
    Subscribe,
    /// Publish
    Publish,
    /// Server time
    Time,
    /// Presence heartbeat
    Heartbeat,
    /// Presence leave
    Leave,
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Subscribe => "subscribe",
            Self::Publish => "publish",
            Self::Time => "time",
            Self::Heartbeat => "heartbeat",
            Self::Leave => "leave",
        };
        write!(f, "{name}")
    }
}

/// Tag of an error record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Body was not valid JSON, status was a success
    InvalidJson,
    /// Body was valid JSON, status was not a success
    NonSuccessStatus,
    /// Neither the body nor the status were acceptable
    InvalidJsonAndNonSuccess,
    /// Anything else, including a request abandoned after network failures
    Unknown,
}

impl ErrorKind {
    /// Human readable message used when nothing more specific is known
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::InvalidJson | Self::InvalidJsonAndNonSuccess => "Invalid JSON in response.",
            Self::NonSuccessStatus => "Non 2xx server response.",
            Self::Unknown => "Unknown Error.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            Self::InvalidJson => "invalid-json",
            Self::NonSuccessStatus => "non-success-status",
            Self::InvalidJsonAndNonSuccess => "invalid-json-and-non-success",
            Self::Unknown => "unknown",
        };
        write!(f, "{tag}")
    }
}

/// Error attached to an envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    kind: ErrorKind,
    message: String,
    request: RequestKind,
    response: String,
}

impl ErrorRecord {
    /// Create a record with the default message for its kind
    pub fn new(kind: ErrorKind, request: RequestKind, response: impl Into<String>) -> Self {
        Self {
            kind,
            message: kind.default_message().to_owned(),
            request,
            response: response.into(),
        }
    }

    /// Replace the message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Error tag
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Request that failed
    pub fn request(&self) -> RequestKind {
        self.request
    }

    /// Raw response body, empty when no response was received
    pub fn response(&self) -> &str {
        &self.response
    }
}

impl fmt::Display for ErrorRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.request, self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_record_defaults() {
        let record = ErrorRecord::new(ErrorKind::NonSuccessStatus, RequestKind::Publish, "{}");
        assert_eq!(record.kind(), ErrorKind::NonSuccessStatus);
        assert_eq!(record.message(), "Non 2xx server response.");
        assert_eq!(record.request(), RequestKind::Publish);
        assert_eq!(record.response(), "{}");
        assert_eq!(
            record.to_string(),
            "publish [non-success-status]: Non 2xx server response."
        );
    }

    #[test]
    fn test_error_kind_serializes_as_tag() {
        let json = serde_json::to_string(&ErrorKind::InvalidJsonAndNonSuccess)
            .expect("serializable");
        assert_eq!(json, "\"invalid-json-and-non-success\"");
    }

    #[test]
    fn test_with_message() {
        let record = ErrorRecord::new(ErrorKind::Unknown, RequestKind::Subscribe, "")
            .with_message("network unreachable");
        assert_eq!(record.message(), "network unreachable");
    }
}
