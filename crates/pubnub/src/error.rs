//! Errors

use pubnub_common::RequestKind;
use pubnub_http::HttpError;
use thiserror::Error;

/// PubNub client error
///
/// Request-level failures (malformed bodies, non-success statuses) are not
/// errors: they reach the caller as error envelopes. An `Err` is returned
/// either when an operation is rejected before any network activity, or
/// when a request is abandoned after exhausting its retries.
#[derive(Debug, Error)]
pub enum Error {
    /// Channel argument is not acceptable
    #[error("Invalid channel(s) format: {0}")]
    InvalidChannel(String),
    /// Asynchronous operations need somewhere to deliver results
    #[error("Callback parameter is required while using async")]
    MissingCallback,
    /// A key required by the operation is not configured
    #[error("Missing {0} key")]
    MissingKey(&'static str),
    /// Origin pool is empty
    #[error("No origin available")]
    NoOrigin,
    /// Url could not be built
    #[error("Invalid url: {0}")]
    Url(#[from] url::ParseError),
    /// Transport error
    #[error(transparent)]
    Http(#[from] HttpError),
    /// Network failures persisted through every retry
    #[error("Aborting {request} after {attempts} attempts: {source}")]
    RetriesExhausted {
        /// Request that was abandoned
        request: RequestKind,
        /// Number of attempts made
        attempts: u32,
        /// Last transport error
        #[source]
        source: HttpError,
    },
    /// Configuration error
    #[error("Invalid configuration: {0}")]
    Config(String),
    /// Serialization error
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

/// Reject operations that spawn tasks outside a tokio runtime
pub(crate) fn require_runtime(operation: &str) -> Result<(), Error> {
    tokio::runtime::Handle::try_current()
        .map(|_| ())
        .map_err(|_| Error::Config(format!("{} needs a running tokio runtime", operation)))
}
