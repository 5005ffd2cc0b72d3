//! Request lifecycle
//!
//! Every operation goes through [`RequestEngine::execute`]: build the url,
//! send it, classify the response, retry transient failures, then hand the
//! body to a [`RequestStrategy`] that turns it into envelopes, advances any
//! cursor and dispatches callbacks.

use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use pubnub_common::parser::{is_valid_json, parse_json};
use pubnub_common::{Envelope, EnvelopeBuilder, ErrorKind, ErrorRecord, RequestKind};
use pubnub_http::{ConnectionPurpose, RawResponse};
use serde_json::Value;
use tracing::instrument;
use url::Url;

use crate::config::Config;
use crate::error::Error;
use crate::transport::Transport;

pub mod endpoints;
pub mod one_shot;

/// Status codes treated as success
pub const SUCCESS_STATUS: RangeInclusive<u16> = 200..=206;

/// SDK identity sent with every request
pub const SDK_IDENTIFIER: &str = concat!("PubNub-Rust/", env!("CARGO_PKG_VERSION"));

/// Request description: target origin, path and query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestSpec {
    kind: RequestKind,
    origin: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
}

impl RequestSpec {
    /// Request to `origin` with an empty path
    pub fn new(kind: RequestKind, origin: impl Into<String>) -> Self {
        Self {
            kind,
            origin: origin.into(),
            segments: Vec::new(),
            query: Vec::new(),
        }
    }

    /// Append a path segment, it is percent-encoded when the url is built
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    /// Append a query parameter
    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_owned(), value.into()));
        self
    }

    /// Request kind
    pub fn kind(&self) -> RequestKind {
        self.kind
    }

    /// Target origin
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Path segments
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Value of a query parameter
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Outcome of crossing the JSON check with the status check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Valid JSON and a success status
    Success,
    /// Valid JSON, non-success status
    StatusError,
    /// Malformed body, success status
    BodyError,
    /// Malformed body and non-success status
    BothErrors,
}

impl Classification {
    /// Classify a raw response
    pub fn of(status: u16, body: &str) -> Self {
        match (is_valid_json(body), SUCCESS_STATUS.contains(&status)) {
            (true, true) => Self::Success,
            (true, false) => Self::StatusError,
            (false, true) => Self::BodyError,
            (false, false) => Self::BothErrors,
        }
    }

    /// Error tag to attach, `None` on success
    pub fn error_kind(self) -> Option<ErrorKind> {
        match self {
            Self::Success => None,
            Self::StatusError => Some(ErrorKind::NonSuccessStatus),
            Self::BodyError => Some(ErrorKind::InvalidJson),
            Self::BothErrors => Some(ErrorKind::InvalidJsonAndNonSuccess),
        }
    }

    /// Whether the request should be retried
    pub fn is_retryable(self) -> bool {
        self == Self::BodyError
    }
}

/// Response as seen by a demultiplexer
#[derive(Debug)]
pub struct ClassifiedResponse<'a> {
    status: u16,
    body: &'a str,
    json: Option<Value>,
    classification: Classification,
}

impl<'a> ClassifiedResponse<'a> {
    /// Classify and parse a response
    pub fn new(status: u16, body: &'a str) -> Self {
        Self::with_classification(status, body, Classification::of(status, body))
    }

    fn with_classification(status: u16, body: &'a str, classification: Classification) -> Self {
        let json = match classification {
            Classification::Success | Classification::StatusError => parse_json(body).ok(),
            _ => None,
        };

        Self {
            status,
            body,
            json,
            classification,
        }
    }

    /// Status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Raw body
    pub fn body(&self) -> &str {
        self.body
    }

    /// Parsed body, if it is valid JSON
    pub fn json(&self) -> Option<&Value> {
        self.json.as_ref()
    }

    /// Classification
    pub fn classification(&self) -> Classification {
        self.classification
    }

    /// Whether the response carries an error classification
    pub fn is_error(&self) -> bool {
        self.classification != Classification::Success
    }
}

/// Behaviour that differs between one-shot and subscribe requests
pub trait RequestStrategy: Send + Sync {
    /// Connection pool to send on
    fn purpose(&self) -> ConnectionPurpose;

    /// Envelope pre-filled with the request's target, used when no
    /// response can be demultiplexed
    fn target_envelope(&self) -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Split a response into envelopes
    fn demultiplex(&self, response: &ClassifiedResponse<'_>) -> Vec<EnvelopeBuilder>;

    /// Advance the cursor, called before [`RequestStrategy::dispatch`]
    fn update_cursor(&self, _envelopes: &[Envelope]) {}

    /// Deliver envelopes to callbacks
    fn dispatch(&self, envelopes: &[Envelope]);
}

/// Settings shared by every request
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Url scheme
    pub scheme: &'static str,
    /// Access manager token
    pub auth_key: Option<String>,
    /// Client identity
    pub uuid: Option<String>,
    /// Retry bound for malformed bodies and transport failures
    pub max_retries: u32,
    /// Delay before retrying after a transport failure
    pub retries_interval: Duration,
}

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            scheme: config.scheme(),
            auth_key: config.auth_key.clone(),
            uuid: config.uuid.clone(),
            max_retries: config.max_retries,
            retries_interval: config.retries_interval(),
        }
    }
}

/// Request engine
#[derive(Debug, Clone)]
pub struct RequestEngine {
    transport: Arc<dyn Transport>,
    settings: EngineSettings,
}

impl RequestEngine {
    /// Create an engine on top of a transport
    pub fn new(transport: Arc<dyn Transport>, settings: EngineSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// Engine settings
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Transport in use
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Build the url for a request
    pub fn url(&self, spec: &RequestSpec) -> Result<Url, Error> {
        let mut url = Url::parse(&format!("{}://{}", self.settings.scheme, spec.origin()))?;

        url.path_segments_mut()
            .map_err(|_| Error::Url(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .clear()
            .extend(spec.segments());

        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("pnsdk", SDK_IDENTIFIER);
            if let Some(auth) = &self.settings.auth_key {
                pairs.append_pair("auth", auth);
            }
            if let Some(uuid) = &self.settings.uuid {
                pairs.append_pair("uuid", uuid);
            }
            for (key, value) in &spec.query {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Run a request to completion
    ///
    /// Malformed bodies are retried up to `max_retries` times, then reported
    /// as an error envelope. Transport failures are retried after
    /// `retries_interval`; once the retries are exhausted the strategy's
    /// error callback receives an `unknown` error envelope and
    /// [`Error::RetriesExhausted`] is returned.
    #[instrument(skip(self, spec, strategy), fields(request = %spec.kind(), origin = %spec.origin()))]
    pub async fn execute<S>(&self, spec: &RequestSpec, strategy: &S) -> Result<Vec<Envelope>, Error>
    where
        S: RequestStrategy + ?Sized,
    {
        let url = self.url(spec)?;
        let mut attempt: u32 = 0;

        let (response, classification) = loop {
            tracing::debug!("Sending {}", url);

            match self
                .transport
                .send(spec.origin(), url.clone(), strategy.purpose())
                .await
            {
                Ok(response) => {
                    let classification = Classification::of(response.status(), response.body());
                    if classification.is_retryable() && attempt < self.settings.max_retries {
                        attempt += 1;
                        tracing::warn!(
                            "Invalid JSON in {} response, retry {}/{}",
                            spec.kind(),
                            attempt,
                            self.settings.max_retries
                        );
                        continue;
                    }
                    break (response, classification);
                }
                Err(err) => {
                    if attempt >= self.settings.max_retries {
                        tracing::error!(
                            "Giving up on {} after {} attempts: {}",
                            spec.kind(),
                            attempt + 1,
                            err
                        );

                        let error = Error::RetriesExhausted {
                            request: spec.kind(),
                            attempts: attempt + 1,
                            source: err,
                        };
                        let envelope = strategy
                            .target_envelope()
                            .position(true, true)
                            .error(
                                ErrorRecord::new(ErrorKind::Unknown, spec.kind(), "")
                                    .with_message(error.to_string()),
                            )
                            .build();
                        strategy.dispatch(std::slice::from_ref(&envelope));

                        return Err(error);
                    }

                    attempt += 1;
                    tracing::warn!(
                        "{} request failed: {}, retry {}/{} in {:?}",
                        spec.kind(),
                        err,
                        attempt,
                        self.settings.max_retries,
                        self.settings.retries_interval
                    );
                    tokio::time::sleep(self.settings.retries_interval).await;
                }
            }
        };

        Ok(self.handle_response(spec, strategy, &response, classification))
    }

    fn handle_response<S>(
        &self,
        spec: &RequestSpec,
        strategy: &S,
        response: &RawResponse,
        classification: Classification,
    ) -> Vec<Envelope>
    where
        S: RequestStrategy + ?Sized,
    {
        let classified =
            ClassifiedResponse::with_classification(response.status(), response.body(), classification);
        let builders = strategy.demultiplex(&classified);
        let envelopes = assemble(spec.kind(), response, classification, builders);

        tracing::debug!(
            "{} response {} produced {} envelope(s)",
            spec.kind(),
            response.status(),
            envelopes.len()
        );

        strategy.update_cursor(&envelopes);
        strategy.dispatch(&envelopes);
        envelopes
    }
}

/// Attach response metadata and batch positions, collapsing to a single
/// error envelope when the response was classified as an error
fn assemble(
    kind: RequestKind,
    response: &RawResponse,
    classification: Classification,
    builders: Vec<EnvelopeBuilder>,
) -> Vec<Envelope> {
    if let Some(error_kind) = classification.error_kind() {
        let record = ErrorRecord::new(error_kind, kind, response.body());
        let builder = builders.into_iter().next().unwrap_or_default();
        return vec![builder
            .response(response.status(), response.body())
            .position(true, true)
            .error(record)
            .build()];
    }

    let count = builders.len();
    builders
        .into_iter()
        .enumerate()
        .map(|(i, builder)| {
            builder
                .response(response.status(), response.body())
                .position(i == 0, i + 1 == count)
                .build()
        })
        .collect()
}
