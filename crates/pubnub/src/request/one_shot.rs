//! One-shot operations: publish, time, heartbeat and leave

use std::sync::Arc;

use pubnub_common::{Envelope, EnvelopeBuilder, RequestKind, Timetoken};
use pubnub_http::ConnectionPurpose;
use serde_json::Value;
use tokio::task::JoinHandle;

use super::{ClassifiedResponse, RequestEngine, RequestSpec, RequestStrategy};
use crate::error::{require_runtime, Error};
use crate::router::{invoke, Callback};

/// Strategy of requests that produce a single envelope
#[derive(Clone, Default)]
pub(crate) struct OneShot {
    kind: Option<RequestKind>,
    channel: Option<String>,
    callback: Option<Callback>,
    error_callback: Option<Callback>,
}

impl OneShot {
    pub(crate) fn new(kind: RequestKind, channel: Option<String>) -> Self {
        Self {
            kind: Some(kind),
            channel,
            ..Default::default()
        }
    }

    /// Where the response carries a timetoken
    fn timetoken(&self, json: &Value) -> Option<Timetoken> {
        let position = match self.kind? {
            RequestKind::Time => 0,
            RequestKind::Publish => 2,
            _ => return None,
        };
        json.get(position).and_then(Timetoken::from_json)
    }
}

impl RequestStrategy for OneShot {
    fn purpose(&self) -> ConnectionPurpose {
        ConnectionPurpose::OneShot
    }

    fn target_envelope(&self) -> EnvelopeBuilder {
        EnvelopeBuilder::default().channel(self.channel.clone())
    }

    fn demultiplex(&self, response: &ClassifiedResponse<'_>) -> Vec<EnvelopeBuilder> {
        let builder = self.target_envelope();
        let builder = match response.json() {
            Some(json) if !response.is_error() => builder
                .timetoken(self.timetoken(json))
                .message(json.clone()),
            _ => builder,
        };
        vec![builder]
    }

    fn dispatch(&self, envelopes: &[Envelope]) {
        for envelope in envelopes {
            let callback = if envelope.error().is_some() {
                self.error_callback.as_ref()
            } else {
                self.callback.as_ref()
            };

            if let Some(callback) = callback {
                invoke(callback, envelope);
            }
        }
    }
}

/// A validated one-shot request, ready to run
///
/// Run it with [`OneShotRequest::execute`] to await the envelopes, or hand
/// it to the runtime with [`OneShotRequest::spawn`]. Callbacks fire in both
/// modes.
#[must_use = "a request does nothing until it is executed or spawned"]
pub struct OneShotRequest {
    engine: Arc<RequestEngine>,
    spec: RequestSpec,
    strategy: OneShot,
}

impl std::fmt::Debug for OneShotRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OneShotRequest")
            .field("spec", &self.spec)
            .field("callback", &self.strategy.callback.is_some())
            .field("error_callback", &self.strategy.error_callback.is_some())
            .finish()
    }
}

impl OneShotRequest {
    pub(crate) fn new(engine: Arc<RequestEngine>, spec: RequestSpec, channel: Option<String>) -> Self {
        let strategy = OneShot::new(spec.kind(), channel);
        Self {
            engine,
            spec,
            strategy,
        }
    }

    /// Message callback
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.strategy.callback = Some(Arc::new(f));
        self
    }

    /// Error callback
    pub fn error_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.strategy.error_callback = Some(Arc::new(f));
        self
    }

    /// Use an error callback unless one was set already
    pub(crate) fn default_error_callback(mut self, callback: Option<Callback>) -> Self {
        if self.strategy.error_callback.is_none() {
            self.strategy.error_callback = callback;
        }
        self
    }

    /// Request description
    pub fn spec(&self) -> &RequestSpec {
        &self.spec
    }

    /// Run the request and wait for its envelope
    pub async fn execute(self) -> Result<Vec<Envelope>, Error> {
        self.engine.execute(&self.spec, &self.strategy).await
    }

    /// Run the request in the background
    ///
    /// Results are only observable through callbacks, so a message callback
    /// is mandatory.
    pub fn spawn(self) -> Result<JoinHandle<Result<Vec<Envelope>, Error>>, Error> {
        if self.strategy.callback.is_none() {
            return Err(Error::MissingCallback);
        }
        require_runtime("a background request")?;

        Ok(tokio::spawn(async move {
            let result = self.engine.execute(&self.spec, &self.strategy).await;
            if let Err(err) = &result {
                tracing::error!("Background {} failed: {}", self.spec.kind(), err);
            }
            result
        }))
    }
}
