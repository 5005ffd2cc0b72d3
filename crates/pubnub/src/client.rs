//! Client session

use std::sync::Arc;

use pubnub_common::{Envelope, TargetKind};
use serde::Serialize;

use crate::builder::ClientBuilder;
use crate::config::Config;
use crate::error::Error;
use crate::origin::{OriginManager, OriginPool};
use crate::request::endpoints;
use crate::request::one_shot::OneShotRequest;
use crate::request::{RequestEngine, RequestSpec};
use crate::router::{Callback, CallbackRouter, Callbacks};
use crate::subscribe::{SubscribeMultiplexer, Targets};

/// PubNub client
///
/// Cheap to clone; every clone shares the same session: origin pool,
/// subscriptions, callback registry and pooled connections.
#[derive(Debug, Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

#[derive(Debug)]
pub(crate) struct ClientInner {
    pub(crate) config: Config,
    pub(crate) engine: Arc<RequestEngine>,
    pub(crate) pool: Arc<OriginPool>,
    pub(crate) router: Arc<CallbackRouter>,
    pub(crate) multiplexer: Arc<SubscribeMultiplexer>,
    pub(crate) origin_manager: Option<Arc<OriginManager>>,
    pub(crate) defaults: Callbacks,
}

/// Reject names the subscribe path cannot carry
fn validate_name(kind: TargetKind, name: &str) -> Result<(), Error> {
    if name.trim().is_empty() || name.contains(',') {
        return Err(Error::InvalidChannel(format!("{} {:?}", kind, name)));
    }
    Ok(())
}

fn validate_targets(targets: &Targets) -> Result<(), Error> {
    if targets.is_empty() {
        return Err(Error::InvalidChannel("no channel given".to_string()));
    }
    targets
        .iter()
        .try_for_each(|(kind, name)| validate_name(kind, name))
}

impl Client {
    pub(crate) fn from_inner(inner: ClientInner) -> Self {
        Self {
            inner: Arc::new(inner),
        }
    }

    /// Start configuring a client
    pub fn builder(config: Config) -> ClientBuilder {
        ClientBuilder::new(config)
    }

    /// Configuration in use
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Client identity
    pub fn uuid(&self) -> Option<&str> {
        self.inner.config.uuid.as_deref()
    }

    /// Origin requests go to unless told otherwise
    pub fn active_origin(&self) -> Result<String, Error> {
        self.inner.pool.active().ok_or(Error::NoOrigin)
    }

    /// Origin pool
    pub fn origin_pool(&self) -> &Arc<OriginPool> {
        &self.inner.pool
    }

    /// Origin manager, when more than one origin is configured
    pub fn origin_manager(&self) -> Option<&Arc<OriginManager>> {
        self.inner.origin_manager.as_ref()
    }

    /// Subscribe multiplexer, for inspecting subscription state
    pub fn multiplexer(&self) -> &Arc<SubscribeMultiplexer> {
        &self.inner.multiplexer
    }

    fn one_shot(&self, spec: RequestSpec, channel: Option<String>) -> OneShotRequest {
        OneShotRequest::new(self.inner.engine.clone(), spec, channel)
            .default_error_callback(self.inner.defaults.error.clone())
    }

    /// Server time
    pub fn time(&self) -> Result<OneShotRequest, Error> {
        let origin = self.active_origin()?;
        Ok(self.one_shot(endpoints::time(&origin), None))
    }

    /// Publish a message to a channel
    pub fn publish<M>(&self, channel: &str, message: &M) -> Result<OneShotRequest, Error>
    where
        M: Serialize + ?Sized,
    {
        validate_name(TargetKind::Channel, channel)?;
        let publish_key = self
            .inner
            .config
            .publish_key
            .as_deref()
            .ok_or(Error::MissingKey("publish"))?;
        let message = serde_json::to_value(message)?;
        let origin = self.active_origin()?;

        let spec = endpoints::publish(
            &origin,
            publish_key,
            &self.inner.config.subscribe_key,
            channel,
            &message,
        );
        Ok(self.one_shot(spec, Some(channel.to_owned())))
    }

    /// Announce presence on channels and groups
    pub fn heartbeat(&self, targets: &Targets) -> Result<OneShotRequest, Error> {
        validate_targets(targets)?;
        let heartbeat = self
            .inner
            .config
            .heartbeat
            .ok_or_else(|| Error::Config("presence heartbeat is not configured".to_string()))?;
        let origin = self.active_origin()?;

        let spec = endpoints::heartbeat(
            &origin,
            &self.inner.config.subscribe_key,
            &targets.path_names(),
            &targets.channel_groups,
            heartbeat,
            self.inner.config.state_for(&origin),
        );
        Ok(self.one_shot(spec, targets.channels.first().cloned()))
    }

    /// Announce leaving channels and groups
    pub fn leave(&self, targets: &Targets) -> Result<OneShotRequest, Error> {
        validate_targets(targets)?;
        let origin = self.active_origin()?;
        Ok(self.leave_on(&origin, targets))
    }

    fn leave_on(&self, origin: &str, targets: &Targets) -> OneShotRequest {
        let spec = endpoints::leave(
            origin,
            &self.inner.config.subscribe_key,
            &targets.path_names(),
            &targets.channel_groups,
        );
        self.one_shot(spec, targets.channels.first().cloned())
    }

    /// Start describing a subscription
    pub fn subscribe(&self) -> SubscribeRequest {
        SubscribeRequest {
            client: self.clone(),
            origin: None,
            targets: Targets::default(),
            callbacks: Callbacks::default(),
        }
    }

    /// Drop targets from the live subscription and send a leave for them
    ///
    /// Leave requests are best effort, their failures are logged and the
    /// envelopes of those that completed are returned.
    pub async fn unsubscribe(&self, targets: Targets) -> Result<Vec<Envelope>, Error> {
        validate_targets(&targets)?;
        let removed = self.inner.multiplexer.unsubscribe(&targets);

        let mut envelopes = Vec::new();
        for (origin, targets) in removed {
            match self.leave_on(&origin, &targets).execute().await {
                Ok(leave) => envelopes.extend(leave),
                Err(err) => tracing::warn!("Leave on {} failed: {}", origin, err),
            }
        }
        Ok(envelopes)
    }

    /// Stop every background task and forget all subscriptions
    pub fn shutdown(&self) {
        tracing::debug!("Shutting down client");
        if let Some(manager) = &self.inner.origin_manager {
            manager.stop();
        }
        self.inner.multiplexer.shutdown();
        self.inner.router.clear();
        self.inner.engine.transport().shutdown_all();
    }
}

/// Subscription being described
///
/// [`SubscribeRequest::start`] registers the targets and keeps polling in
/// the background. [`SubscribeRequest::execute`] performs a single poll
/// without registering anything.
#[must_use = "a subscription does nothing until it is started or executed"]
#[derive(Debug)]
pub struct SubscribeRequest {
    client: Client,
    origin: Option<String>,
    targets: Targets,
    callbacks: Callbacks,
}

impl SubscribeRequest {
    /// Add a channel; names containing `.*` are wildcard patterns
    pub fn channel(mut self, name: impl Into<String>) -> Self {
        self.targets = self.targets.channel(name);
        self
    }

    /// Add several channels
    pub fn channels<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.targets = self.targets.channel(name);
        }
        self
    }

    /// Add a channel group
    pub fn channel_group(mut self, name: impl Into<String>) -> Self {
        self.targets = self.targets.channel_group(name);
        self
    }

    /// Add several channel groups
    pub fn channel_groups<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            self.targets = self.targets.channel_group(name);
        }
        self
    }

    /// Subscribe through a specific origin instead of the active one
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Message callback
    pub fn callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.callbacks.message = Some(Arc::new(f));
        self
    }

    /// Presence callback for wildcard subscriptions
    pub fn presence_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.callbacks.presence = Some(Arc::new(f));
        self
    }

    /// Error callback
    pub fn error_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.callbacks.error = Some(Arc::new(f));
        self
    }

    fn prepare(mut self) -> Result<(Client, String, Targets, Callbacks), Error> {
        validate_targets(&self.targets)?;
        let origin = match self.origin.take() {
            Some(origin) => origin,
            None => self.client.active_origin()?,
        };

        let defaults = &self.client.inner.defaults;
        let fallback = |slot: Option<Callback>, default: &Option<Callback>| slot.or_else(|| default.clone());
        let callbacks = Callbacks {
            message: self.callbacks.message,
            presence: fallback(self.callbacks.presence, &defaults.presence),
            error: fallback(self.callbacks.error, &defaults.error),
        };

        Ok((self.client, origin, self.targets, callbacks))
    }

    /// Register the subscription and keep polling in the background
    ///
    /// Targets already subscribed are skipped. Returns false when none of
    /// the targets were new. Fails with [`Error::Config`] outside a tokio
    /// runtime.
    pub fn start(self) -> Result<bool, Error> {
        if self.callbacks.message.is_none() {
            return Err(Error::MissingCallback);
        }
        let (client, origin, targets, callbacks) = self.prepare()?;
        client
            .inner
            .multiplexer
            .subscribe(&origin, targets, callbacks)
    }

    /// Poll once and return the envelopes
    pub async fn execute(self) -> Result<Vec<Envelope>, Error> {
        let (client, origin, targets, callbacks) = self.prepare()?;
        client
            .inner
            .multiplexer
            .subscribe_once(&origin, targets, callbacks)
            .await
    }
}
