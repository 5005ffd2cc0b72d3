//! Client builder

use std::sync::Arc;

use pubnub_common::{Cryptor, Envelope};

use crate::client::{Client, ClientInner};
use crate::config::Config;
use crate::error::{require_runtime, Error};
use crate::origin::{OriginManager, OriginManagerSettings, OriginPool};
use crate::request::{EngineSettings, RequestEngine};
use crate::router::{CallbackRouter, Callbacks};
use crate::subscribe::{SubscribeMultiplexer, SubscribeSettings};
use crate::transport::{HttpTransport, Transport};

/// Builder for creating a new [`Client`]
#[derive(Debug)]
pub struct ClientBuilder {
    config: Config,
    transport: Option<Arc<dyn Transport>>,
    cryptor: Option<Arc<dyn Cryptor>>,
    defaults: Callbacks,
    origin_manager: Option<bool>,
}

impl ClientBuilder {
    /// Create a new ClientBuilder
    pub fn new(config: Config) -> Self {
        Self {
            config,
            transport: None,
            cryptor: None,
            defaults: Callbacks::default(),
            origin_manager: None,
        }
    }

    /// Set a custom transport
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the payload decryptor, required when a cipher key is configured
    pub fn cryptor(mut self, cryptor: Arc<dyn Cryptor>) -> Self {
        self.cryptor = Some(cryptor);
        self
    }

    /// Error callback for operations that do not set their own
    pub fn error_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.defaults.error = Some(Arc::new(f));
        self
    }

    /// Presence callback for subscriptions that do not set their own
    pub fn presence_callback<F>(mut self, f: F) -> Self
    where
        F: Fn(&Envelope) + Send + Sync + 'static,
    {
        self.defaults.presence = Some(Arc::new(f));
        self
    }

    /// Force the origin manager on or off
    ///
    /// By default it runs only when more than one origin is configured.
    pub fn origin_manager(mut self, enabled: bool) -> Self {
        self.origin_manager = Some(enabled);
        self
    }

    /// Build the client
    ///
    /// Starting the origin manager spawns timers, so a tokio runtime must be
    /// running when it is enabled.
    pub fn build(self) -> Result<Client, Error> {
        let mut config = self.config;
        config.validate()?;

        if config.cipher_key.is_some() && self.cryptor.is_none() {
            return Err(Error::Config(
                "a cipher key is configured but no cryptor was given".to_string(),
            ));
        }

        if config.uuid.is_none() {
            config.uuid = Some(uuid::Uuid::new_v4().to_string());
        }

        let transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(HttpTransport::from_config(&config)),
        };

        let engine = Arc::new(RequestEngine::new(
            transport.clone(),
            EngineSettings::from(&config),
        ));
        let router = Arc::new(CallbackRouter::new());
        let multiplexer = SubscribeMultiplexer::new(
            engine.clone(),
            router.clone(),
            self.cryptor,
            SubscribeSettings::from(&config),
        );
        let pool = Arc::new(OriginPool::new(config.origins.clone()));

        let origin_manager = if self.origin_manager.unwrap_or(config.origins.len() > 1) {
            require_runtime("the origin manager")?;

            let manager = OriginManager::new(
                pool.clone(),
                transport,
                multiplexer.clone(),
                OriginManagerSettings::from(&config),
            );
            manager.start();
            Some(manager)
        } else {
            None
        };

        tracing::debug!("Client {:?} ready on {:?}", config.uuid, config.origins);

        Ok(Client::from_inner(ClientInner {
            config,
            engine,
            pool,
            router,
            multiplexer,
            origin_manager,
            defaults: self.defaults,
        }))
    }
}
