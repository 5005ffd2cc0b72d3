//! Client configuration

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Error;

/// Default origin
pub const DEFAULT_ORIGIN: &str = "pubsub.pubnub.com";

/// Client configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Subscribe key, required for every operation
    pub subscribe_key: String,
    /// Publish key, required for publishing
    pub publish_key: Option<String>,
    /// Secret key
    pub secret_key: Option<String>,
    /// Access manager token
    pub auth_key: Option<String>,
    /// Client identity, generated when absent
    pub uuid: Option<String>,
    /// Cipher key; when set, message payloads are decrypted
    pub cipher_key: Option<String>,
    /// Use https
    pub ssl: bool,
    /// Ordered origin pool, the first entry is active
    pub origins: Vec<String>,
    /// Retries for malformed bodies and transport failures
    pub max_retries: u32,
    /// Seconds to wait between transport retries
    pub retries_interval: u64,
    /// Read timeout of subscribe connections, in seconds
    pub subscribe_timeout: u64,
    /// Read timeout of one-shot connections, in seconds
    pub non_subscribe_timeout: u64,
    /// Seconds between origin pings
    pub origin_heartbeat_interval: u64,
    /// Consecutive ping results needed to fail over or fail back
    pub origin_heartbeat_max_retries: u32,
    /// Presence heartbeat in seconds
    pub heartbeat: Option<u64>,
    /// Open a fresh connection for every request
    pub disable_persistent_connection: bool,
    /// Presence state sent with subscribe requests, keyed by origin
    pub state: HashMap<String, Value>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            subscribe_key: String::new(),
            publish_key: None,
            secret_key: None,
            auth_key: None,
            uuid: None,
            cipher_key: None,
            ssl: false,
            origins: vec![DEFAULT_ORIGIN.to_string()],
            max_retries: 5,
            retries_interval: 5,
            subscribe_timeout: 310,
            non_subscribe_timeout: 10,
            origin_heartbeat_interval: 60,
            origin_heartbeat_max_retries: 3,
            heartbeat: None,
            disable_persistent_connection: false,
            state: HashMap::new(),
        }
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |key: &Option<String>| key.as_ref().map(|_| "<redacted>");

        f.debug_struct("Config")
            .field("subscribe_key", &self.subscribe_key)
            .field("publish_key", &self.publish_key)
            .field("secret_key", &redact(&self.secret_key))
            .field("auth_key", &redact(&self.auth_key))
            .field("uuid", &self.uuid)
            .field("cipher_key", &redact(&self.cipher_key))
            .field("ssl", &self.ssl)
            .field("origins", &self.origins)
            .field("max_retries", &self.max_retries)
            .field("retries_interval", &self.retries_interval)
            .field("subscribe_timeout", &self.subscribe_timeout)
            .field("non_subscribe_timeout", &self.non_subscribe_timeout)
            .field("origin_heartbeat_interval", &self.origin_heartbeat_interval)
            .field(
                "origin_heartbeat_max_retries",
                &self.origin_heartbeat_max_retries,
            )
            .field("heartbeat", &self.heartbeat)
            .field(
                "disable_persistent_connection",
                &self.disable_persistent_connection,
            )
            .finish()
    }
}

impl Config {
    /// Configuration for a subscribe key with every other field defaulted
    pub fn new(subscribe_key: impl Into<String>) -> Self {
        Self {
            subscribe_key: subscribe_key.into(),
            ..Default::default()
        }
    }

    /// Check the configuration is usable
    pub fn validate(&self) -> Result<(), Error> {
        if self.subscribe_key.trim().is_empty() {
            return Err(Error::MissingKey("subscribe"));
        }

        if self.origins.is_empty() || self.origins.iter().any(|o| o.trim().is_empty()) {
            return Err(Error::Config("origin list must not be empty".to_string()));
        }

        if self.heartbeat == Some(0) {
            return Err(Error::Config(
                "presence heartbeat must be at least one second".to_string(),
            ));
        }

        Ok(())
    }

    /// Url scheme
    pub fn scheme(&self) -> &'static str {
        if self.ssl {
            "https"
        } else {
            "http"
        }
    }

    /// Delay between transport retries
    pub fn retries_interval(&self) -> Duration {
        Duration::from_secs(self.retries_interval)
    }

    /// Delay between origin pings
    pub fn origin_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.origin_heartbeat_interval.max(1))
    }

    /// Presence state for an origin
    pub fn state_for(&self, origin: &str) -> Option<&Value> {
        self.state.get(origin)
    }
}
