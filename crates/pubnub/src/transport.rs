//! HTTP Transport trait with a default implementation
use std::fmt::Debug;
use std::time::Duration;

use pubnub_http::{ConnectionPool, ConnectionPurpose, HttpError, PoolConfig, RawResponse};
use url::Url;

use crate::config::Config;

/// Expected HTTP Transport
///
/// A transport performs a single request and hands back the raw status and
/// body, whatever the status is. Only connection-level problems are errors.
#[async_trait::async_trait]
pub trait Transport: Send + Sync + Debug {
    /// Send a GET request on the connection reserved for `origin` and `purpose`
    async fn send(
        &self,
        origin: &str,
        url: Url,
        purpose: ConnectionPurpose,
    ) -> Result<RawResponse, HttpError>;

    /// Drop the persistent connection for `origin` and `purpose`, if any
    fn shutdown(&self, origin: &str, purpose: ConnectionPurpose);

    /// Drop every persistent connection
    fn shutdown_all(&self);
}

/// Transport backed by a [`ConnectionPool`] of reqwest clients
#[derive(Debug)]
pub struct HttpTransport {
    pool: ConnectionPool,
}

impl HttpTransport {
    /// Create a transport with the given pool settings
    pub fn new(config: PoolConfig) -> Self {
        Self {
            pool: ConnectionPool::new(config),
        }
    }

    /// Create a transport using the timeouts of a client configuration
    pub fn from_config(config: &Config) -> Self {
        Self::new(PoolConfig {
            one_shot_timeout: Duration::from_secs(config.non_subscribe_timeout),
            subscribe_timeout: Duration::from_secs(config.subscribe_timeout),
            persistent: !config.disable_persistent_connection,
            ..Default::default()
        })
    }

    /// Underlying pool
    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        origin: &str,
        url: Url,
        purpose: ConnectionPurpose,
    ) -> Result<RawResponse, HttpError> {
        let client = self.pool.client_for(origin, purpose)?;
        client.get_raw(url.as_str()).await
    }

    fn shutdown(&self, origin: &str, purpose: ConnectionPurpose) {
        if self.pool.shutdown(origin, purpose) {
            tracing::debug!("Closed {} connection to {}", purpose, origin);
        }
    }

    fn shutdown_all(&self) {
        self.pool.shutdown_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_timeouts() {
        let mut config = Config::new("demo");
        config.subscribe_timeout = 20;
        config.non_subscribe_timeout = 3;
        config.disable_persistent_connection = true;

        let transport = HttpTransport::from_config(&config);
        let pool = transport.pool().config();
        assert_eq!(pool.subscribe_timeout, Duration::from_secs(20));
        assert_eq!(pool.one_shot_timeout, Duration::from_secs(3));
        assert!(!pool.persistent);
    }
}
