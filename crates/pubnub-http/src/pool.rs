//! Persistent connection pools keyed by origin and traffic purpose

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use parking_lot::RwLock;

use crate::client::HttpClient;
use crate::response::Response;

/// Kind of traffic a pooled connection serves
///
/// One-shot requests and subscribe long-polls never share a connection: a
/// long-poll holds its connection for minutes and needs a much larger read
/// timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionPurpose {
    /// Publish, time, heartbeat, leave and origin ping requests
    OneShot,
    /// Subscribe long-poll requests
    Subscribe,
}

impl fmt::Display for ConnectionPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneShot => write!(f, "one-shot"),
            Self::Subscribe => write!(f, "subscribe"),
        }
    }
}

/// Pool settings
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Idle and read timeout for one-shot connections
    pub one_shot_timeout: Duration,
    /// Idle and read timeout for subscribe connections
    pub subscribe_timeout: Duration,
    /// Reuse connections between requests
    pub persistent: bool,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            one_shot_timeout: Duration::from_secs(10),
            subscribe_timeout: Duration::from_secs(310),
            persistent: true,
            user_agent: format!("PubNub-Rust/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl PoolConfig {
    fn timeout_for(&self, purpose: ConnectionPurpose) -> Duration {
        match purpose {
            ConnectionPurpose::OneShot => self.one_shot_timeout,
            ConnectionPurpose::Subscribe => self.subscribe_timeout,
        }
    }
}

/// Connection pool
///
/// Holds at most one persistent client per (origin, purpose) pair. When
/// persistence is disabled every call to [`ConnectionPool::client_for`]
/// returns a fresh client that never keeps idle connections.
#[derive(Debug)]
pub struct ConnectionPool {
    config: PoolConfig,
    clients: RwLock<HashMap<(String, ConnectionPurpose), HttpClient>>,
}

impl ConnectionPool {
    /// Create a new, empty pool
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            clients: RwLock::new(HashMap::new()),
        }
    }

    /// Pool settings
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    fn build_client(&self, purpose: ConnectionPurpose) -> Response<HttpClient> {
        let timeout = self.config.timeout_for(purpose);
        HttpClient::builder()
            .read_timeout(timeout)
            .idle_timeout(timeout)
            .user_agent(self.config.user_agent.clone())
            .disable_keep_alive(!self.config.persistent)
            .build()
    }

    /// Get the client for an origin and purpose, creating it on first use
    pub fn client_for(&self, origin: &str, purpose: ConnectionPurpose) -> Response<HttpClient> {
        if !self.config.persistent {
            return self.build_client(purpose);
        }

        let key = (origin.to_owned(), purpose);
        if let Some(client) = self.clients.read().get(&key) {
            return Ok(client.clone());
        }

        let mut clients = self.clients.write();
        if let Some(client) = clients.get(&key) {
            return Ok(client.clone());
        }

        tracing::debug!("Opening {} connection to {}", purpose, origin);
        let client = self.build_client(purpose)?;
        clients.insert(key, client.clone());
        Ok(client)
    }

    /// Whether a persistent client exists for an origin and purpose
    pub fn is_open(&self, origin: &str, purpose: ConnectionPurpose) -> bool {
        self.clients
            .read()
            .contains_key(&(origin.to_owned(), purpose))
    }

    /// Drop the persistent client for an origin and purpose
    ///
    /// Requests still holding a clone of the client finish on their own; the
    /// next request for this pair opens a new connection.
    pub fn shutdown(&self, origin: &str, purpose: ConnectionPurpose) -> bool {
        let removed = self
            .clients
            .write()
            .remove(&(origin.to_owned(), purpose))
            .is_some();
        if removed {
            tracing::debug!("Closed {} connection to {}", purpose, origin);
        }
        removed
    }

    /// Drop every persistent client
    pub fn shutdown_all(&self) {
        self.clients.write().clear();
    }
}
