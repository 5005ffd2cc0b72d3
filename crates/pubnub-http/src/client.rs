//! HTTP client wrapper

use std::time::Duration;

use crate::error::HttpError;
use crate::response::{RawResponse, Response};

/// HTTP client wrapper
#[derive(Debug, Clone)]
pub struct HttpClient {
    inner: reqwest::Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Self {
        Self {
            inner: reqwest::Client::new(),
        }
    }

    /// Create a new HTTP client builder
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Create an HttpClient from a reqwest::Client
    pub fn from_reqwest(client: reqwest::Client) -> Self {
        Self { inner: client }
    }

    /// GET request returning the status code and the raw body
    ///
    /// Any status code is returned as `Ok`; only failures to get a response
    /// at all are errors.
    pub async fn get_raw(&self, url: &str) -> Response<RawResponse> {
        let url = url::Url::parse(url)?;
        tracing::trace!("GET {}", url);
        let response = self.inner.get(url).send().await?;
        RawResponse::read(response).await
    }
}

/// HTTP client builder for timeouts, connection reuse and proxy settings
#[derive(Debug, Default)]
pub struct HttpClientBuilder {
    read_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
    connect_timeout: Option<Duration>,
    user_agent: Option<String>,
    disable_keep_alive: bool,
    proxy: Option<url::Url>,
}

impl HttpClientBuilder {
    /// Maximum time to wait for a whole response
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// How long an idle pooled connection is kept open
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Maximum time to establish a connection
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// User agent sent with every request
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Never keep connections around between requests
    pub fn disable_keep_alive(mut self, disable: bool) -> Self {
        self.disable_keep_alive = disable;
        self
    }

    /// Route every request through a proxy
    pub fn proxy(mut self, url: url::Url) -> Self {
        self.proxy = Some(url);
        self
    }

    /// Build the HTTP client
    pub fn build(self) -> Response<HttpClient> {
        let mut builder = reqwest::Client::builder();

        if let Some(timeout) = self.read_timeout {
            builder = builder.timeout(timeout);
        }

        if let Some(timeout) = self.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }

        if self.disable_keep_alive {
            builder = builder.pool_max_idle_per_host(0);
        } else if let Some(timeout) = self.idle_timeout {
            builder = builder.pool_idle_timeout(timeout);
        }

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(proxy_url) = self.proxy {
            let proxy =
                reqwest::Proxy::all(proxy_url.as_str()).map_err(|e| HttpError::Build(e.to_string()))?;
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(HttpError::from)?;
        Ok(HttpClient { inner: client })
    }
}
