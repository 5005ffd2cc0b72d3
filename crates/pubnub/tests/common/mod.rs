#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use pubnub::{
    Client, Config, ConnectionPurpose, Envelope, HttpError, RawResponse, Transport,
};
use url::Url;

/// Scripted reply
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(u16, String),
    Fail,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self::Respond(200, body.to_string())
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self::Respond(status, body.to_string())
    }
}

/// In-memory transport answering from per-endpoint scripts
///
/// Subscribe requests without a scripted reply never complete, like an idle
/// long-poll. Time requests default to a valid timetoken and every other
/// endpoint to a generic success body. Origins marked down fail every
/// request at connection level.
#[derive(Debug, Default)]
pub struct MockTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    down: Mutex<HashSet<String>>,
    sent: Mutex<Vec<(String, Url)>>,
    closed: Mutex<Vec<(String, ConnectionPurpose)>>,
}

fn endpoint(url: &Url) -> String {
    let segments: Vec<&str> = url.path_segments().map(|s| s.collect()).unwrap_or_default();
    match segments.first() {
        Some(&"v2") => segments.last().copied().unwrap_or_default().to_string(),
        Some(first) => first.to_string(),
        None => String::new(),
    }
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, endpoint: &str, reply: Reply) {
        self.replies
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn set_down(&self, origin: &str, down: bool) {
        let mut set = self.down.lock();
        if down {
            set.insert(origin.to_string());
        } else {
            set.remove(origin);
        }
    }

    /// Urls sent to an endpoint, in order
    pub fn sent(&self, endpoint_name: &str) -> Vec<(String, Url)> {
        self.sent
            .lock()
            .iter()
            .filter(|(_, url)| endpoint(url) == endpoint_name)
            .cloned()
            .collect()
    }

    /// Endpoint of every request, in the order they were sent
    pub fn endpoints(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, url)| endpoint(url)).collect()
    }

    pub fn closed(&self) -> Vec<(String, ConnectionPurpose)> {
        self.closed.lock().clone()
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        origin: &str,
        url: Url,
        _purpose: ConnectionPurpose,
    ) -> Result<RawResponse, HttpError> {
        let name = endpoint(&url);
        self.sent.lock().push((origin.to_string(), url));

        if self.down.lock().contains(origin) {
            return Err(HttpError::Connection(format!("{} is down", origin)));
        }

        let reply = self
            .replies
            .lock()
            .get_mut(&name)
            .and_then(VecDeque::pop_front);

        match reply {
            Some(Reply::Respond(status, body)) => Ok(RawResponse::new(status, body)),
            Some(Reply::Fail) => Err(HttpError::Connection("scripted failure".to_string())),
            None if name == "subscribe" => futures::future::pending().await,
            None if name == "time" => Ok(RawResponse::new(200, "[14600000000000000]")),
            None => Ok(RawResponse::new(200, r#"{"status":200,"message":"OK"}"#)),
        }
    }

    fn shutdown(&self, origin: &str, purpose: ConnectionPurpose) {
        self.closed.lock().push((origin.to_string(), purpose));
    }

    fn shutdown_all(&self) {}
}

/// Configuration with fast retries
pub fn config() -> Config {
    let mut config = Config::new("sub-c");
    config.publish_key = Some("pub-c".to_string());
    config.uuid = Some("tester".to_string());
    config.origins = vec!["a.example".to_string()];
    config.max_retries = 2;
    config.retries_interval = 1;
    config
}

pub fn client(config: Config, transport: &Arc<MockTransport>) -> Client {
    Client::builder(config)
        .transport(transport.clone())
        .build()
        .expect("valid client")
}

/// Collects envelopes handed to a callback
#[derive(Debug, Clone, Default)]
pub struct Collector {
    envelopes: Arc<Mutex<Vec<Envelope>>>,
    calls: Arc<AtomicUsize>,
}

impl Collector {
    pub fn callback(&self) -> impl Fn(&Envelope) + Send + Sync + 'static {
        let envelopes = self.envelopes.clone();
        let calls = self.calls.clone();
        move |envelope| {
            calls.fetch_add(1, Ordering::SeqCst);
            envelopes.lock().push(envelope.clone());
        }
    }

    pub fn envelopes(&self) -> Vec<Envelope> {
        self.envelopes.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Let spawned tasks run; with paused time this also fires due timers
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn query(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}
