//! Origin pool and health manager
//!
//! The manager runs two timers. The liveness check watches the active
//! origin and moves it to the dead list after repeated failures. The
//! failback check watches the most recently dead origin and puts it back at
//! the head of the pool once it answers again. Both transitions restart the
//! subscription on the new active origin.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use pubnub_common::parser::is_valid_json;
use pubnub_http::ConnectionPurpose;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use url::Url;

use crate::config::Config;
use crate::router::panic_reason;
use crate::transport::Transport;

/// Subscription restart hook, called when the active origin changes
pub trait SubscriptionRestart: Send + Sync {
    /// Move the subscription of `from` to `to` and restart its loop
    fn restart_subscription(&self, from: &str, to: &str);
}

#[derive(Debug, Default)]
struct PoolLists {
    live: Vec<String>,
    dead: Vec<String>,
}

/// Live and dead origins
///
/// Both lists sit behind one lock so every transition is a single step and
/// an origin is never in both lists.
#[derive(Debug, Default)]
pub struct OriginPool {
    lists: Mutex<PoolLists>,
}

impl OriginPool {
    /// Pool with every origin live, in order
    pub fn new<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut live: Vec<String> = Vec::new();
        for origin in origins {
            let origin = origin.into();
            if !live.contains(&origin) {
                live.push(origin);
            }
        }

        Self {
            lists: Mutex::new(PoolLists {
                live,
                dead: Vec::new(),
            }),
        }
    }

    /// Active origin
    pub fn active(&self) -> Option<String> {
        self.lists.lock().live.first().cloned()
    }

    /// Live origins, active first
    pub fn live(&self) -> Vec<String> {
        self.lists.lock().live.clone()
    }

    /// Dead origins, most recent last
    pub fn dead(&self) -> Vec<String> {
        self.lists.lock().dead.clone()
    }

    /// Most recently dead origin
    pub fn last_dead(&self) -> Option<String> {
        self.lists.lock().dead.last().cloned()
    }

    /// Move a live origin to the dead list
    pub fn mark_offline(&self, origin: &str) -> bool {
        let mut lists = self.lists.lock();
        let Some(position) = lists.live.iter().position(|o| o == origin) else {
            return false;
        };
        let origin = lists.live.remove(position);
        lists.dead.push(origin);
        true
    }

    /// Move a dead origin to the head of the live pool
    pub fn mark_online(&self, origin: &str) -> bool {
        let mut lists = self.lists.lock();
        let Some(position) = lists.dead.iter().position(|o| o == origin) else {
            return false;
        };
        let origin = lists.dead.remove(position);
        lists.live.insert(0, origin);
        true
    }
}

/// Ping settings
#[derive(Debug, Clone)]
pub struct OriginManagerSettings {
    /// Url scheme
    pub scheme: &'static str,
    /// Delay between pings
    pub interval: Duration,
    /// Consecutive failures before failover, and successes before failback
    pub max_retries: u32,
}

impl From<&Config> for OriginManagerSettings {
    fn from(config: &Config) -> Self {
        Self {
            scheme: config.scheme(),
            interval: config.origin_heartbeat_interval(),
            max_retries: config.origin_heartbeat_max_retries.max(1),
        }
    }
}

/// Origin health manager
pub struct OriginManager {
    pool: Arc<OriginPool>,
    transport: Arc<dyn Transport>,
    restart: Arc<dyn SubscriptionRestart>,
    settings: OriginManagerSettings,
    liveness: Mutex<Option<JoinHandle<()>>>,
    failback: Mutex<Option<JoinHandle<()>>>,
    last_liveness_ping: Mutex<Option<Instant>>,
    last_failback_ping: Mutex<Option<Instant>>,
    this: Weak<Self>,
}

impl fmt::Debug for OriginManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OriginManager")
            .field("pool", &self.pool)
            .field("settings", &self.settings)
            .field("liveness_running", &self.is_liveness_running())
            .field("failback_running", &self.is_failback_running())
            .finish()
    }
}

impl OriginManager {
    /// Create a stopped manager
    pub fn new(
        pool: Arc<OriginPool>,
        transport: Arc<dyn Transport>,
        restart: Arc<dyn SubscriptionRestart>,
        settings: OriginManagerSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            pool,
            transport,
            restart,
            settings,
            liveness: Mutex::new(None),
            failback: Mutex::new(None),
            last_liveness_ping: Mutex::new(None),
            last_failback_ping: Mutex::new(None),
            this: this.clone(),
        })
    }

    /// Origin pool
    pub fn pool(&self) -> &Arc<OriginPool> {
        &self.pool
    }

    /// When the last liveness ping started
    pub fn last_liveness_ping(&self) -> Option<Instant> {
        *self.last_liveness_ping.lock()
    }

    /// When the last failback ping started
    pub fn last_failback_ping(&self) -> Option<Instant> {
        *self.last_failback_ping.lock()
    }

    /// Whether the liveness timer is running
    pub fn is_liveness_running(&self) -> bool {
        is_running(&self.liveness)
    }

    /// Whether the failback timer is running
    pub fn is_failback_running(&self) -> bool {
        is_running(&self.failback)
    }

    /// Start the liveness timer
    pub fn start(&self) {
        let mut liveness = self.liveness.lock();
        if liveness.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        tracing::debug!("Starting origin liveness check");
        *liveness = Some(tokio::spawn(run_liveness(
            self.this.clone(),
            self.settings.interval,
        )));
    }

    fn start_failback(&self) {
        let mut failback = self.failback.lock();
        if failback.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }
        tracing::debug!("Starting origin failback check");
        *failback = Some(tokio::spawn(run_failback(
            self.this.clone(),
            self.settings.interval,
        )));
    }

    /// Stop both timers
    pub fn stop(&self) {
        for slot in [&self.liveness, &self.failback] {
            if let Some(handle) = slot.lock().take() {
                handle.abort();
            }
        }
    }

    /// Whether an origin answers `/time/0` with a success status and JSON
    pub async fn ping(&self, origin: &str) -> bool {
        let url = match Url::parse(&format!("{}://{}/time/0", self.settings.scheme, origin)) {
            Ok(url) => url,
            Err(err) => {
                tracing::error!("Cannot ping {}: {}", origin, err);
                return false;
            }
        };

        match self
            .transport
            .send(origin, url, ConnectionPurpose::OneShot)
            .await
        {
            Ok(response) => response.is_success() && is_valid_json(response.body()),
            Err(err) => {
                tracing::debug!("Ping of {} failed: {}", origin, err);
                false
            }
        }
    }

    async fn liveness_tick(&self, failures: &mut u32) {
        *self.last_liveness_ping.lock() = Some(Instant::now());

        let Some(origin) = self.pool.active() else {
            return;
        };

        if self.ping(&origin).await {
            *failures = 0;
            return;
        }

        *failures += 1;
        tracing::warn!(
            "Origin {} failed liveness ping ({}/{})",
            origin,
            failures,
            self.settings.max_retries
        );

        if *failures < self.settings.max_retries {
            return;
        }
        *failures = 0;

        if self.pool.mark_offline(&origin) {
            let next = self.pool.active();
            tracing::warn!("Origin {} is offline, failing over to {:?}", origin, next);
            if let Some(next) = next {
                self.restart.restart_subscription(&origin, &next);
            }
            self.start_failback();
        }
    }

    /// Returns false once there is nothing left to fail back
    async fn failback_tick(&self, successes: &mut u32) -> bool {
        *self.last_failback_ping.lock() = Some(Instant::now());

        let Some(origin) = self.pool.last_dead() else {
            return false;
        };

        if !self.ping(&origin).await {
            *successes = 0;
            return true;
        }

        *successes += 1;
        if *successes < self.settings.max_retries {
            return true;
        }
        *successes = 0;

        let previous = self.pool.active();
        if self.pool.mark_online(&origin) {
            tracing::warn!("Origin {} is back online", origin);
            let previous = previous.unwrap_or_else(|| origin.clone());
            self.restart.restart_subscription(&previous, &origin);
        }

        !self.pool.dead().is_empty()
    }
}

fn is_running(slot: &Mutex<Option<JoinHandle<()>>>) -> bool {
    slot.lock().as_ref().is_some_and(|h| !h.is_finished())
}

fn interval(period: Duration) -> tokio::time::Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

async fn run_liveness(manager: Weak<OriginManager>, period: Duration) {
    let mut timer = interval(period);
    let mut failures = 0;

    loop {
        timer.tick().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };

        if let Err(panic) = AssertUnwindSafe(manager.liveness_tick(&mut failures))
            .catch_unwind()
            .await
        {
            tracing::error!("Liveness check failed: {}", panic_reason(panic.as_ref()));
        }
    }
}

async fn run_failback(manager: Weak<OriginManager>, period: Duration) {
    let mut timer = interval(period);
    let mut successes = 0;

    loop {
        timer.tick().await;
        let Some(manager) = manager.upgrade() else {
            break;
        };

        match AssertUnwindSafe(manager.failback_tick(&mut successes))
            .catch_unwind()
            .await
        {
            Ok(true) => {}
            Ok(false) => break,
            Err(panic) => {
                tracing::error!("Failback check failed: {}", panic_reason(panic.as_ref()));
            }
        }
    }

    tracing::debug!("Origin failback check stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_transitions() {
        let pool = OriginPool::new(["a", "b", "c", "a"]);
        assert_eq!(pool.live(), vec!["a", "b", "c"]);
        assert_eq!(pool.active().as_deref(), Some("a"));

        assert!(pool.mark_offline("a"));
        assert!(!pool.mark_offline("a"));
        assert_eq!(pool.active().as_deref(), Some("b"));
        assert_eq!(pool.dead(), vec!["a"]);

        assert!(pool.mark_offline("c"));
        assert_eq!(pool.last_dead().as_deref(), Some("c"));

        assert!(pool.mark_online("c"));
        assert_eq!(pool.live(), vec!["c", "b"]);
        assert_eq!(pool.dead(), vec!["a"]);
        assert!(!pool.mark_online("b"));
    }

    #[test]
    fn test_pool_disjoint() {
        let pool = OriginPool::new(["a", "b"]);
        pool.mark_offline("a");
        pool.mark_offline("b");
        assert!(pool.active().is_none());
        assert!(pool.live().iter().all(|o| !pool.dead().contains(o)));
        assert_eq!(pool.dead().len(), 2);
    }

    #[test]
    fn test_settings_floor() {
        let mut config = Config::new("demo");
        config.origin_heartbeat_max_retries = 0;
        config.origin_heartbeat_interval = 0;
        let settings = OriginManagerSettings::from(&config);
        assert_eq!(settings.max_retries, 1);
        assert_eq!(settings.interval, Duration::from_secs(1));
    }
}
