//! Subscribe multiplexer
//!
//! Every origin with a live subscription runs one long-poll loop. The loop
//! reads the origin's targets and cursor, sends a single subscribe request
//! for all of them, splits the batched answer into envelopes, advances the
//! cursor and routes each envelope to the callbacks of its target before
//! issuing the next poll. Cycles of one origin never overlap: a restarted
//! loop waits for the cycle in progress to finish dispatching.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use pubnub_common::{Cryptor, Envelope, EnvelopeBuilder, Timetoken};
use pubnub_http::ConnectionPurpose;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::instrument;

use crate::config::Config;
use crate::error::{require_runtime, Error};
use crate::origin::SubscriptionRestart;
use crate::request::one_shot::OneShot;
use crate::request::endpoints::{self, SubscribeParams};
use crate::request::{ClassifiedResponse, RequestEngine, RequestSpec, RequestStrategy};
use crate::router::{invoke, CallbackRouter, Callbacks};

mod demux;
mod presence;
mod state;

use demux::Decryption;
pub use presence::heartbeat_interval;
pub use state::{SubscriptionState, Targets};

/// Settings of the subscribe loops
#[derive(Debug, Clone)]
pub struct SubscribeSettings {
    /// Subscribe key
    pub subscribe_key: String,
    /// Presence heartbeat sent with every poll
    pub heartbeat: Option<u64>,
    /// Presence state per origin
    pub state: HashMap<String, Value>,
    /// Cipher key for payload decryption
    pub cipher_key: Option<String>,
    /// Pause after a cycle that ended in an error envelope
    pub retries_interval: Duration,
}

impl From<&Config> for SubscribeSettings {
    fn from(config: &Config) -> Self {
        Self {
            subscribe_key: config.subscribe_key.clone(),
            heartbeat: config.heartbeat,
            state: config.state.clone(),
            cipher_key: config.cipher_key.clone(),
            retries_interval: config.retries_interval(),
        }
    }
}

#[derive(Debug)]
struct LoopHandle {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Subscribe multiplexer
#[derive(Debug)]
pub struct SubscribeMultiplexer {
    engine: Arc<RequestEngine>,
    router: Arc<CallbackRouter>,
    cryptor: Option<Arc<dyn Cryptor>>,
    settings: SubscribeSettings,
    states: RwLock<HashMap<String, SubscriptionState>>,
    loops: Mutex<HashMap<String, LoopHandle>>,
    respirators: Mutex<HashMap<String, JoinHandle<()>>>,
    sync_cursors: Mutex<HashMap<String, Timetoken>>,
    cycle_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
    generation: AtomicU64,
    this: Weak<Self>,
}

impl SubscribeMultiplexer {
    /// Create a multiplexer
    pub fn new(
        engine: Arc<RequestEngine>,
        router: Arc<CallbackRouter>,
        cryptor: Option<Arc<dyn Cryptor>>,
        settings: SubscribeSettings,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            engine,
            router,
            cryptor,
            settings,
            states: RwLock::new(HashMap::new()),
            loops: Mutex::new(HashMap::new()),
            respirators: Mutex::new(HashMap::new()),
            sync_cursors: Mutex::new(HashMap::new()),
            cycle_locks: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
            this: this.clone(),
        })
    }

    fn decryption(&self) -> Option<Decryption<'_>> {
        match (&self.cryptor, &self.settings.cipher_key) {
            (Some(cryptor), Some(cipher_key)) => Some(Decryption {
                cryptor: cryptor.as_ref(),
                cipher_key,
            }),
            _ => None,
        }
    }

    /// Add targets to an origin's subscription and (re)start its loop
    ///
    /// Targets already subscribed on any origin are dropped from the request
    /// and logged. Returns false when nothing was left to subscribe. The
    /// loop is a tokio task, so a runtime must be running.
    #[instrument(skip(self, callbacks))]
    pub fn subscribe(
        &self,
        origin: &str,
        targets: Targets,
        callbacks: Callbacks,
    ) -> Result<bool, Error> {
        require_runtime("subscribe")?;

        let accepted = {
            let mut states = self.states.write();
            let mut accepted = Targets::default();

            for (kind, name) in targets.iter() {
                let taken = states.values().any(|state| state.contains(kind, name))
                    || accepted.contains(kind, name);
                if taken {
                    tracing::error!(
                        "Already subscribed to {} {}, you have to leave that {} first",
                        kind,
                        name,
                        kind
                    );
                    continue;
                }
                accepted.push(kind, name.to_owned());
            }

            if accepted.is_empty() {
                return Ok(false);
            }

            let state = states.entry(origin.to_owned()).or_default();
            for (kind, name) in accepted.iter() {
                state.insert(kind, name);
            }
            accepted
        };

        for (kind, name) in accepted.iter() {
            self.router.register(origin, kind, name, &callbacks);
        }
        self.router
            .register_origin_error(origin, callbacks.error.clone());

        self.restart_loop(origin);
        self.ensure_respirator(origin);
        Ok(true)
    }

    /// Remove targets from whichever origin holds them
    ///
    /// Origins left without targets are torn down: loop stopped, pooled
    /// connection closed, cursor and callbacks dropped. Returns the removed
    /// targets per origin.
    #[instrument(skip(self))]
    pub fn unsubscribe(&self, targets: &Targets) -> HashMap<String, Targets> {
        let mut removed: HashMap<String, Targets> = HashMap::new();
        let mut emptied = Vec::new();

        {
            let mut states = self.states.write();
            for (kind, name) in targets.iter() {
                let owner = states
                    .iter_mut()
                    .find(|(_, state)| state.contains(kind, name));
                match owner {
                    Some((origin, state)) => {
                        state.remove(kind, name);
                        removed
                            .entry(origin.clone())
                            .or_default()
                            .push(kind, name.to_owned());
                    }
                    None => tracing::warn!("Not subscribed to {} {}", kind, name),
                }
            }

            for origin in removed.keys() {
                if states.get(origin).is_some_and(SubscriptionState::is_empty) {
                    states.remove(origin);
                    emptied.push(origin.clone());
                }
            }
        }

        for (origin, targets) in &removed {
            for (kind, name) in targets.iter() {
                self.router.unregister(origin, kind, name);
            }

            if emptied.contains(origin) {
                self.teardown(origin);
            } else {
                self.restart_loop(origin);
            }
        }

        removed
    }

    /// Run a single poll for `targets` without registering them
    ///
    /// The cursor is kept per origin, separately from live subscriptions.
    /// With a presence heartbeat configured the poll is preceded by a
    /// heartbeat, and followed by a leave for the channels that are not part
    /// of the origin's live subscription.
    pub async fn subscribe_once(
        &self,
        origin: &str,
        targets: Targets,
        callbacks: Callbacks,
    ) -> Result<Vec<Envelope>, Error> {
        let names = targets.path_names();

        if let Some(heartbeat) = self.settings.heartbeat {
            let spec = endpoints::heartbeat(
                origin,
                &self.settings.subscribe_key,
                &names,
                &targets.channel_groups,
                heartbeat,
                self.settings.state.get(origin),
            );
            self.best_effort(&spec).await;
        }

        let cursor = self
            .sync_cursors
            .lock()
            .get(origin)
            .copied()
            .unwrap_or_default();
        let spec = self.request_for(origin, &targets, cursor);
        let cycle = SubscribeCycle {
            mux: self,
            origin,
            targets,
            delivery: Delivery::Once(callbacks),
        };
        let result = self.engine.execute(&spec, &cycle).await;

        if self.settings.heartbeat.is_some() {
            let live = self.targets(origin).unwrap_or_default();
            let stray: Vec<String> = names
                .into_iter()
                .filter(|name| !live.channels.contains(name) && !live.wildcards.contains(name))
                .collect();

            if !stray.is_empty() {
                let spec = endpoints::leave(origin, &self.settings.subscribe_key, &stray, &[]);
                self.best_effort(&spec).await;
            }
        }

        result
    }

    /// Presence request whose outcome is only logged
    async fn best_effort(&self, spec: &RequestSpec) {
        let strategy = OneShot::new(spec.kind(), None);
        match self.engine.execute(spec, &strategy).await {
            Ok(envelopes) => {
                if let Some(error) = envelopes.first().and_then(|e| e.error()) {
                    tracing::warn!("{} on {} rejected: {}", spec.kind(), spec.origin(), error);
                }
            }
            Err(err) => tracing::warn!("{} on {} failed: {}", spec.kind(), spec.origin(), err),
        }
    }

    fn request_for(&self, origin: &str, targets: &Targets, cursor: Timetoken) -> RequestSpec {
        let names = targets.path_names();
        endpoints::subscribe(
            origin,
            &self.settings.subscribe_key,
            SubscribeParams {
                names: &names,
                groups: &targets.channel_groups,
                cursor,
                heartbeat: self.settings.heartbeat,
                state: self.settings.state.get(origin),
            },
        )
    }

    fn next_request(&self, origin: &str) -> Option<(RequestSpec, Targets)> {
        let states = self.states.read();
        let state = states.get(origin).filter(|state| !state.is_empty())?;
        let targets = state.targets().clone();
        Some((self.request_for(origin, &targets, state.cursor()), targets))
    }

    fn cycle_lock(&self, origin: &str) -> Arc<tokio::sync::Mutex<()>> {
        self.cycle_locks
            .lock()
            .entry(origin.to_owned())
            .or_default()
            .clone()
    }

    fn is_current(&self, origin: &str, generation: u64) -> bool {
        self.loops
            .lock()
            .get(origin)
            .is_some_and(|running| running.generation == generation)
    }

    async fn run_loop(self: Arc<Self>, origin: String, generation: u64) {
        tracing::debug!("Starting subscribe loop on {}", origin);
        let cycle_lock = self.cycle_lock(&origin);

        loop {
            // held from send to the last dispatched callback
            let failed = {
                let _cycle = cycle_lock.lock().await;
                if !self.is_current(&origin, generation) {
                    break;
                }
                let Some((spec, targets)) = self.next_request(&origin) else {
                    break;
                };

                let cycle = SubscribeCycle {
                    mux: &self,
                    origin: &origin,
                    targets,
                    delivery: Delivery::Live,
                };

                match self.engine.execute(&spec, &cycle).await {
                    Ok(envelopes) => envelopes.first().is_some_and(|e| e.error().is_some()),
                    Err(err) => {
                        tracing::error!("Subscribe loop on {} aborted: {}", origin, err);
                        break;
                    }
                }
            };

            if failed {
                tokio::time::sleep(self.settings.retries_interval).await;
            }
        }

        tracing::debug!("Subscribe loop on {} finished", origin);
        let mut loops = self.loops.lock();
        if loops
            .get(&origin)
            .is_some_and(|running| running.generation == generation)
        {
            loops.remove(&origin);
        }
    }

    fn restart_loop(&self, origin: &str) {
        let Some(this) = self.this.upgrade() else {
            return;
        };

        // registered before the task can check its generation
        let previous = {
            let mut loops = self.loops.lock();
            let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
            let handle = tokio::spawn(this.run_loop(origin.to_owned(), generation));
            loops.insert(origin.to_owned(), LoopHandle { generation, handle })
        };

        if let Some(previous) = previous {
            tracing::debug!("Restarting subscribe loop on {}", origin);
            previous.handle.abort();
        }
    }

    fn ensure_respirator(&self, origin: &str) {
        let Some(heartbeat) = self.settings.heartbeat else {
            return;
        };

        let mut respirators = self.respirators.lock();
        if respirators
            .get(origin)
            .is_some_and(|handle| !handle.is_finished())
        {
            return;
        }

        let handle = tokio::spawn(presence::respirate(
            self.this.clone(),
            origin.to_owned(),
            heartbeat,
        ));
        respirators.insert(origin.to_owned(), handle);
    }

    /// Stop the tasks of an origin and close its subscribe connection
    fn stop_origin(&self, origin: &str) {
        if let Some(running) = self.loops.lock().remove(origin) {
            running.handle.abort();
        }
        if let Some(handle) = self.respirators.lock().remove(origin) {
            handle.abort();
        }
        self.engine
            .transport()
            .shutdown(origin, ConnectionPurpose::Subscribe);
    }

    fn teardown(&self, origin: &str) {
        tracing::debug!("No targets left on {}, closing subscription", origin);
        self.stop_origin(origin);
        self.router.clear_origin(origin);
        self.sync_cursors.lock().remove(origin);
    }

    /// Stop every loop and forget every subscription
    pub fn shutdown(&self) {
        for (_, running) in self.loops.lock().drain() {
            running.handle.abort();
        }
        for (_, handle) in self.respirators.lock().drain() {
            handle.abort();
        }
        self.states.write().clear();
        self.sync_cursors.lock().clear();
        self.router.clear();
    }

    /// Current cursor of an origin's live subscription
    pub fn cursor(&self, origin: &str) -> Option<Timetoken> {
        self.states.read().get(origin).map(SubscriptionState::cursor)
    }

    /// Cursor of synchronous subscribes on an origin
    pub fn sync_cursor(&self, origin: &str) -> Option<Timetoken> {
        self.sync_cursors.lock().get(origin).copied()
    }

    /// Targets subscribed on an origin
    pub fn targets(&self, origin: &str) -> Option<Targets> {
        self.states
            .read()
            .get(origin)
            .map(|state| state.targets().clone())
    }

    /// Origins with a live subscription
    pub fn origins(&self) -> Vec<String> {
        self.states.read().keys().cloned().collect()
    }

    /// Whether an origin's long-poll loop is running
    pub fn is_running(&self, origin: &str) -> bool {
        self.loops
            .lock()
            .get(origin)
            .is_some_and(|running| !running.handle.is_finished())
    }
}

impl SubscriptionRestart for SubscribeMultiplexer {
    fn restart_subscription(&self, from: &str, to: &str) {
        if from != to {
            {
                let mut cursors = self.sync_cursors.lock();
                if let Some(cursor) = cursors.remove(from) {
                    let target = cursors.entry(to.to_owned()).or_default();
                    *target = (*target).max(cursor);
                }
            }

            let moved = {
                let mut states = self.states.write();
                match states.remove(from) {
                    Some(state) => {
                        states.entry(to.to_owned()).or_default().absorb(state);
                        true
                    }
                    None => false,
                }
            };

            if moved {
                self.stop_origin(from);
                self.router.move_origin(from, to);
            }
        }

        if self.states.read().contains_key(to) {
            tracing::warn!("Restarting subscription on {} (was {})", to, from);
            self.restart_loop(to);
            self.ensure_respirator(to);
        }
    }
}

enum Delivery {
    /// Registered subscription: cursor kept in the origin state, envelopes
    /// routed through the registry
    Live,
    /// Single poll: own cursor, envelopes handed to the given callbacks
    Once(Callbacks),
}

struct SubscribeCycle<'a> {
    mux: &'a SubscribeMultiplexer,
    origin: &'a str,
    targets: Targets,
    delivery: Delivery,
}

impl RequestStrategy for SubscribeCycle<'_> {
    fn purpose(&self) -> ConnectionPurpose {
        ConnectionPurpose::Subscribe
    }

    fn target_envelope(&self) -> EnvelopeBuilder {
        demux::target_envelope(&self.targets)
    }

    fn demultiplex(&self, response: &ClassifiedResponse<'_>) -> Vec<EnvelopeBuilder> {
        demux::demultiplex(
            response.json(),
            response.is_error(),
            &self.targets,
            self.mux.decryption(),
        )
    }

    fn update_cursor(&self, envelopes: &[Envelope]) {
        let Some(envelope) = envelopes.first().filter(|e| e.error().is_none()) else {
            return;
        };
        let Some(cursor) = envelope.timetoken() else {
            return;
        };
        let forced = envelope.is_timetoken_update();

        let adopted = match self.delivery {
            Delivery::Live => self
                .mux
                .states
                .write()
                .get_mut(self.origin)
                .is_some_and(|state| state.adopt_cursor(cursor, forced)),
            Delivery::Once(_) => {
                let mut cursors = self.mux.sync_cursors.lock();
                state::adopt(
                    cursors.entry(self.origin.to_owned()).or_default(),
                    cursor,
                    forced,
                )
            }
        };

        if adopted {
            tracing::debug!("Cursor on {} is now {}", self.origin, cursor);
        }
    }

    fn dispatch(&self, envelopes: &[Envelope]) {
        match &self.delivery {
            Delivery::Live => {
                for envelope in envelopes {
                    self.mux.router.dispatch(self.origin, envelope);
                }
            }
            Delivery::Once(callbacks) => {
                for envelope in envelopes {
                    let callback = if envelope.error().is_some() {
                        callbacks.error.as_ref()
                    } else if envelope.is_timetoken_update() {
                        None
                    } else {
                        callbacks.message.as_ref()
                    };

                    if let Some(callback) = callback {
                        invoke(callback, envelope);
                    }
                }
            }
        }
    }
}
