//! Callback registry and envelope routing

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;
use pubnub_common::{Envelope, TargetKind};

/// Callback invoked with one envelope
pub type Callback = Arc<dyn Fn(&Envelope) + Send + Sync>;

/// Wrap a closure into a [`Callback`]
pub fn callback<F>(f: F) -> Callback
where
    F: Fn(&Envelope) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Run a callback, containing any panic it raises
pub(crate) fn invoke(callback: &Callback, envelope: &Envelope) -> bool {
    match catch_unwind(AssertUnwindSafe(|| callback(envelope))) {
        Ok(()) => true,
        Err(panic) => {
            tracing::error!(
                "Can't fire callback for {:?}: {}",
                envelope.channel().or(envelope.channel_group()),
                panic_reason(panic.as_ref())
            );
            false
        }
    }
}

/// Text of a panic payload
pub(crate) fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Callbacks registered for one target
#[derive(Clone, Default)]
pub struct Callbacks {
    /// Receives messages
    pub message: Option<Callback>,
    /// Receives presence events of wildcard subscriptions
    pub presence: Option<Callback>,
    /// Receives error envelopes
    pub error: Option<Callback>,
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("message", &self.message.is_some())
            .field("presence", &self.presence.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

impl Callbacks {
    /// Fill empty slots from `other`, keeping slots that are already set
    fn fill_from(&mut self, other: &Callbacks) {
        if self.message.is_none() {
            self.message = other.message.clone();
        }
        if self.presence.is_none() {
            self.presence = other.presence.clone();
        }
        if self.error.is_none() {
            self.error = other.error.clone();
        }
    }
}

type RegistryKey = (String, TargetKind, String);

/// Callback router
///
/// One flat registry keyed by (origin, target kind, target name). Slots are
/// filled on first registration and never overwritten by later ones.
#[derive(Debug, Default)]
pub struct CallbackRouter {
    entries: RwLock<HashMap<RegistryKey, Callbacks>>,
    origin_errors: RwLock<HashMap<String, Callbacks>>,
}

impl CallbackRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Register callbacks for a target
    pub fn register(&self, origin: &str, kind: TargetKind, name: &str, callbacks: &Callbacks) {
        self.entries
            .write()
            .entry((origin.to_owned(), kind, name.to_owned()))
            .or_default()
            .fill_from(callbacks);
    }

    /// Register the error callback used for failures that belong to no
    /// registered target
    pub fn register_origin_error(&self, origin: &str, error: Option<Callback>) {
        if let Some(error) = error {
            let mut origin_errors = self.origin_errors.write();
            let entry = origin_errors.entry(origin.to_owned()).or_default();
            if entry.error.is_none() {
                entry.error = Some(error);
            }
        }
    }

    /// Drop the callbacks of a target
    pub fn unregister(&self, origin: &str, kind: TargetKind, name: &str) {
        self.entries
            .write()
            .remove(&(origin.to_owned(), kind, name.to_owned()));
    }

    /// Callbacks of a target
    pub fn lookup(&self, origin: &str, kind: TargetKind, name: &str) -> Option<Callbacks> {
        self.entries
            .read()
            .get(&(origin.to_owned(), kind, name.to_owned()))
            .cloned()
    }

    /// Number of registered targets on an origin
    pub fn len_for(&self, origin: &str) -> usize {
        self.entries
            .read()
            .keys()
            .filter(|(o, _, _)| o == origin)
            .count()
    }

    /// Drop every registration of an origin
    pub fn clear_origin(&self, origin: &str) {
        self.entries.write().retain(|(o, _, _), _| o != origin);
        self.origin_errors.write().remove(origin);
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.entries.write().clear();
        self.origin_errors.write().clear();
    }

    /// Move every registration of `from` to `to`
    pub fn move_origin(&self, from: &str, to: &str) {
        if from == to {
            return;
        }

        {
            let mut entries = self.entries.write();
            let moved: Vec<_> = entries
                .keys()
                .filter(|(o, _, _)| o == from)
                .cloned()
                .collect();
            for key in moved {
                if let Some(callbacks) = entries.remove(&key) {
                    let (_, kind, name) = key;
                    entries
                        .entry((to.to_owned(), kind, name))
                        .or_default()
                        .fill_from(&callbacks);
                }
            }
        }

        let mut origin_errors = self.origin_errors.write();
        if let Some(callbacks) = origin_errors.remove(from) {
            origin_errors
                .entry(to.to_owned())
                .or_default()
                .fill_from(&callbacks);
        }
    }

    /// Route an envelope to the first matching target
    ///
    /// Order: channel group, plain channel, wildcard presence, wildcard.
    /// Cursor-only envelopes are skipped, error envelopes go to
    /// [`CallbackRouter::dispatch_error`]. Returns whether a callback ran.
    pub fn dispatch(&self, origin: &str, envelope: &Envelope) -> bool {
        if envelope.error().is_some() {
            return self.dispatch_error(origin, envelope);
        }
        if envelope.is_timetoken_update() {
            return false;
        }

        if let Some(group) = envelope.channel_group() {
            if let Some(callbacks) = self.lookup(origin, TargetKind::ChannelGroup, group) {
                return fire(callbacks.message.as_ref(), envelope);
            }
        }

        if let Some(channel) = envelope.channel() {
            if let Some(callbacks) = self.lookup(origin, TargetKind::Channel, channel) {
                return fire(callbacks.message.as_ref(), envelope);
            }
        }

        if let Some(wildcard) = envelope.wildcard_channel() {
            if let Some(callbacks) = self.lookup(origin, TargetKind::Wildcard, wildcard) {
                if envelope.is_presence() && callbacks.presence.is_some() {
                    return fire(callbacks.presence.as_ref(), envelope);
                }
                return fire(callbacks.message.as_ref(), envelope);
            }
        }

        tracing::debug!(
            "No callback registered on {} for {:?}",
            origin,
            envelope.channel()
        );
        false
    }

    /// Route an error envelope
    ///
    /// The group's error callback wins over the channel's, then the
    /// wildcard's, then the origin fallback.
    pub fn dispatch_error(&self, origin: &str, envelope: &Envelope) -> bool {
        let targets = [
            (TargetKind::ChannelGroup, envelope.channel_group()),
            (TargetKind::Channel, envelope.channel()),
            (TargetKind::Wildcard, envelope.wildcard_channel()),
        ];

        let error = targets
            .into_iter()
            .filter_map(|(kind, name)| name.and_then(|name| self.lookup(origin, kind, name)))
            .find_map(|callbacks| callbacks.error)
            .or_else(|| {
                self.origin_errors
                    .read()
                    .get(origin)
                    .and_then(|callbacks| callbacks.error.clone())
            });

        match error {
            Some(error) => invoke(&error, envelope),
            None => {
                tracing::warn!(
                    "Unhandled error on {}: {:?}",
                    origin,
                    envelope.error().map(|e| e.to_string())
                );
                false
            }
        }
    }
}

fn fire(callback: Option<&Callback>, envelope: &Envelope) -> bool {
    callback.is_some_and(|callback| invoke(callback, envelope))
}
