//! Per-origin subscription state

use pubnub_common::target::is_wildcard;
use pubnub_common::{TargetKind, Timetoken};

/// Subscription targets grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Targets {
    /// Plain channels
    pub channels: Vec<String>,
    /// Channel groups
    pub channel_groups: Vec<String>,
    /// Wildcard patterns
    pub wildcards: Vec<String>,
}

impl Targets {
    /// Add a channel; wildcard patterns are filed as wildcards
    pub fn channel(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        if is_wildcard(&name) {
            self.wildcards.push(name);
        } else {
            self.channels.push(name);
        }
        self
    }

    /// Add a channel group
    pub fn channel_group(mut self, name: impl Into<String>) -> Self {
        self.channel_groups.push(name.into());
        self
    }

    /// Add a target of the given kind
    pub fn push(&mut self, kind: TargetKind, name: String) {
        self.names_mut(kind).push(name);
    }

    /// Names of one kind
    pub fn names(&self, kind: TargetKind) -> &[String] {
        match kind {
            TargetKind::Channel => &self.channels,
            TargetKind::ChannelGroup => &self.channel_groups,
            TargetKind::Wildcard => &self.wildcards,
        }
    }

    fn names_mut(&mut self, kind: TargetKind) -> &mut Vec<String> {
        match kind {
            TargetKind::Channel => &mut self.channels,
            TargetKind::ChannelGroup => &mut self.channel_groups,
            TargetKind::Wildcard => &mut self.wildcards,
        }
    }

    /// Whether a target is listed
    pub fn contains(&self, kind: TargetKind, name: &str) -> bool {
        self.names(kind).iter().any(|n| n == name)
    }

    /// Every target with its kind
    pub fn iter(&self) -> impl Iterator<Item = (TargetKind, &str)> {
        self.channels
            .iter()
            .map(|n| (TargetKind::Channel, n.as_str()))
            .chain(
                self.channel_groups
                    .iter()
                    .map(|n| (TargetKind::ChannelGroup, n.as_str())),
            )
            .chain(
                self.wildcards
                    .iter()
                    .map(|n| (TargetKind::Wildcard, n.as_str())),
            )
    }

    /// Whether no target is listed
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty() && self.channel_groups.is_empty() && self.wildcards.is_empty()
    }

    /// Channel and wildcard names, in the order the subscribe path lists them
    pub fn path_names(&self) -> Vec<String> {
        self.channels
            .iter()
            .chain(self.wildcards.iter())
            .cloned()
            .collect()
    }
}

/// Subscription state of one origin
#[derive(Debug, Clone, Default)]
pub struct SubscriptionState {
    targets: Targets,
    cursor: Timetoken,
}

impl SubscriptionState {
    /// Subscribed targets
    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Current cursor
    pub fn cursor(&self) -> Timetoken {
        self.cursor
    }

    /// Whether a target is subscribed
    pub fn contains(&self, kind: TargetKind, name: &str) -> bool {
        self.targets.contains(kind, name)
    }

    /// Add a target, returns false if it was already present
    pub fn insert(&mut self, kind: TargetKind, name: &str) -> bool {
        if self.contains(kind, name) {
            return false;
        }
        self.targets.push(kind, name.to_owned());
        true
    }

    /// Remove a target, returns false if it was not present
    pub fn remove(&mut self, kind: TargetKind, name: &str) -> bool {
        let names = self.targets.names_mut(kind);
        let before = names.len();
        names.retain(|n| n != name);
        names.len() != before
    }

    /// Whether nothing is subscribed
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Adopt a cursor if it moves forward
    ///
    /// Cursor-only updates are also adopted when they repeat the current
    /// value, but nothing moves the cursor backwards.
    pub fn adopt_cursor(&mut self, cursor: Timetoken, forced: bool) -> bool {
        adopt(&mut self.cursor, cursor, forced)
    }

    /// Fold another origin's state into this one
    pub fn absorb(&mut self, other: SubscriptionState) {
        for (kind, name) in other.targets.iter() {
            self.insert(kind, name);
        }
        self.cursor = self.cursor.max(other.cursor);
    }
}

/// Cursor adoption rule shared by live and synchronous subscribes
pub(crate) fn adopt(current: &mut Timetoken, candidate: Timetoken, forced: bool) -> bool {
    if candidate > *current || (forced && candidate == *current) {
        *current = candidate;
        true
    } else {
        false
    }
}
