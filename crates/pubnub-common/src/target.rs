//! Subscription target naming rules

use std::fmt;

use serde::{Deserialize, Serialize};

/// Suffix marking a channel that carries presence events
pub const PRESENCE_SUFFIX: &str = "-pnpres";

/// Marker identifying a wildcard pattern inside a group identifier
///
/// This is a plain substring test, so a channel group whose literal name
/// contains `.*` is also treated as a wildcard.
pub const WILDCARD_MARKER: &str = ".*";

/// Kind of subscription target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetKind {
    /// Plain channel
    Channel,
    /// Server side channel group
    ChannelGroup,
    /// Wildcard channel pattern
    Wildcard,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel => write!(f, "channel"),
            Self::ChannelGroup => write!(f, "channel group"),
            Self::Wildcard => write!(f, "wildcard channel"),
        }
    }
}

/// Whether a name is a presence channel
pub fn is_presence(name: &str) -> bool {
    name.ends_with(PRESENCE_SUFFIX)
}

/// Whether a name is a wildcard pattern
pub fn is_wildcard(name: &str) -> bool {
    name.contains(WILDCARD_MARKER)
}

/// Split a comma joined list, dropping empty entries
pub fn split_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Join names with commas
pub fn join_names<I, S>(names: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|name| name.as_ref().to_owned())
        .collect::<Vec<_>>()
        .join(",")
}
