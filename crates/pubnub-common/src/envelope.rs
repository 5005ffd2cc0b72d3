//! Envelope
//!
//! An envelope is one delivered unit: a single message demultiplexed out of
//! a batched subscribe response, the single result of a one-shot request,
//! a cursor-only marker, or a synthetic error. Envelopes are built once and
//! never mutated afterwards.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ErrorRecord;
use crate::target::is_presence;

/// Subscribe cursor returned by the server
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timetoken(u64);

impl Timetoken {
    /// The initial cursor
    pub const ZERO: Timetoken = Timetoken(0);

    /// Create a timetoken
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Raw value
    pub fn value(&self) -> u64 {
        self.0
    }

    /// Read a timetoken from a JSON value, the server sends either a
    /// string or a number
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => s.parse().ok(),
            Value::Number(n) => n.as_u64().map(Self),
            _ => None,
        }
    }
}

impl From<u64> for Timetoken {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl FromStr for Timetoken {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}

impl fmt::Display for Timetoken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Envelope
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    channel: Option<String>,
    channel_group: Option<String>,
    wildcard_channel: Option<String>,
    message: Option<Value>,
    response: String,
    status: u16,
    timetoken: Option<Timetoken>,
    timetoken_update: bool,
    first: bool,
    last: bool,
    error: Option<ErrorRecord>,
}

impl Envelope {
    /// Start building an envelope
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Channel the message was published to
    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    /// Channel group the message was delivered through
    pub fn channel_group(&self) -> Option<&str> {
        self.channel_group.as_deref()
    }

    /// Wildcard pattern the message was delivered through
    pub fn wildcard_channel(&self) -> Option<&str> {
        self.wildcard_channel.as_deref()
    }

    /// Decoded payload, absent for cursor-only and error envelopes
    pub fn message(&self) -> Option<&Value> {
        self.message.as_ref()
    }

    /// Raw response body
    pub fn response(&self) -> &str {
        &self.response
    }

    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.status
    }

    /// Cursor carried by the response
    pub fn timetoken(&self) -> Option<Timetoken> {
        self.timetoken
    }

    /// True when this envelope only exists to advance the subscribe cursor
    pub fn is_timetoken_update(&self) -> bool {
        self.timetoken_update
    }

    /// First envelope of its batch
    pub fn is_first(&self) -> bool {
        self.first
    }

    /// Last envelope of its batch
    pub fn is_last(&self) -> bool {
        self.last
    }

    /// Error record, if the request failed
    pub fn error(&self) -> Option<&ErrorRecord> {
        self.error.as_ref()
    }

    /// Whether the envelope carries presence events
    pub fn is_presence(&self) -> bool {
        self.channel.as_deref().is_some_and(is_presence)
            || self.wildcard_channel.as_deref().is_some_and(is_presence)
    }
}

/// Envelope builder
#[derive(Debug, Clone, Default)]
pub struct EnvelopeBuilder {
    inner: EnvelopeParts,
}

#[derive(Debug, Clone, Default)]
struct EnvelopeParts {
    channel: Option<String>,
    channel_group: Option<String>,
    wildcard_channel: Option<String>,
    message: Option<Value>,
    response: String,
    status: u16,
    timetoken: Option<Timetoken>,
    timetoken_update: bool,
    first: bool,
    last: bool,
    error: Option<ErrorRecord>,
}

impl EnvelopeBuilder {
    /// Target channel
    pub fn channel(mut self, channel: Option<String>) -> Self {
        self.inner.channel = channel;
        self
    }

    /// Target channel group
    pub fn channel_group(mut self, channel_group: Option<String>) -> Self {
        self.inner.channel_group = channel_group;
        self
    }

    /// Target wildcard pattern
    pub fn wildcard_channel(mut self, wildcard_channel: Option<String>) -> Self {
        self.inner.wildcard_channel = wildcard_channel;
        self
    }

    /// Decoded payload
    pub fn message(mut self, message: Value) -> Self {
        self.inner.message = Some(message);
        self
    }

    /// Cursor carried by the response
    pub fn timetoken(mut self, timetoken: Option<Timetoken>) -> Self {
        self.inner.timetoken = timetoken;
        self
    }

    /// Mark as a cursor-only envelope
    pub fn timetoken_update(mut self, timetoken_update: bool) -> Self {
        self.inner.timetoken_update = timetoken_update;
        self
    }

    /// Response metadata
    pub fn response(mut self, status: u16, body: impl Into<String>) -> Self {
        self.inner.status = status;
        self.inner.response = body.into();
        self
    }

    /// Position inside the batch
    pub fn position(mut self, first: bool, last: bool) -> Self {
        self.inner.first = first;
        self.inner.last = last;
        self
    }

    /// Turn the envelope into an error envelope
    ///
    /// Error envelopes never carry a payload.
    pub fn error(mut self, error: ErrorRecord) -> Self {
        self.inner.error = Some(error);
        self.inner.message = None;
        self.inner.timetoken_update = false;
        self
    }

    /// Finish the envelope
    pub fn build(self) -> Envelope {
        let parts = self.inner;
        Envelope {
            channel: parts.channel,
            channel_group: parts.channel_group,
            wildcard_channel: parts.wildcard_channel,
            message: parts.message,
            response: parts.response,
            status: parts.status,
            timetoken: parts.timetoken,
            timetoken_update: parts.timetoken_update,
            first: parts.first,
            last: parts.last,
            error: parts.error,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::{ErrorKind, RequestKind};

    #[test]
    fn test_timetoken_from_json() {
        assert_eq!(
            Timetoken::from_json(&json!("14600000000000000")),
            Some(Timetoken::new(14_600_000_000_000_000))
        );
        assert_eq!(Timetoken::from_json(&json!(15)), Some(Timetoken::new(15)));
        assert_eq!(Timetoken::from_json(&json!("abc")), None);
        assert_eq!(Timetoken::from_json(&json!(null)), None);
    }

    #[test]
    fn test_timetoken_ordering() {
        assert!(Timetoken::new(2) > Timetoken::new(1));
        assert_eq!(Timetoken::default(), Timetoken::ZERO);
        assert_eq!(Timetoken::new(42).to_string(), "42");
    }

    #[test]
    fn test_builder_sets_every_field() {
        let envelope = Envelope::builder()
            .channel(Some("lobby".into()))
            .message(json!({"text": "hi"}))
            .timetoken(Some(Timetoken::new(7)))
            .response(200, "[...]")
            .position(true, false)
            .build();

        assert_eq!(envelope.channel(), Some("lobby"));
        assert_eq!(envelope.channel_group(), None);
        assert_eq!(envelope.message(), Some(&json!({"text": "hi"})));
        assert_eq!(envelope.timetoken(), Some(Timetoken::new(7)));
        assert_eq!(envelope.status(), 200);
        assert_eq!(envelope.response(), "[...]");
        assert!(envelope.is_first());
        assert!(!envelope.is_last());
        assert!(envelope.error().is_none());
    }

    #[test]
    fn test_error_drops_payload() {
        let envelope = Envelope::builder()
            .message(json!(1))
            .timetoken_update(true)
            .error(ErrorRecord::new(
                ErrorKind::InvalidJson,
                RequestKind::Subscribe,
                "<html>",
            ))
            .build();

        assert!(envelope.message().is_none());
        assert!(!envelope.is_timetoken_update());
        assert_eq!(
            envelope.error().map(|e| e.kind()),
            Some(ErrorKind::InvalidJson)
        );
    }

    #[test]
    fn test_presence_detection() {
        let presence = Envelope::builder()
            .channel(Some("lobby-pnpres".into()))
            .build();
        assert!(presence.is_presence());

        let wildcard = Envelope::builder()
            .channel(Some("sports.tennis".into()))
            .wildcard_channel(Some("sports.*".into()))
            .build();
        assert!(!wildcard.is_presence());
    }
}
