//! Request shapes for every endpoint

use pubnub_common::target::join_names;
use pubnub_common::{RequestKind, Timetoken};
use serde_json::Value;

use super::RequestSpec;

/// Path segment used when a request names no channel
const NO_CHANNEL: &str = ",";

fn channels_segment(names: &[String]) -> String {
    if names.is_empty() {
        NO_CHANNEL.to_string()
    } else {
        join_names(names)
    }
}

fn with_presence_params(
    mut spec: RequestSpec,
    groups: &[String],
    state: Option<&Value>,
) -> RequestSpec {
    if !groups.is_empty() {
        spec = spec.query("channel-group", join_names(groups));
    }
    if let Some(state) = state {
        spec = spec.query("state", state.to_string());
    }
    spec
}

/// `/time/0`
pub fn time(origin: &str) -> RequestSpec {
    RequestSpec::new(RequestKind::Time, origin)
        .segment("time")
        .segment("0")
}

/// `/publish/{pub}/{sub}/0/{channel}/0/{message}`
pub fn publish(
    origin: &str,
    publish_key: &str,
    subscribe_key: &str,
    channel: &str,
    message: &Value,
) -> RequestSpec {
    RequestSpec::new(RequestKind::Publish, origin)
        .segment("publish")
        .segment(publish_key)
        .segment(subscribe_key)
        .segment("0")
        .segment(channel)
        .segment("0")
        .segment(message.to_string())
}

/// Subscribe long-poll parameters
#[derive(Debug, Clone, Copy)]
pub struct SubscribeParams<'a> {
    /// Channels and wildcard patterns
    pub names: &'a [String],
    /// Channel groups
    pub groups: &'a [String],
    /// Cursor to resume from
    pub cursor: Timetoken,
    /// Presence heartbeat
    pub heartbeat: Option<u64>,
    /// Presence state
    pub state: Option<&'a Value>,
}

/// `/subscribe/{sub}/{channels}/0/{cursor}`
pub fn subscribe(origin: &str, subscribe_key: &str, params: SubscribeParams<'_>) -> RequestSpec {
    let mut spec = RequestSpec::new(RequestKind::Subscribe, origin)
        .segment("subscribe")
        .segment(subscribe_key)
        .segment(channels_segment(params.names))
        .segment("0")
        .segment(params.cursor.to_string());

    if let Some(heartbeat) = params.heartbeat {
        spec = spec.query("heartbeat", heartbeat.to_string());
    }
    with_presence_params(spec, params.groups, params.state)
}

fn presence(kind: RequestKind, origin: &str, subscribe_key: &str, names: &[String]) -> RequestSpec {
    RequestSpec::new(kind, origin)
        .segment("v2")
        .segment("presence")
        .segment("sub-key")
        .segment(subscribe_key)
        .segment("channel")
        .segment(channels_segment(names))
}

/// `/v2/presence/sub-key/{sub}/channel/{channels}/heartbeat`
pub fn heartbeat(
    origin: &str,
    subscribe_key: &str,
    names: &[String],
    groups: &[String],
    heartbeat: u64,
    state: Option<&Value>,
) -> RequestSpec {
    let spec = presence(RequestKind::Heartbeat, origin, subscribe_key, names)
        .segment("heartbeat")
        .query("heartbeat", heartbeat.to_string());
    with_presence_params(spec, groups, state)
}

/// `/v2/presence/sub-key/{sub}/channel/{channels}/leave`
pub fn leave(origin: &str, subscribe_key: &str, names: &[String], groups: &[String]) -> RequestSpec {
    let spec = presence(RequestKind::Leave, origin, subscribe_key, names).segment("leave");
    with_presence_params(spec, groups, None)
}
