//! Splitting a batched subscribe response into envelopes

use pubnub_common::target::{is_presence, is_wildcard, split_names};
use pubnub_common::{Cryptor, EnvelopeBuilder, ErrorKind, ErrorRecord, RequestKind, Timetoken};
use serde_json::Value;

use super::state::Targets;

/// Payload decryption settings
#[derive(Debug, Clone, Copy)]
pub(crate) struct Decryption<'a> {
    pub cryptor: &'a dyn Cryptor,
    pub cipher_key: &'a str,
}

impl Decryption<'_> {
    fn apply(&self, channel: Option<&str>, payload: Value) -> Value {
        if channel.is_some_and(is_presence) {
            return payload;
        }
        match self.cryptor.decrypt(self.cipher_key, &payload) {
            Ok(plain) => plain,
            Err(err) => {
                tracing::warn!("Could not decrypt message on {:?}: {}", channel, err);
                payload
            }
        }
    }
}

/// Envelope naming the first subscribed target, for responses that cannot
/// be attributed to a message
pub(crate) fn target_envelope(targets: &Targets) -> EnvelopeBuilder {
    let builder = EnvelopeBuilder::default();
    if let Some(channel) = targets.channels.first() {
        builder.channel(Some(channel.clone()))
    } else if let Some(group) = targets.channel_groups.first() {
        builder.channel_group(Some(group.clone()))
    } else {
        builder.wildcard_channel(targets.wildcards.first().cloned())
    }
}

/// Error builder for a successful response the client cannot read
fn unexpected_shape(targets: &Targets, json: Option<&Value>) -> EnvelopeBuilder {
    let body = json.map(Value::to_string).unwrap_or_default();
    tracing::warn!("Unexpected subscribe response: {}", body);
    target_envelope(targets).error(
        ErrorRecord::new(ErrorKind::Unknown, RequestKind::Subscribe, body)
            .with_message("Unexpected subscribe response shape."),
    )
}

/// Turn a subscribe response into one builder per message
///
/// - no message list or no cursor: a single error builder
/// - empty message list: a single cursor-only builder
/// - fewer than four elements: element 2, when present, names the channel
///   of each message
/// - four or more elements: element 2 names the group or wildcard and
///   element 3 the channel of each message
pub(crate) fn demultiplex(
    json: Option<&Value>,
    is_error: bool,
    targets: &Targets,
    decryption: Option<Decryption<'_>>,
) -> Vec<EnvelopeBuilder> {
    let body = json.and_then(Value::as_array);
    if is_error {
        let timetoken = body
            .and_then(|body| body.get(1))
            .and_then(Timetoken::from_json);
        return vec![target_envelope(targets).timetoken(timetoken)];
    }

    let Some(body) = body else {
        return vec![unexpected_shape(targets, json)];
    };
    let (Some(Value::Array(messages)), Some(cursor)) =
        (body.first(), body.get(1).and_then(Timetoken::from_json))
    else {
        return vec![unexpected_shape(targets, json)];
    };
    let timetoken = Some(cursor);

    if messages.is_empty() {
        return vec![target_envelope(targets)
            .timetoken(timetoken)
            .timetoken_update(true)];
    }

    let decrypt = |channel: Option<&str>, payload: &Value| match decryption {
        Some(decryption) => decryption.apply(channel, payload.clone()),
        None => payload.clone(),
    };

    if body.len() < 4 {
        let names = match body.get(2).and_then(Value::as_str) {
            Some(list) => split_names(list),
            None => targets.path_names(),
        };

        return messages
            .iter()
            .enumerate()
            .map(|(i, payload)| {
                let index = if names.len() <= 1 { 0 } else { i };
                let channel = names.get(index).cloned();
                let message = decrypt(channel.as_deref(), payload);
                EnvelopeBuilder::default()
                    .channel(channel)
                    .message(message)
                    .timetoken(timetoken)
            })
            .collect();
    }

    let groups = body.get(2).and_then(Value::as_str).map(split_names).unwrap_or_default();
    let channels = body.get(3).and_then(Value::as_str).map(split_names).unwrap_or_default();

    messages
        .iter()
        .enumerate()
        .map(|(i, payload)| {
            let channel = channels.get(i).cloned();
            let group = groups.get(i).cloned();
            let message = decrypt(channel.as_deref(), payload);

            let builder = EnvelopeBuilder::default()
                .channel(channel)
                .message(message)
                .timetoken(timetoken);
            match group {
                Some(group) if is_wildcard(&group) => builder.wildcard_channel(Some(group)),
                group => builder.channel_group(group),
            }
        })
        .collect()
}
