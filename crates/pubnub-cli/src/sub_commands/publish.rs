use anyhow::{bail, Result};
use clap::Args;
use pubnub::Client;
use serde_json::Value;

#[derive(Args)]
pub struct PublishSubCommand {
    /// Channel to publish to
    channel: String,
    /// Message, parsed as JSON when possible
    message: String,
}

pub async fn publish(client: &Client, sub_command_args: &PublishSubCommand) -> Result<()> {
    let message = serde_json::from_str::<Value>(&sub_command_args.message)
        .unwrap_or_else(|_| Value::String(sub_command_args.message.clone()));

    let envelopes = client
        .publish(&sub_command_args.channel, &message)?
        .execute()
        .await?;

    for envelope in envelopes {
        if let Some(error) = envelope.error() {
            bail!("Publish failed: {}", error);
        }
        match envelope.timetoken() {
            Some(timetoken) => println!("Published at {}", timetoken),
            None => println!("Published: {}", envelope.response()),
        }
    }

    Ok(())
}
