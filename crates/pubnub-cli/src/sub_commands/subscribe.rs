use anyhow::Result;
use clap::Args;
use pubnub::{Client, Envelope};
use tokio::sync::mpsc;

#[derive(Args)]
pub struct SubscribeSubCommand {
    /// Channels, `.*` suffixed names are wildcard patterns
    #[arg(short, long, action = clap::ArgAction::Append)]
    channel: Vec<String>,
    /// Channel groups
    #[arg(short, long, action = clap::ArgAction::Append)]
    group: Vec<String>,
    /// Stop after this many messages
    #[arg(short = 'n', long)]
    count: Option<usize>,
    /// Poll once instead of subscribing in the background
    #[arg(long)]
    once: bool,
}

fn print_envelope(envelope: &Envelope) {
    let target = envelope
        .channel()
        .or(envelope.wildcard_channel())
        .or(envelope.channel_group())
        .unwrap_or_default();
    let message = envelope
        .message()
        .map(|message| message.to_string())
        .unwrap_or_default();

    match envelope.timetoken() {
        Some(timetoken) => println!("[{}] {}: {}", timetoken, target, message),
        None => println!("{}: {}", target, message),
    }
}

pub async fn subscribe(client: &Client, sub_command_args: &SubscribeSubCommand) -> Result<()> {
    let request = client
        .subscribe()
        .channels(sub_command_args.channel.iter().cloned())
        .channel_groups(sub_command_args.group.iter().cloned());

    if sub_command_args.once {
        for envelope in request.execute().await? {
            if envelope.error().is_none() && !envelope.is_timetoken_update() {
                print_envelope(&envelope);
            }
        }
        return Ok(());
    }

    let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope>();
    let presence = sender.clone();

    request
        .callback(move |envelope| {
            let _ = sender.send(envelope.clone());
        })
        .presence_callback(move |envelope| {
            let _ = presence.send(envelope.clone());
        })
        .start()?;

    let mut received = 0;
    loop {
        tokio::select! {
            envelope = receiver.recv() => {
                let Some(envelope) = envelope else {
                    break;
                };
                print_envelope(&envelope);
                received += 1;
                if sub_command_args.count.is_some_and(|count| received >= count) {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    let targets = client
        .multiplexer()
        .origins()
        .into_iter()
        .filter_map(|origin| client.multiplexer().targets(&origin));
    for targets in targets {
        client.unsubscribe(targets).await?;
    }

    Ok(())
}
