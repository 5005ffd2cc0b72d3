use anyhow::Result;
use clap::Args;
use pubnub::{Client, Targets};

#[derive(Args)]
pub struct HeartbeatSubCommand {
    /// Channels to announce presence on
    #[arg(short, long, action = clap::ArgAction::Append)]
    channel: Vec<String>,
    /// Channel groups to announce presence on
    #[arg(short, long, action = clap::ArgAction::Append)]
    group: Vec<String>,
    /// Presence timeout in seconds
    #[arg(long, default_value_t = 60)]
    pub heartbeat: u64,
}

#[derive(Args)]
pub struct LeaveSubCommand {
    /// Channels to leave
    #[arg(short, long, action = clap::ArgAction::Append)]
    channel: Vec<String>,
    /// Channel groups to leave
    #[arg(short, long, action = clap::ArgAction::Append)]
    group: Vec<String>,
}

fn targets(channels: &[String], groups: &[String]) -> Targets {
    let targets = channels
        .iter()
        .fold(Targets::default(), |targets, channel| targets.channel(channel.as_str()));
    groups
        .iter()
        .fold(targets, |targets, group| targets.channel_group(group.as_str()))
}

pub async fn heartbeat(client: &Client, sub_command_args: &HeartbeatSubCommand) -> Result<()> {
    let targets = targets(&sub_command_args.channel, &sub_command_args.group);
    let envelopes = client.heartbeat(&targets)?.execute().await?;

    for envelope in envelopes {
        println!("{} {}", envelope.status(), envelope.response());
    }

    Ok(())
}

pub async fn leave(client: &Client, sub_command_args: &LeaveSubCommand) -> Result<()> {
    let targets = targets(&sub_command_args.channel, &sub_command_args.group);
    let envelopes = client.leave(&targets)?.execute().await?;

    for envelope in envelopes {
        println!("{} {}", envelope.status(), envelope.response());
    }

    Ok(())
}
