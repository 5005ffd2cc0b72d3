//! Command line client for publishing to and subscribing on PubNub origins

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use pubnub::Client;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod settings;
mod sub_commands;

const DEFAULT_WORK_DIR: &str = ".pubnub-cli";

/// Simple CLI application to talk to PubNub origins
#[derive(Parser)]
#[command(name = "pubnub-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to working dir
    #[arg(short, long)]
    work_dir: Option<PathBuf>,
    /// Settings file, defaults to config.toml in the working dir
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Logging level
    #[arg(short, long, default_value = "error")]
    log_level: Level,
    /// Subscribe key
    #[arg(long, env = "PUBNUB_SUBSCRIBE_KEY")]
    subscribe_key: Option<String>,
    /// Publish key
    #[arg(long, env = "PUBNUB_PUBLISH_KEY")]
    publish_key: Option<String>,
    /// Origin host, repeat for a pool
    #[arg(long, action = clap::ArgAction::Append)]
    origin: Vec<String>,
    /// Use https
    #[arg(long)]
    ssl: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Server time
    Time,
    /// Publish a message
    Publish(sub_commands::publish::PublishSubCommand),
    /// Subscribe and print messages
    Subscribe(sub_commands::subscribe::SubscribeSubCommand),
    /// Send a presence heartbeat
    Heartbeat(sub_commands::heartbeat::HeartbeatSubCommand),
    /// Leave channels
    Leave(sub_commands::heartbeat::LeaveSubCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();
    let default_filter = args.log_level;

    let hyper_filter = "hyper=warn";
    let reqwest_filter = "reqwest=warn";

    let env_filter = EnvFilter::new(format!(
        "{},{},{}",
        default_filter, hyper_filter, reqwest_filter
    ));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let work_dir = match &args.work_dir {
        Some(work_dir) => work_dir.clone(),
        None => match home::home_dir() {
            Some(home_dir) => home_dir.join(DEFAULT_WORK_DIR),
            None => bail!("Could not find home dir, pass --work-dir"),
        },
    };
    fs::create_dir_all(&work_dir)?;

    let config_file = args
        .config
        .clone()
        .unwrap_or_else(|| settings::default_config_file(&work_dir));
    let mut config = settings::load(&config_file)?;

    if let Some(subscribe_key) = args.subscribe_key {
        config.subscribe_key = subscribe_key;
    }
    if let Some(publish_key) = args.publish_key {
        config.publish_key = Some(publish_key);
    }
    if !args.origin.is_empty() {
        config.origins = args.origin;
    }
    if args.ssl {
        config.ssl = true;
    }
    if let Commands::Heartbeat(sub_command_args) = &args.command {
        config.heartbeat = Some(sub_command_args.heartbeat);
    }

    let client = Client::builder(config)
        .error_callback(|envelope| {
            if let Some(error) = envelope.error() {
                eprintln!("error: {}", error);
            }
        })
        .build()?;

    let result = match &args.command {
        Commands::Time => sub_commands::time::time(&client).await,
        Commands::Publish(sub_command_args) => {
            sub_commands::publish::publish(&client, sub_command_args).await
        }
        Commands::Subscribe(sub_command_args) => {
            sub_commands::subscribe::subscribe(&client, sub_command_args).await
        }
        Commands::Heartbeat(sub_command_args) => {
            sub_commands::heartbeat::heartbeat(&client, sub_command_args).await
        }
        Commands::Leave(sub_command_args) => {
            sub_commands::heartbeat::leave(&client, sub_command_args).await
        }
    };

    client.shutdown();
    result
}
