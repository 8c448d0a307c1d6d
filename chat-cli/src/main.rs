//! ChatHub CLI - command-line client for the chat hub.
//!
//! Connects to the hub from the terminal to stream channel events, post
//! messages and send private messages. Useful for scripting and for
//! debugging a hub deployment.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use chat_core::config::{AppConfig, ConfigHandle};
use chat_core::error::ChatResult;
use chat_core::logging;

/// ChatHub - real-time chat client.
#[derive(Parser)]
#[command(
    name = "chathub",
    version,
    about = "ChatHub real-time chat client CLI",
    long_about = "A command-line client for the ChatHub real-time chat server.\n\
                   Join channels, stream events and send messages from the terminal."
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the hub and print events until Ctrl+C.
    Connect {
        #[command(flatten)]
        hub: commands::HubArgs,
        /// Channel to join after connecting.
        #[arg(long)]
        channel: Option<String>,
        /// Username to join as (overrides config).
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Post a message to a public channel.
    Send {
        #[command(flatten)]
        hub: commands::HubArgs,
        /// Target channel.
        #[arg(long)]
        channel: String,
        /// Message text.
        #[arg(short, long)]
        message: String,
        /// Username to post as (overrides config).
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Send a private message.
    Dm {
        #[command(flatten)]
        hub: commands::HubArgs,
        /// Recipient username.
        #[arg(long)]
        to: String,
        /// Message text.
        #[arg(short, long)]
        message: String,
    },
    /// Inspect or create the configuration file.
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

#[tokio::main]
async fn main() -> ChatResult<()> {
    let cli = Cli::parse();

    // Load configuration
    let config_path = match cli.config.clone() {
        Some(path) => path,
        None => AppConfig::default_config_path()?,
    };
    let config = if config_path.exists() {
        AppConfig::load_from_file(&config_path)?
    } else {
        AppConfig::default()
    };

    // Initialize logging
    let log_level = if cli.verbose {
        "debug".to_string()
    } else {
        config.logging.level.clone()
    };
    let log_dir = config
        .effective_log_dir()
        .unwrap_or_else(|_| PathBuf::from("logs"));
    let _guard = logging::init_logging(&log_level, Some(log_dir.as_path()), config.logging.json_output)?;

    let config_handle = ConfigHandle::new(config);

    info!("ChatHub CLI v{}", chat_core::constants::APP_VERSION);

    // Dispatch to command handlers
    match cli.command {
        Commands::Connect {
            hub,
            channel,
            username,
        } => commands::connect::run(config_handle, hub, channel, username).await,
        Commands::Send {
            hub,
            channel,
            message,
            username,
        } => commands::send::run_send(config_handle, hub, channel, message, username).await,
        Commands::Dm { hub, to, message } => {
            commands::send::run_dm(config_handle, hub, to, message).await
        }
        Commands::Config { action } => {
            commands::config::run(config_handle, action, config_path).await
        }
    }
}
