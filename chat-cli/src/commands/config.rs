//! Config command - inspect or create the configuration file.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use console::style;

use chat_core::config::{AppConfig, ConfigHandle};
use chat_core::error::{ChatError, ChatResult};

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (tokens redacted).
    Show,
    /// Write a default configuration file.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
        /// Base URL to store in the new file.
        #[arg(short, long)]
        base_url: Option<String>,
        /// Default username to store in the new file.
        #[arg(short, long)]
        username: Option<String>,
    },
    /// Print the configuration file path.
    Path,
}

/// Run a config subcommand.
pub async fn run(config: ConfigHandle, action: ConfigAction, path: PathBuf) -> ChatResult<()> {
    match action {
        ConfigAction::Show => {
            let rendered = render(&config.snapshot().await)?;
            println!("{rendered}");
            Ok(())
        }
        ConfigAction::Init {
            force,
            base_url,
            username,
        } => {
            let mut fresh = AppConfig::default();
            if let Some(base_url) = base_url {
                fresh.hub.base_url = chat_core::config::sanitize_base_url(&base_url);
            }
            if let Some(username) = username {
                fresh.identity.username = username;
            }
            init(&fresh, &path, force)?;
            println!(
                "  {} Config written to {}",
                style("OK").green(),
                path.display()
            );
            Ok(())
        }
        ConfigAction::Path => {
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// TOML rendering of `config` with secrets replaced.
fn render(config: &AppConfig) -> ChatResult<String> {
    let mut redacted = config.clone();
    if redacted.hub.access_token.is_some() {
        redacted.hub.access_token = Some("********".into());
    }
    toml::to_string_pretty(&redacted)
        .map_err(|e| ChatError::Config(format!("failed to render config: {e}")))
}

fn init(config: &AppConfig, path: &Path, force: bool) -> ChatResult<()> {
    if path.exists() && !force {
        return Err(ChatError::Config(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        )));
    }
    config.save_to_file(path)
}
