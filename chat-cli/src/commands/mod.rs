//! CLI command implementations.

pub mod config;
pub mod connect;
pub mod send;

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use clap::Args;
use console::style;

use chat_core::config::{sanitize_base_url, ConfigHandle};
use chat_core::error::{ChatError, ChatResult};
use chat_hub::{ConnectionManager, PrivateMessageSink};
use chat_models::{MessageId, PrivateMessage};

/// Hub connection overrides shared by the connecting commands.
#[derive(Args, Debug, Clone, Default)]
pub struct HubArgs {
    /// Server base URL; the hub lives at <base-url>/chathub (overrides config).
    #[arg(short, long)]
    pub base_url: Option<String>,
    /// Full hub URL, used instead of the base URL (overrides config).
    #[arg(long)]
    pub hub_url: Option<String>,
    /// Bearer token (overrides config).
    #[arg(short, long)]
    pub token: Option<String>,
}

/// Apply command-line overrides to the shared configuration.
pub async fn apply_hub_args(config: &ConfigHandle, args: &HubArgs) {
    let mut cfg = config.write().await;
    if let Some(base_url) = &args.base_url {
        cfg.hub.base_url = sanitize_base_url(base_url);
    }
    if let Some(hub_url) = &args.hub_url {
        cfg.hub.hub_url = Some(hub_url.trim().to_string());
    }
    if let Some(token) = &args.token {
        cfg.hub.access_token = Some(token.clone());
    }
}

/// Username from the argument, falling back to the configured identity.
pub async fn resolve_username(config: &ConfigHandle, username: Option<String>) -> ChatResult<String> {
    let username = match username {
        Some(u) => u,
        None => config.read().await.identity.username.clone(),
    };
    if username.trim().is_empty() {
        return Err(ChatError::MissingConfig(
            "username (use --username or set identity.username)".into(),
        ));
    }
    Ok(username)
}

/// Build a WebSocket-backed manager and connect it.
pub async fn open_manager(
    config: &ConfigHandle,
    sink: Option<Arc<dyn PrivateMessageSink>>,
) -> ChatResult<ConnectionManager> {
    let snapshot = config.snapshot().await;
    let endpoint = snapshot.hub.resolve_endpoint()?;
    let manager = ConnectionManager::with_websocket(snapshot, sink);

    println!("{} Connecting to {}...", style("[hub]").bold().dim(), endpoint);
    match manager.initialize(None).await {
        Ok(()) => {
            println!("  {} Connected.", style("OK").green().bold());
            Ok(manager)
        }
        Err(e) => {
            println!("  {} {e}", style("FAIL").red().bold());
            manager.dispose().await;
            Err(e)
        }
    }
}

/// Local wall-clock time of an event, or a placeholder when the hub sent none.
pub(crate) fn clock(timestamp: Option<DateTime<Utc>>) -> String {
    match timestamp {
        Some(ts) => ts.with_timezone(&Local).format("%H:%M:%S").to_string(),
        None => "--:--:--".to_string(),
    }
}

/// Prints private message events to stdout.
pub struct ConsoleSink;

impl PrivateMessageSink for ConsoleSink {
    fn on_private_message_received(&self, message: PrivateMessage) {
        println!(
            "  {} {} {}: {}",
            style("[dm]").magenta(),
            style(clock(message.timestamp)).dim(),
            style(&message.sender_username).bold(),
            message.content
        );
    }

    fn on_private_message_sent(&self, message: PrivateMessage) {
        println!(
            "  {} to {} (#{}) delivered",
            style("[dm]").magenta(),
            style(&message.recipient_username).bold(),
            message.id
        );
    }

    fn on_private_messages_read(&self, username: String, message_ids: Vec<MessageId>) {
        println!(
            "  {} {} read {} message(s)",
            style("[dm]").magenta(),
            style(username).bold(),
            message_ids.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chat_core::config::AppConfig;

    #[tokio::test]
    async fn test_apply_hub_args() {
        let config = ConfigHandle::new(AppConfig::default());
        let args = HubArgs {
            base_url: Some("chat.example.com/".into()),
            hub_url: None,
            token: Some("abc123".into()),
        };
        apply_hub_args(&config, &args).await;

        let cfg = config.snapshot().await;
        assert_eq!(cfg.hub.base_url, "http://chat.example.com");
        assert_eq!(cfg.hub.access_token.as_deref(), Some("abc123"));
        assert_eq!(
            cfg.hub.resolve_endpoint().unwrap(),
            "http://chat.example.com/chathub"
        );
    }

    #[tokio::test]
    async fn test_resolve_username() {
        let config = ConfigHandle::new(AppConfig::default());
        assert!(resolve_username(&config, None).await.is_err());
        assert_eq!(
            resolve_username(&config, Some("alice".into())).await.unwrap(),
            "alice"
        );

        config.write().await.identity.username = "bob".into();
        assert_eq!(resolve_username(&config, None).await.unwrap(), "bob");
    }

    #[test]
    fn test_clock_without_timestamp() {
        assert_eq!(clock(None), "--:--:--");
        assert_eq!(clock(Some(Utc::now())).len(), 8);
    }
}
