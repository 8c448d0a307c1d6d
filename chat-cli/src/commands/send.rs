//! Send and dm commands - one-shot outbound messages.

use console::style;
use tracing::warn;

use chat_core::config::ConfigHandle;
use chat_core::error::ChatResult;
use chat_models::{SendMessageRequest, SendPrivateMessageRequest};

use super::HubArgs;

/// Join `channel`, post `message`, and leave.
pub async fn run_send(
    config: ConfigHandle,
    hub: HubArgs,
    channel: String,
    message: String,
    username: Option<String>,
) -> ChatResult<()> {
    super::apply_hub_args(&config, &hub).await;
    let username = super::resolve_username(&config, username).await?;
    let request = SendMessageRequest::new(username.clone(), channel.clone(), message);
    request.validate()?;

    let manager = super::open_manager(&config, None).await?;
    let commands = manager.commands();

    let result = async {
        commands.join_channel(&username, &channel).await?;
        commands.send_message(&request).await
    }
    .await;

    match &result {
        Ok(()) => println!(
            "  {} Sent to #{} as {}",
            style("OK").green().bold(),
            channel,
            style(&username).bold()
        ),
        Err(e) => println!("  {} {e}", style("FAIL").red().bold()),
    }

    if let Err(e) = commands.leave_channel(&channel).await {
        warn!("failed to leave #{channel}: {e}");
    }
    manager.dispose().await;
    result
}

/// Send a private message to `to`.
pub async fn run_dm(
    config: ConfigHandle,
    hub: HubArgs,
    to: String,
    message: String,
) -> ChatResult<()> {
    super::apply_hub_args(&config, &hub).await;
    let request = SendPrivateMessageRequest::new(to, message);
    request.validate()?;

    let manager = super::open_manager(&config, None).await?;
    let result = manager.commands().send_private_message(&request).await;

    match &result {
        Ok(()) => println!(
            "  {} Private message sent to {}",
            style("OK").green().bold(),
            style(&request.recipient_username).bold()
        ),
        Err(e) => println!("  {} {e}", style("FAIL").red().bold()),
    }

    manager.dispose().await;
    result
}
