//! Connect command - hold a hub connection open and print every event.

use std::sync::Arc;

use console::style;
use tracing::warn;

use chat_core::config::ConfigHandle;
use chat_core::error::ChatResult;
use chat_hub::{ConnectionManager, EventRouter, MembershipChange, MuteStatus};
use chat_models::{Message, User};

use super::{clock, ConsoleSink, HubArgs};

/// Run the connect command.
pub async fn run(
    config: ConfigHandle,
    hub: HubArgs,
    channel: Option<String>,
    username: Option<String>,
) -> ChatResult<()> {
    super::apply_hub_args(&config, &hub).await;

    // Resolve the identity up front so a bad invocation fails before connecting.
    let join = match channel {
        Some(channel) => Some((super::resolve_username(&config, username).await?, channel)),
        None => None,
    };

    let manager = super::open_manager(&config, Some(Arc::new(ConsoleSink))).await?;
    print_events(manager.router());

    if let Some((username, channel)) = &join {
        manager.commands().join_channel(username, channel).await?;
        println!(
            "  {} Joined #{} as {}",
            style("OK").green().bold(),
            channel,
            style(username).bold()
        );
    }
    println!("  Listening for events... (Ctrl+C to stop)");
    println!();

    let result = wait_until_done(&manager).await;

    if let Some((_, channel)) = &join {
        if let Err(e) = manager.commands().leave_channel(channel).await {
            warn!("failed to leave #{channel}: {e}");
        }
    }
    manager.dispose().await;
    println!("{} Disconnected.", style("[hub]").bold().dim());
    result
}

/// Wait for Ctrl+C or for the connection to end for good.
async fn wait_until_done(manager: &ConnectionManager) -> ChatResult<()> {
    let mut state_rx = manager.state_receiver();
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                println!();
                return signal.map_err(Into::into);
            }
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let state = *state_rx.borrow_and_update();
                println!("  {} {}", style("[state]").yellow(), state);
                if state.is_terminal() {
                    return Ok(());
                }
            }
        }
    }
}

fn print_events(router: &EventRouter) {
    router.on_message_received().subscribe(|m: &Message| {
        println!(
            "  {} {} {}: {}",
            style(format!("[#{}]", m.channel)).cyan(),
            style(clock(m.timestamp)).dim(),
            style(&m.username).bold(),
            m.content
        );
    });
    router.on_user_joined().subscribe(|c: &MembershipChange| {
        println!(
            "  {} {} joined #{}",
            style("[join]").green(),
            c.username,
            c.channel
        );
    });
    router.on_user_left().subscribe(|c: &MembershipChange| {
        println!("  {} {} left #{}", style("[left]").dim(), c.username, c.channel);
    });
    router.on_user_list_updated().subscribe(|users: &Vec<User>| {
        let names: Vec<&str> = users.iter().map(User::label).collect();
        println!(
            "  {} {} online: {}",
            style("[users]").cyan(),
            users.iter().filter(|u| u.is_online).count(),
            names.join(", ")
        );
    });
    router
        .on_channel_mute_status_changed()
        .subscribe(|s: &MuteStatus| {
            let label = if s.is_muted {
                style("muted").yellow()
            } else {
                style("unmuted").green()
            };
            println!("  {} #{} {}", style("[mute]").yellow(), s.channel, label);
        });
    router.on_message_blocked().subscribe(|reason: &String| {
        println!("  {} {}", style("[blocked]").red().bold(), reason);
    });
}
