//! Application heartbeat.
//!
//! Sends the zero-argument `Ping` command on a fixed interval while the
//! channel is connected. Ticks that land outside a connected window are
//! skipped, never queued.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use chat_core::constants::methods;

use crate::channel::HubChannel;
use crate::events::ConnectionState;

/// Owned periodic heartbeat task.
///
/// Created when the connection manager initializes and stopped before the
/// channel is torn down.
pub struct HeartbeatScheduler {
    interval: Duration,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Spawn the heartbeat for `channel`. The first tick fires immediately.
    pub fn start(channel: Arc<dyn HubChannel>, interval: Duration) -> Self {
        let (cancel, cancel_rx) = oneshot::channel();
        let task = tokio::spawn(run(channel, interval, cancel_rx));
        info!("heartbeat started (every {}s)", interval.as_secs_f64());
        Self {
            interval,
            cancel: Some(cancel),
            task: Some(task),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the task and wait for it to exit. Idempotent.
    ///
    /// No tick runs after this returns.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("heartbeat task ended abnormally: {e}");
                }
            }
            info!("heartbeat stopped");
        }
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    channel: Arc<dyn HubChannel>,
    every: Duration,
    mut cancel: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = &mut cancel => break,
            _ = ticker.tick() => {}
        }

        let state = channel.state();
        if state != ConnectionState::Connected {
            trace!("heartbeat skipped while {state}");
            continue;
        }

        tokio::select! {
            _ = &mut cancel => break,
            result = channel.send(methods::PING, Vec::new()) => {
                if let Err(e) = result {
                    warn!("heartbeat ping failed: {e}");
                }
            }
        }
    }
    debug!("heartbeat task exiting");
}
