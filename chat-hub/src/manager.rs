//! Hub connection manager.
//!
//! Owns the single hub channel for its lifetime:
//! - Resolves the endpoint and builds the channel with auth and reconnect policy
//! - Binds every inbound event through the [`EventRouter`] before starting
//! - Starts the heartbeat once connected
//! - Tears down heartbeat and channel in order on dispose

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use chat_core::config::AppConfig;
use chat_core::error::{ChatError, ChatResult};

use crate::channel::{ChannelFactory, ChannelOptions, HubChannel};
use crate::commands::{ChannelSlot, OutboundCommandSender};
use crate::events::ConnectionState;
use crate::heartbeat::HeartbeatScheduler;
use crate::reconnect::ReconnectConfig;
use crate::router::{EventRouter, PrivateMessageSink};
use crate::ws::WebSocketChannelFactory;

/// Hub connection manager.
///
/// One manager drives one channel: [`ConnectionManager::initialize`] is
/// accepted once, and [`ConnectionManager::dispose`] is final.
pub struct ConnectionManager {
    config: AppConfig,
    factory: Arc<dyn ChannelFactory>,
    router: Arc<EventRouter>,
    /// The live channel, shared with the command sender.
    channel: ChannelSlot,
    heartbeat: Mutex<Option<HeartbeatScheduler>>,
    /// Mirrors the channel state for subscribers registered before initialize.
    state_tx: Arc<watch::Sender<ConnectionState>>,
    state_forwarder: std::sync::Mutex<Option<JoinHandle<()>>>,
    initialized: AtomicBool,
    disposed: AtomicBool,
}

impl ConnectionManager {
    pub fn new(
        config: AppConfig,
        factory: Arc<dyn ChannelFactory>,
        private_sink: Option<Arc<dyn PrivateMessageSink>>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Unstarted);
        Self {
            config,
            factory,
            router: Arc::new(EventRouter::new(private_sink)),
            channel: Arc::new(RwLock::new(None)),
            heartbeat: Mutex::new(None),
            state_tx: Arc::new(state_tx),
            state_forwarder: std::sync::Mutex::new(None),
            initialized: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
        }
    }

    /// Manager using the WebSocket transport.
    pub fn with_websocket(
        config: AppConfig,
        private_sink: Option<Arc<dyn PrivateMessageSink>>,
    ) -> Self {
        Self::new(config, Arc::new(WebSocketChannelFactory), private_sink)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Observable inbound events.
    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    /// Outbound commands routed through this manager's channel.
    pub fn commands(&self) -> OutboundCommandSender {
        OutboundCommandSender::new(self.channel.clone())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.disposed.load(Ordering::SeqCst) {
            return ConnectionState::Disposed;
        }
        match self.current_channel() {
            Some(channel) => channel.state(),
            None => ConnectionState::Unstarted,
        }
    }

    /// Subscribe to connection state changes.
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Connect to the hub.
    ///
    /// Suspends until the handshake completes. `token` overrides the access
    /// token from configuration. An initial connection failure is returned
    /// as is; the manager does not retry it.
    ///
    /// Configuration errors are reported before the instance counts as
    /// initialized, so a rejected call can be repeated.
    pub async fn initialize(&self, token: Option<String>) -> ChatResult<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(ChatError::Disposed);
        }

        let heartbeat_interval = self.config.heartbeat.interval();
        if heartbeat_interval.is_zero() {
            return Err(ChatError::Config("heartbeat interval must be positive".into()));
        }
        let endpoint = self.config.hub.resolve_endpoint()?;

        if self.initialized.swap(true, Ordering::SeqCst) {
            return Err(ChatError::AlreadyInitialized);
        }

        let mut options = ChannelOptions::from_hub_config(endpoint.clone(), &self.config.hub);
        let token = token
            .or_else(|| self.config.hub.access_token.clone())
            .filter(|t| !t.trim().is_empty());
        if let Some(token) = token {
            options = options.with_access_token(token);
        }
        if self.config.reconnect.enabled {
            options = options.with_reconnect(ReconnectConfig::from(&self.config.reconnect));
        }
        debug!("hub channel options: {options:?}");

        let channel = self.factory.build(options);
        self.router.bind(channel.as_ref())?;
        if !self.attach_channel(channel.clone())? {
            debug!("disposed before the channel was attached");
            channel.stop().await;
            return Err(ChatError::Disposed);
        }

        info!("initializing hub connection to {endpoint}");
        if let Err(e) = channel.start().await {
            if self.disposed.load(Ordering::SeqCst) {
                debug!("start aborted by dispose: {e}");
                channel.stop().await;
                return Err(ChatError::Disposed);
            }
            error!("failed to connect to hub: {e}");
            return Err(e);
        }

        let mut heartbeat = self.heartbeat.lock().await;
        if self.disposed.load(Ordering::SeqCst) {
            drop(heartbeat);
            channel.stop().await;
            return Err(ChatError::Disposed);
        }
        *heartbeat = Some(HeartbeatScheduler::start(channel, heartbeat_interval));
        info!("hub connection initialized");
        Ok(())
    }

    /// Stop the heartbeat, then close the channel. Idempotent.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            debug!("connection manager already disposed");
            return;
        }
        info!("disposing hub connection");

        // Detach first so no command reaches the channel during teardown.
        let channel = match self.channel.write() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };

        let heartbeat = self.heartbeat.lock().await.take();
        if let Some(mut heartbeat) = heartbeat {
            heartbeat.stop().await;
        }

        if let Some(channel) = channel {
            channel.stop().await;
        }

        let forwarder = match self.state_forwarder.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        self.state_tx.send_replace(ConnectionState::Disposed);
        info!("hub connection disposed");
    }

    fn current_channel(&self) -> Option<Arc<dyn HubChannel>> {
        match self.channel.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Publish `channel` to the command sender and start mirroring its state.
    ///
    /// Returns `false` once dispose has begun. The flag is checked under the
    /// slot lock that dispose takes after setting it, so a channel is either
    /// seen by dispose or never attached.
    fn attach_channel(&self, channel: Arc<dyn HubChannel>) -> ChatResult<bool> {
        let mut slot = self
            .channel
            .write()
            .map_err(|_| ChatError::Internal("channel slot poisoned".into()))?;
        if self.disposed.load(Ordering::SeqCst) {
            return Ok(false);
        }
        self.spawn_state_forwarder(channel.as_ref());
        *slot = Some(channel);
        Ok(true)
    }

    fn spawn_state_forwarder(&self, channel: &dyn HubChannel) {
        let mut rx = channel.state_receiver();
        let state_tx = self.state_tx.clone();
        let task = tokio::spawn(async move {
            loop {
                let state = *rx.borrow_and_update();
                state_tx.send_if_modified(|current| {
                    let changed = *current != state;
                    *current = state;
                    changed
                });
                if state == ConnectionState::Disposed || rx.changed().await.is_err() {
                    break;
                }
            }
        });
        match self.state_forwarder.lock() {
            Ok(mut slot) => *slot = Some(task),
            Err(_) => {
                warn!("state forwarder slot poisoned");
                task.abort();
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Ok(mut heartbeat) = self.heartbeat.try_lock() {
            // Dropping the scheduler aborts its task.
            heartbeat.take();
        }
        if let Ok(mut forwarder) = self.state_forwarder.lock() {
            if let Some(task) = forwarder.take() {
                task.abort();
            }
        }
    }
}
