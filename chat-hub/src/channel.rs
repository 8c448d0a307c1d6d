//! The hub channel abstraction.
//!
//! A [`HubChannel`] is the persistent bidirectional connection the rest of
//! the client talks through: named handlers are bound to it before it
//! starts, it reports its [`ConnectionState`], and it sends named
//! invocations. [`ChannelFactory`] builds channels from [`ChannelOptions`],
//! so the connection manager never depends on a concrete transport.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, trace};

use chat_core::config::HubConfig;
use chat_core::constants;
use chat_core::error::{ChatError, ChatResult};

use crate::events::ConnectionState;
use crate::reconnect::ReconnectConfig;

/// Callback invoked with the raw arguments of an inbound invocation.
pub type InboundHandler = Arc<dyn Fn(Vec<Value>) + Send + Sync>;

/// Supplies the bearer token each time the channel (re)connects.
pub type TokenProvider = Arc<dyn Fn() -> Option<String> + Send + Sync>;

/// Everything needed to build a channel.
#[derive(Clone)]
pub struct ChannelOptions {
    /// Resolved hub endpoint (http, https, ws or wss).
    pub endpoint: String,
    /// Bearer token source; `None` connects anonymously.
    pub token_provider: Option<TokenProvider>,
    /// Reconnection policy; `None` disables automatic reconnection.
    pub reconnect: Option<ReconnectConfig>,
    /// Extra headers for the upgrade request.
    pub headers: HashMap<String, String>,
    /// Limit on connect + handshake.
    pub connect_timeout: Duration,
    /// Server silence after which the connection is considered lost.
    pub server_timeout: Duration,
    /// Interval between protocol pings sent to the server.
    pub keep_alive_interval: Duration,
}

impl ChannelOptions {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token_provider: None,
            reconnect: None,
            headers: HashMap::new(),
            connect_timeout: Duration::from_millis(constants::DEFAULT_CONNECT_TIMEOUT_MS),
            server_timeout: Duration::from_millis(constants::DEFAULT_SERVER_TIMEOUT_MS),
            keep_alive_interval: Duration::from_millis(constants::DEFAULT_KEEP_ALIVE_INTERVAL_MS),
        }
    }

    /// Copy transport timings and headers from the hub configuration.
    pub fn from_hub_config(endpoint: impl Into<String>, hub: &HubConfig) -> Self {
        Self {
            headers: hub.custom_headers.clone(),
            connect_timeout: hub.connect_timeout(),
            server_timeout: hub.server_timeout(),
            keep_alive_interval: hub.keep_alive_interval(),
            ..Self::new(endpoint)
        }
    }

    /// Attach a fixed bearer token.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.token_provider = Some(Arc::new(move || Some(token.clone())));
        self
    }

    /// Enable automatic reconnection with the given policy.
    pub fn with_reconnect(mut self, config: ReconnectConfig) -> Self {
        self.reconnect = Some(config);
        self
    }

    /// Query the token provider.
    pub fn access_token(&self) -> Option<String> {
        self.token_provider.as_ref().and_then(|provider| provider())
    }
}

impl fmt::Debug for ChannelOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOptions")
            .field("endpoint", &self.endpoint)
            .field("has_token_provider", &self.token_provider.is_some())
            .field("reconnect", &self.reconnect)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("connect_timeout", &self.connect_timeout)
            .field("server_timeout", &self.server_timeout)
            .field("keep_alive_interval", &self.keep_alive_interval)
            .finish()
    }
}

/// A persistent, bidirectional connection to the chat hub.
#[async_trait]
pub trait HubChannel: Send + Sync {
    /// Bind the handler for an inbound invocation target.
    ///
    /// One handler per target, and only before [`HubChannel::start`].
    fn on(&self, target: &str, handler: InboundHandler) -> ChatResult<()>;

    /// Connect and complete the protocol handshake.
    async fn start(&self) -> ChatResult<()>;

    /// Send a non-blocking invocation.
    ///
    /// Resolves once the frame has been written to the transport.
    async fn send(&self, method: &str, args: Vec<Value>) -> ChatResult<()>;

    /// Close the connection and release the reader task. Idempotent.
    async fn stop(&self);

    /// Current connection state.
    fn state(&self) -> ConnectionState;

    /// Subscribe to connection state changes.
    fn state_receiver(&self) -> watch::Receiver<ConnectionState>;
}

/// Builds hub channels.
pub trait ChannelFactory: Send + Sync {
    fn build(&self, options: ChannelOptions) -> Arc<dyn HubChannel>;
}

/// Write-once map from invocation target to its handler.
///
/// Handlers are bound while the channel is unstarted; [`HandlerRegistry::seal`]
/// freezes the map when the channel starts.
#[derive(Default)]
pub struct HandlerRegistry {
    inner: RwLock<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    handlers: HashMap<String, InboundHandler>,
    sealed: bool,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a handler. Fails after sealing or when the target is already bound.
    pub fn bind(&self, target: &str, handler: InboundHandler) -> ChatResult<()> {
        let mut inner = self
            .inner
            .write()
            .map_err(|_| ChatError::Internal("handler registry poisoned".into()))?;
        if inner.sealed {
            return Err(ChatError::HandlersSealed(target.to_string()));
        }
        if inner.handlers.contains_key(target) {
            return Err(ChatError::DuplicateHandler(target.to_string()));
        }
        inner.handlers.insert(target.to_string(), handler);
        trace!("bound handler for {target}");
        Ok(())
    }

    /// Freeze the registry.
    pub fn seal(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.sealed = true;
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.inner.read().map(|inner| inner.sealed).unwrap_or(true)
    }

    /// Invoke the handler bound to `target`.
    ///
    /// Returns `false` when nothing is bound; that is not an error.
    pub fn dispatch(&self, target: &str, args: Vec<Value>) -> bool {
        let handler = match self.inner.read() {
            Ok(inner) => inner.handlers.get(target).cloned(),
            Err(_) => None,
        };
        match handler {
            Some(handler) => {
                handler(args);
                true
            }
            None => {
                debug!("no handler bound for {target}");
                false
            }
        }
    }

    /// Targets with a bound handler, sorted.
    pub fn targets(&self) -> Vec<String> {
        let mut targets: Vec<String> = self
            .inner
            .read()
            .map(|inner| inner.handlers.keys().cloned().collect())
            .unwrap_or_default();
        targets.sort();
        targets
    }
}
