//! WebSocket hub channel.
//!
//! Speaks the JSON hub protocol over a WebSocket, handling:
//! - Bearer token and custom headers on every (re)connect
//! - Handshake with a bounded connect timeout
//! - In-order dispatch of inbound invocations through the handler registry
//! - Protocol keepalive pings and a server-silence timeout
//! - Automatic reconnection with exponential backoff and jitter
//! - Write-acknowledged outbound invocations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderName, HeaderValue, AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use chat_core::error::{ChatError, ChatResult};

use crate::channel::{ChannelFactory, ChannelOptions, HandlerRegistry, HubChannel, InboundHandler};
use crate::events::ConnectionState;
use crate::protocol::{self, HubMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Outbound queue depth. Senders wait when it is full.
const OUTBOUND_QUEUE_CAPACITY: usize = 256;

/// An invocation waiting to be written, with its write acknowledgement.
struct OutboundFrame {
    method: String,
    payload: String,
    ack: oneshot::Sender<ChatResult<()>>,
}

/// Why a connected session ended.
#[derive(Debug)]
enum SessionEnd {
    /// The owner asked the channel to stop.
    Shutdown,
    /// The transport dropped or the server closed the connection.
    Lost { reason: String, allow_reconnect: bool },
}

/// Builds [`WebSocketChannel`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketChannelFactory;

impl ChannelFactory for WebSocketChannelFactory {
    fn build(&self, options: ChannelOptions) -> Arc<dyn HubChannel> {
        Arc::new(WebSocketChannel::new(options))
    }
}

/// Hub channel over a WebSocket.
pub struct WebSocketChannel {
    options: ChannelOptions,
    registry: Arc<HandlerRegistry>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    /// Taken by the connection task when the channel starts.
    outbound_rx: Mutex<Option<mpsc::Receiver<OutboundFrame>>>,
    /// Handle to the background connection task.
    task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    /// Signals a stop request to `start` or the connection task.
    shutdown: Arc<Notify>,
    stopped: AtomicBool,
}

impl WebSocketChannel {
    pub fn new(options: ChannelOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Unstarted);
        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        Self {
            options,
            registry: Arc::new(HandlerRegistry::new()),
            state_tx: Arc::new(state_tx),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            task: tokio::sync::Mutex::new(None),
            shutdown: Arc::new(Notify::new()),
            stopped: AtomicBool::new(false),
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        set_state(&self.state_tx, new_state);
    }
}

/// Update the connection state and notify watchers.
fn set_state(state_tx: &watch::Sender<ConnectionState>, new_state: ConnectionState) {
    state_tx.send_if_modified(|state| {
        if *state == new_state {
            return false;
        }
        info!("hub state: {} -> {}", *state, new_state);
        *state = new_state;
        true
    });
}

#[async_trait]
impl HubChannel for WebSocketChannel {
    fn on(&self, target: &str, handler: InboundHandler) -> ChatResult<()> {
        self.registry.bind(target, handler)
    }

    async fn start(&self) -> ChatResult<()> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(ChatError::Disposed);
        }
        let current = self.state();
        if current != ConnectionState::Unstarted {
            return Err(ChatError::Connection(format!(
                "channel already started (state: {current})"
            )));
        }

        self.registry.seal();
        self.set_state(ConnectionState::Connecting);
        info!(
            "hub connecting to {} (auth: {})",
            self.options.endpoint,
            if self.options.token_provider.is_some() {
                "bearer"
            } else {
                "none"
            }
        );

        let established = tokio::select! {
            result = establish(&self.options) => result,
            _ = self.shutdown.notified() => {
                Err(ChatError::Connection("channel stopped while connecting".into()))
            }
        };

        let (ws, pending) = match established {
            Ok(connection) => connection,
            Err(e) => {
                error!("hub connection failed: {e}");
                if !self.stopped.load(Ordering::SeqCst) {
                    self.set_state(ConnectionState::Disconnected);
                }
                return Err(e);
            }
        };

        let mut task = self.task.lock().await;
        if self.stopped.load(Ordering::SeqCst) {
            let mut ws = ws;
            let _ = ws.close(None).await;
            return Err(ChatError::Disposed);
        }
        let outbound_rx = self
            .outbound_rx
            .lock()
            .map_err(|_| ChatError::Internal("outbound queue poisoned".into()))?
            .take()
            .ok_or_else(|| ChatError::Internal("outbound queue already taken".into()))?;

        self.set_state(ConnectionState::Connected);

        let connection = ConnectionTask {
            options: self.options.clone(),
            registry: self.registry.clone(),
            state_tx: self.state_tx.clone(),
            outbound_rx,
            shutdown: self.shutdown.clone(),
        };
        *task = Some(tokio::spawn(connection.run(ws, pending)));
        Ok(())
    }

    async fn send(&self, method: &str, args: Vec<Value>) -> ChatResult<()> {
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(ChatError::send(method, format!("channel is {state}")));
        }

        let (ack, ack_rx) = oneshot::channel();
        let frame = OutboundFrame {
            method: method.to_string(),
            payload: HubMessage::invocation(method, args).to_frame(),
            ack,
        };
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| ChatError::send(method, "connection task is not running"))?;

        ack_rx
            .await
            .map_err(|_| ChatError::send(method, "connection closed before the frame was written"))?
    }

    async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            debug!("hub channel already stopped");
            return;
        }
        self.shutdown.notify_one();

        let handle = self.task.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!("hub connection task ended abnormally: {e}");
            }
        }

        self.set_state(ConnectionState::Disposed);
        info!("hub channel stopped");
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        // Best effort when the owner never called stop().
        if let Ok(mut task) = self.task.try_lock() {
            if let Some(handle) = task.take() {
                handle.abort();
            }
        }
    }
}

/// Background task owning the WebSocket for the lifetime of the channel.
struct ConnectionTask {
    options: ChannelOptions,
    registry: Arc<HandlerRegistry>,
    state_tx: Arc<watch::Sender<ConnectionState>>,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    shutdown: Arc<Notify>,
}

impl ConnectionTask {
    async fn run(mut self, mut ws: WsStream, mut pending: Vec<HubMessage>) {
        loop {
            let end = self.pump(&mut ws, std::mem::take(&mut pending)).await;
            let (reason, allow_reconnect) = match end {
                SessionEnd::Shutdown => {
                    debug!("hub connection task shutting down");
                    return;
                }
                SessionEnd::Lost {
                    reason,
                    allow_reconnect,
                } => (reason, allow_reconnect),
            };

            warn!("hub connection lost: {reason}");
            let _ = ws.close(None).await;

            if !allow_reconnect {
                info!("server does not allow reconnecting");
                set_state(&self.state_tx, ConnectionState::Disconnected);
                return;
            }

            match self.reconnect().await {
                Some((new_ws, new_pending)) => {
                    ws = new_ws;
                    pending = new_pending;
                    set_state(&self.state_tx, ConnectionState::Connected);
                }
                None => return,
            }
        }
    }

    /// Drive one connected session until it ends.
    async fn pump(&mut self, ws: &mut WsStream, pending: Vec<HubMessage>) -> SessionEnd {
        for message in pending {
            if let Some(end) = self.handle_message(message) {
                return end;
            }
        }

        let keep_alive_every = self.options.keep_alive_interval;
        let mut keep_alive = tokio::time::interval_at(Instant::now() + keep_alive_every, keep_alive_every);
        let server_timeout = self.options.server_timeout;
        let mut last_received = Instant::now();

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    let _ = ws.close(None).await;
                    return SessionEnd::Shutdown;
                }
                frame = self.outbound_rx.recv() => {
                    let Some(frame) = frame else {
                        // The channel handle was dropped.
                        let _ = ws.close(None).await;
                        return SessionEnd::Shutdown;
                    };
                    trace!("hub send: {}", frame.method);
                    match ws.send(Message::Text(frame.payload)).await {
                        Ok(()) => {
                            let _ = frame.ack.send(Ok(()));
                        }
                        Err(e) => {
                            let reason = format!("write failed: {e}");
                            let _ = frame.ack.send(Err(ChatError::send(&frame.method, reason.clone())));
                            return SessionEnd::Lost { reason, allow_reconnect: true };
                        }
                    }
                }
                _ = keep_alive.tick() => {
                    if let Err(e) = ws.send(Message::Text(HubMessage::Ping.to_frame())).await {
                        return SessionEnd::Lost {
                            reason: format!("keepalive ping failed: {e}"),
                            allow_reconnect: true,
                        };
                    }
                }
                _ = tokio::time::sleep_until(last_received + server_timeout) => {
                    return SessionEnd::Lost {
                        reason: format!("no message from server in {server_timeout:?}"),
                        allow_reconnect: true,
                    };
                }
                incoming = ws.next() => {
                    last_received = Instant::now();
                    match incoming {
                        Some(Ok(Message::Text(text))) => {
                            for message in protocol::parse_frame(&text) {
                                if let Some(end) = self.handle_message(message) {
                                    return end;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let reason = frame
                                .map(|f| format!("closed by server ({}): {}", u16::from(f.code), f.reason))
                                .unwrap_or_else(|| "closed by server".to_string());
                            return SessionEnd::Lost { reason, allow_reconnect: true };
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            return SessionEnd::Lost {
                                reason: e.to_string(),
                                allow_reconnect: true,
                            };
                        }
                        None => {
                            return SessionEnd::Lost {
                                reason: "stream ended".into(),
                                allow_reconnect: true,
                            };
                        }
                    }
                }
            }
        }
    }

    /// Act on one decoded message. Returns `Some` when the session must end.
    fn handle_message(&self, message: HubMessage) -> Option<SessionEnd> {
        match message {
            HubMessage::Invocation {
                target, arguments, ..
            } => {
                trace!("hub event: {target}");
                self.registry.dispatch(&target, arguments);
                None
            }
            HubMessage::Ping => None,
            HubMessage::Completion {
                invocation_id,
                error,
                ..
            } => {
                if let Some(error) = error {
                    warn!("hub invocation {invocation_id} failed: {error}");
                }
                None
            }
            HubMessage::Close {
                error,
                allow_reconnect,
            } => Some(SessionEnd::Lost {
                reason: error.unwrap_or_else(|| "server closed the connection".into()),
                allow_reconnect,
            }),
            HubMessage::Other(kind) => {
                debug!("ignoring hub message type {kind}");
                None
            }
        }
    }

    /// Reconnect with backoff.
    ///
    /// Runs until a connection is re-established, the attempt limit is
    /// reached, or a stop is requested. Returns `None` in the latter two cases.
    async fn reconnect(&mut self) -> Option<(WsStream, Vec<HubMessage>)> {
        let Some(config) = self.options.reconnect.clone() else {
            info!("automatic reconnection disabled");
            set_state(&self.state_tx, ConnectionState::Disconnected);
            return None;
        };

        set_state(&self.state_tx, ConnectionState::Reconnecting);
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            if !config.allows(attempt) {
                error!("max reconnection attempts ({}) reached", config.max_attempts);
                set_state(&self.state_tx, ConnectionState::Disconnected);
                return None;
            }

            let delay = config.delay(attempt - 1);
            warn!(
                "reconnection attempt {} in {:.1}s",
                attempt,
                delay.as_secs_f64()
            );

            if !self.wait_or_shutdown(delay).await {
                info!("reconnection cancelled by stop request");
                return None;
            }

            let result = tokio::select! {
                result = establish(&self.options) => result,
                _ = self.shutdown.notified() => {
                    info!("reconnection cancelled by stop request");
                    return None;
                }
            };

            match result {
                Ok(connection) => {
                    info!("reconnected successfully after {attempt} attempt(s)");
                    return Some(connection);
                }
                Err(e) => error!("reconnection attempt {attempt} failed: {e}"),
            }
        }
    }

    /// Sleep for `delay`, rejecting outbound frames meanwhile.
    /// Returns `false` when a stop was requested.
    async fn wait_or_shutdown(&mut self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return true,
                _ = self.shutdown.notified() => return false,
                frame = self.outbound_rx.recv() => match frame {
                    Some(frame) => {
                        let _ = frame
                            .ack
                            .send(Err(ChatError::send(&frame.method, "channel is reconnecting")));
                    }
                    None => return false,
                },
            }
        }
    }
}

/// Convert an http(s) endpoint into its ws(s) form.
pub fn websocket_url(endpoint: &str) -> ChatResult<String> {
    let endpoint = endpoint.trim();
    if let Some(rest) = endpoint.strip_prefix("https://") {
        Ok(format!("wss://{rest}"))
    } else if let Some(rest) = endpoint.strip_prefix("http://") {
        Ok(format!("ws://{rest}"))
    } else if endpoint.starts_with("ws://") || endpoint.starts_with("wss://") {
        Ok(endpoint.to_string())
    } else {
        Err(ChatError::Config(format!(
            "hub endpoint must use http, https, ws or wss: {endpoint}"
        )))
    }
}

fn install_crypto_provider() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Open the WebSocket and complete the hub handshake.
///
/// Returns the stream and any messages that arrived with the handshake response.
async fn establish(options: &ChannelOptions) -> ChatResult<(WsStream, Vec<HubMessage>)> {
    let url = websocket_url(&options.endpoint)?;
    if url.starts_with("wss://") {
        install_crypto_provider();
    }

    let mut request = url
        .as_str()
        .into_client_request()
        .map_err(|e| ChatError::Config(format!("invalid hub endpoint {url}: {e}")))?;

    let headers = request.headers_mut();
    for (name, value) in &options.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ChatError::Config(format!("invalid header name {name}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ChatError::Config(format!("invalid value for header {name}: {e}")))?;
        headers.insert(name, value);
    }
    if let Some(token) = options.access_token() {
        let value = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| ChatError::AuthFailed(format!("token is not a valid header value: {e}")))?;
        headers.insert(AUTHORIZATION, value);
    }

    let connect = async {
        let (mut ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(map_connect_error)?;
        debug!("websocket open to {url}, sending handshake");

        ws.send(Message::Text(protocol::handshake_request()))
            .await
            .map_err(|e| ChatError::Connection(format!("failed to send handshake: {e}")))?;

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let pending = protocol::parse_handshake_response(&text)?;
                    return Ok((ws, pending));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ChatError::ConnectionClosed("closed during handshake".into()));
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    return Err(ChatError::Connection(format!("handshake failed: {e}")));
                }
            }
        }
    };

    tokio::time::timeout(options.connect_timeout, connect)
        .await
        .map_err(|_| {
            ChatError::Timeout(format!(
                "connect and handshake exceeded {:?}",
                options.connect_timeout
            ))
        })?
}

fn map_connect_error(e: tokio_tungstenite::tungstenite::Error) -> ChatError {
    use tokio_tungstenite::tungstenite::Error;
    match e {
        Error::Http(response) => match response.status().as_u16() {
            401 => ChatError::AuthFailed("hub rejected the bearer token (401)".into()),
            403 => ChatError::AuthFailed("access to the hub is forbidden (403)".into()),
            code => ChatError::Connection(format!("hub upgrade failed with HTTP {code}")),
        },
        other => ChatError::Connection(format!("connect failed: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_websocket_url_conversion() {
        assert_eq!(websocket_url("https://x/chathub").unwrap(), "wss://x/chathub");
        assert_eq!(
            websocket_url("http://localhost:5000/chathub").unwrap(),
            "ws://localhost:5000/chathub"
        );
        assert_eq!(websocket_url("ws://h/chathub").unwrap(), "ws://h/chathub");
        assert!(websocket_url("ftp://h/chathub").is_err());
    }

    #[tokio::test]
    async fn test_new_channel_is_unstarted() {
        let channel = WebSocketChannel::new(ChannelOptions::new("http://127.0.0.1:1/chathub"));
        assert_eq!(channel.state(), ConnectionState::Unstarted);
        let err = channel.send("Ping", vec![]).await.unwrap_err();
        assert!(matches!(err, ChatError::Send { .. }));
    }

    #[tokio::test]
    async fn test_start_fails_when_nothing_listens() {
        let mut options = ChannelOptions::new("http://127.0.0.1:1/chathub");
        options.connect_timeout = Duration::from_secs(2);
        let channel = WebSocketChannel::new(options);

        let err = channel.start().await.unwrap_err();
        assert!(err.is_connection_error());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_stop_before_start_is_terminal() {
        let channel = WebSocketChannel::new(ChannelOptions::new("http://127.0.0.1:1/chathub"));
        channel.stop().await;
        channel.stop().await;
        assert_eq!(channel.state(), ConnectionState::Disposed);
        assert!(matches!(channel.start().await, Err(ChatError::Disposed)));
    }

    #[test]
    fn test_bind_after_seal_fails() {
        let channel = WebSocketChannel::new(ChannelOptions::new("http://h/chathub"));
        channel.on("UserJoined", Arc::new(|_args| {})).unwrap();
        channel.registry.seal();
        assert!(channel.on("UserLeft", Arc::new(|_args| {})).is_err());
    }
}
