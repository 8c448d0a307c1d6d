//! Shared test utilities for integration tests.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use chat_core::config::AppConfig;
use chat_core::error::{ChatError, ChatResult};
use chat_hub::{
    ChannelFactory, ChannelOptions, ConnectionManager, ConnectionState, HandlerRegistry,
    HubChannel, InboundHandler, PrivateMessageSink,
};
use chat_models::{MessageId, PrivateMessage};

/// A command the mock channel accepted.
#[derive(Debug, Clone)]
pub struct SentCommand {
    pub method: String,
    pub args: Vec<Value>,
    pub at: Instant,
}

/// In-memory hub channel.
///
/// Starts instantly, records every accepted send, and lets tests push
/// inbound invocations and state changes by hand.
pub struct MockChannel {
    pub options: ChannelOptions,
    registry: HandlerRegistry,
    state_tx: watch::Sender<ConnectionState>,
    sent: Mutex<Vec<SentCommand>>,
    targets_at_start: Mutex<Vec<String>>,
    send_attempts: AtomicUsize,
    stop_calls: AtomicUsize,
    fail_start: AtomicBool,
    fail_sends: AtomicBool,
}

impl MockChannel {
    pub fn new(options: ChannelOptions) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Unstarted);
        Self {
            options,
            registry: HandlerRegistry::new(),
            state_tx,
            sent: Mutex::new(Vec::new()),
            targets_at_start: Mutex::new(Vec::new()),
            send_attempts: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            fail_start: AtomicBool::new(false),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// A mock channel that is already connected.
    pub fn connected() -> Arc<Self> {
        let channel = Arc::new(Self::new(ChannelOptions::new("http://mock/chathub")));
        channel.set_state(ConnectionState::Connected);
        channel
    }

    pub fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_replace(state);
    }

    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Simulate the server invoking `target`.
    pub fn deliver(&self, target: &str, args: Vec<Value>) -> bool {
        self.registry.dispatch(target, args)
    }

    pub fn sent(&self) -> Vec<SentCommand> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_methods(&self) -> Vec<String> {
        self.sent().into_iter().map(|c| c.method).collect()
    }

    pub fn sent_count(&self, method: &str) -> usize {
        self.sent().iter().filter(|c| c.method == method).count()
    }

    pub fn send_attempts(&self) -> usize {
        self.send_attempts.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Targets that had handlers when `start` was called.
    pub fn targets_at_start(&self) -> Vec<String> {
        self.targets_at_start.lock().unwrap().clone()
    }
}

#[async_trait]
impl HubChannel for MockChannel {
    fn on(&self, target: &str, handler: InboundHandler) -> ChatResult<()> {
        self.registry.bind(target, handler)
    }

    async fn start(&self) -> ChatResult<()> {
        if self.stop_calls() > 0 {
            return Err(ChatError::Disposed);
        }
        *self.targets_at_start.lock().unwrap() = self.registry.targets();
        self.registry.seal();
        self.set_state(ConnectionState::Connecting);
        if self.fail_start.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Disconnected);
            return Err(ChatError::Connection("connection refused".into()));
        }
        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    async fn send(&self, method: &str, args: Vec<Value>) -> ChatResult<()> {
        self.send_attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChatError::send(method, "transport write failed"));
        }
        let state = self.state();
        if state != ConnectionState::Connected {
            return Err(ChatError::send(method, format!("channel is {state}")));
        }
        self.sent.lock().unwrap().push(SentCommand {
            method: method.to_string(),
            args,
            at: Instant::now(),
        });
        Ok(())
    }

    async fn stop(&self) {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectionState::Disposed);
    }

    fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }
}

/// Factory handing out [`MockChannel`]s and keeping them for inspection.
#[derive(Default)]
pub struct MockFactory {
    built: Mutex<Vec<Arc<MockChannel>>>,
    fail_start: AtomicBool,
}

impl MockFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Channels built from now on fail to start.
    pub fn failing() -> Arc<Self> {
        let factory = Self::default();
        factory.fail_start.store(true, Ordering::SeqCst);
        Arc::new(factory)
    }

    pub fn built(&self) -> usize {
        self.built.lock().unwrap().len()
    }

    /// The most recently built channel.
    pub fn channel(&self) -> Arc<MockChannel> {
        self.built
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no channel built yet")
    }
}

impl ChannelFactory for MockFactory {
    fn build(&self, options: ChannelOptions) -> Arc<dyn HubChannel> {
        let channel = Arc::new(MockChannel::new(options));
        channel
            .fail_start
            .store(self.fail_start.load(Ordering::SeqCst), Ordering::SeqCst);
        self.built.lock().unwrap().push(channel.clone());
        channel
    }
}

/// Private message events captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Received(PrivateMessage),
    Sent(PrivateMessage),
    Read(String, Vec<MessageId>),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<SinkEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl PrivateMessageSink for RecordingSink {
    fn on_private_message_received(&self, message: PrivateMessage) {
        self.events.lock().unwrap().push(SinkEvent::Received(message));
    }

    fn on_private_message_sent(&self, message: PrivateMessage) {
        self.events.lock().unwrap().push(SinkEvent::Sent(message));
    }

    fn on_private_messages_read(&self, username: String, message_ids: Vec<MessageId>) {
        self.events
            .lock()
            .unwrap()
            .push(SinkEvent::Read(username, message_ids));
    }
}

/// Configuration pointing at `https://x`.
pub fn create_test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.hub.base_url = "https://x".into();
    config
}

/// A manager over a fresh [`MockFactory`].
pub fn create_test_manager() -> (ConnectionManager, Arc<MockFactory>) {
    let factory = MockFactory::new();
    let manager = ConnectionManager::new(create_test_config(), factory.clone(), None);
    (manager, factory)
}

/// A manager whose private message events go to a [`RecordingSink`].
pub fn create_test_manager_with_sink() -> (ConnectionManager, Arc<MockFactory>, Arc<RecordingSink>) {
    let factory = MockFactory::new();
    let sink = Arc::new(RecordingSink::default());
    let manager = ConnectionManager::new(
        create_test_config(),
        factory.clone(),
        Some(sink.clone() as Arc<dyn PrivateMessageSink>),
    );
    (manager, factory, sink)
}
