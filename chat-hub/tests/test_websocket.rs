//! WebSocket transport integration tests.
//!
//! Runs the connection manager against an in-process hub that speaks the
//! JSON hub protocol over tokio-tungstenite.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::Message;

use chat_core::config::AppConfig;
use chat_core::error::ChatError;
use chat_hub::protocol::{HubMessage, RECORD_SEPARATOR};
use chat_hub::{ConnectionManager, ConnectionState, MuteStatus};

/// How the test hub treats one incoming connection.
#[derive(Clone)]
enum Session {
    /// Refuse the upgrade with this HTTP status.
    Reject(StatusCode),
    /// Complete the handshake, push these records, then echo what the client sends.
    Serve(Vec<HubMessage>),
    /// Accept the upgrade, read the handshake, then close without answering.
    Hangup,
}

struct TestHub {
    addr: SocketAddr,
    /// Authorization header of every upgrade request.
    auth_headers: Arc<Mutex<Vec<Option<String>>>>,
    /// Records received from clients after the handshake.
    received: mpsc::UnboundedReceiver<Value>,
}

impl TestHub {
    fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    fn auth_headers(&self) -> Vec<Option<String>> {
        self.auth_headers.lock().unwrap().clone()
    }

    /// Next received invocation other than heartbeat pings.
    async fn next_invocation(&mut self) -> Value {
        loop {
            let record = tokio::time::timeout(Duration::from_secs(5), self.received.recv())
                .await
                .expect("no record from client")
                .expect("hub stopped");
            if record["type"] == 1 && record["target"] != "Ping" {
                return record;
            }
        }
    }
}

/// Start a hub that plays `sessions` in order, repeating the last one.
async fn spawn_hub(sessions: Vec<Session>) -> TestHub {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let auth_headers = Arc::new(Mutex::new(Vec::new()));
    let (tx, received) = mpsc::unbounded_channel();
    let accepted = Arc::new(AtomicUsize::new(0));

    let headers = auth_headers.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = accepted.fetch_add(1, Ordering::SeqCst).min(sessions.len() - 1);
            let session = sessions[index].clone();
            let headers = headers.clone();
            let tx = tx.clone();
            tokio::spawn(serve_connection(stream, session, headers, tx));
        }
    });

    TestHub {
        addr,
        auth_headers,
        received,
    }
}

async fn serve_connection(
    stream: tokio::net::TcpStream,
    session: Session,
    headers: Arc<Mutex<Vec<Option<String>>>>,
    tx: mpsc::UnboundedSender<Value>,
) {
    let reject = match &session {
        Session::Reject(status) => Some(*status),
        Session::Serve(_) | Session::Hangup => None,
    };
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        let auth = req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(String::from);
        headers.lock().unwrap().push(auth);
        match reject {
            Some(status) => {
                let mut err = ErrorResponse::new(None);
                *err.status_mut() = status;
                Err(err)
            }
            None => Ok(resp),
        }
    };
    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
        return;
    };
    let records = match session {
        Session::Serve(records) => records,
        Session::Hangup => {
            let _ = ws.next().await;
            let _ = ws.close(None).await;
            return;
        }
        Session::Reject(_) => return,
    };

    match ws.next().await {
        Some(Ok(Message::Text(text))) => {
            let handshake: Value =
                serde_json::from_str(text.trim_end_matches(RECORD_SEPARATOR)).unwrap();
            assert_eq!(handshake, json!({"protocol": "json", "version": 1}));
        }
        _ => return,
    }
    let _ = ws.send(Message::Text(format!("{{}}{RECORD_SEPARATOR}"))).await;
    for record in records {
        let _ = ws.send(Message::Text(record.to_frame())).await;
    }

    while let Some(Ok(message)) = ws.next().await {
        if let Message::Text(text) = message {
            for record in text.split(RECORD_SEPARATOR).filter(|r| !r.is_empty()) {
                if let Ok(value) = serde_json::from_str::<Value>(record) {
                    let _ = tx.send(value);
                }
            }
        }
    }
}

fn hub_config(hub: &TestHub) -> AppConfig {
    let mut config = AppConfig::default();
    config.hub.base_url = hub.base_url();
    config.hub.connect_timeout_ms = 5_000;
    config.reconnect.base_delay_ms = 10;
    config
}

async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    let mut rx = manager.state_receiver();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .unwrap_or_else(|_| panic!("state never became {state}"))
        .unwrap();
}

#[tokio::test]
async fn end_to_end_events_and_commands() {
    let mut hub = spawn_hub(vec![Session::Serve(vec![HubMessage::invocation(
        "ChannelMuteStatusChanged",
        vec![json!("general"), json!(true)],
    )])])
    .await;

    let manager = ConnectionManager::with_websocket(hub_config(&hub), None);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    manager
        .router()
        .on_channel_mute_status_changed()
        .subscribe(move |s: &MuteStatus| {
            let _ = events_tx.send(s.clone());
        });

    manager.initialize(Some("abc123".into())).await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(hub.auth_headers(), vec![Some("Bearer abc123".to_string())]);

    let status = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        status,
        MuteStatus {
            channel: "general".into(),
            is_muted: true
        }
    );

    manager
        .commands()
        .join_channel("alice", "general")
        .await
        .unwrap();
    let record = hub.next_invocation().await;
    assert_eq!(record["target"], "JoinChannel");
    assert_eq!(record["arguments"], json!(["alice", "general"]));

    manager.dispose().await;
    assert_eq!(manager.state(), ConnectionState::Disposed);
}

#[tokio::test]
async fn rejected_token_fails_initialize() {
    let hub = spawn_hub(vec![Session::Reject(StatusCode::UNAUTHORIZED)]).await;
    let manager = ConnectionManager::with_websocket(hub_config(&hub), None);

    let err = manager.initialize(Some("expired".into())).await.unwrap_err();
    assert!(matches!(err, ChatError::AuthFailed(_)));
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    manager.dispose().await;
}

#[tokio::test]
async fn close_during_handshake_fails_initialize() {
    let hub = spawn_hub(vec![Session::Hangup]).await;
    let manager = ConnectionManager::with_websocket(hub_config(&hub), None);

    let err = manager.initialize(None).await.unwrap_err();
    assert!(matches!(err, ChatError::ConnectionClosed(_)));
    assert!(err.is_connection_error());
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    manager.dispose().await;
}

#[tokio::test]
async fn close_without_reconnect_is_terminal() {
    let hub = spawn_hub(vec![Session::Serve(vec![HubMessage::Close {
        error: Some("server shutting down".into()),
        allow_reconnect: false,
    }])])
    .await;
    let manager = ConnectionManager::with_websocket(hub_config(&hub), None);

    manager.initialize(None).await.unwrap();
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert_eq!(hub.auth_headers().len(), 1);
    manager.dispose().await;
}

#[tokio::test]
async fn reconnects_with_same_token_after_drop() {
    let hub = spawn_hub(vec![
        Session::Serve(vec![HubMessage::Close {
            error: None,
            allow_reconnect: true,
        }]),
        Session::Serve(vec![HubMessage::invocation(
            "MessageBlocked",
            vec![json!("after reconnect")],
        )]),
    ])
    .await;

    let manager = ConnectionManager::with_websocket(hub_config(&hub), None);
    let (events_tx, mut events) = mpsc::unbounded_channel();
    manager
        .router()
        .on_message_blocked()
        .subscribe(move |reason: &String| {
            let _ = events_tx.send(reason.clone());
        });

    manager.initialize(Some("abc123".into())).await.unwrap();

    let reason = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("no event after reconnect")
        .unwrap();
    assert_eq!(reason, "after reconnect");
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(
        hub.auth_headers(),
        vec![
            Some("Bearer abc123".to_string()),
            Some("Bearer abc123".to_string())
        ]
    );
    manager.dispose().await;
}

#[tokio::test]
async fn exhausted_retries_end_disconnected() {
    let hub = spawn_hub(vec![
        Session::Serve(vec![HubMessage::Close {
            error: Some("restarting".into()),
            allow_reconnect: true,
        }]),
        Session::Reject(StatusCode::SERVICE_UNAVAILABLE),
    ])
    .await;

    let mut config = hub_config(&hub);
    config.reconnect.max_attempts = 1;
    let manager = ConnectionManager::with_websocket(config, None);
    let mut states = manager.state_receiver();

    manager.initialize(None).await.unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        states.wait_for(|s| *s == ConnectionState::Reconnecting),
    )
    .await
    .expect("never started reconnecting")
    .unwrap();
    wait_for_state(&manager, ConnectionState::Disconnected).await;

    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(hub.auth_headers().len(), 2);
    assert!(matches!(
        manager.commands().leave_channel("general").await,
        Err(ChatError::Send { .. })
    ));
    manager.dispose().await;
}

#[tokio::test]
async fn dispose_during_initialize_returns_disposed() {
    // Accepts TCP but never answers the upgrade.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _hold = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });

    let mut config = AppConfig::default();
    config.hub.base_url = format!("http://{addr}");
    let manager = Arc::new(ConnectionManager::with_websocket(config, None));

    let init = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.initialize(None).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    manager.dispose().await;

    let result = tokio::time::timeout(Duration::from_secs(5), init)
        .await
        .expect("initialize did not return after dispose")
        .unwrap();
    assert!(matches!(result, Err(ChatError::Disposed)));
    assert_eq!(manager.state(), ConnectionState::Disposed);
}
