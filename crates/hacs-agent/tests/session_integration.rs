//! Gateway session integration tests
//!
//! Runs the session against a mock gateway on a local port.

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::SinkExt;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use hacs_agent::{GatewayConnector, GatewaySession, PairingCredential};
use hacs_core::config::AgentConfig;
use hacs_core::error::RelayError;
use hacs_core::{ConnectionState, DeviceId, Generation, IntentEngine, SessionStatus};

use common::{
    recv_json, recv_json_within, send_json, test_config, FnEngine, GatedEngine, MockGateway, WAIT,
};

struct RunningSession {
    status: watch::Receiver<SessionStatus>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RunningSession {
    fn start(
        credential: &PairingCredential,
        engine: Arc<dyn IntentEngine>,
        config: AgentConfig,
    ) -> Self {
        let connector = GatewayConnector::new(credential, config.connect_timeout);
        let session = GatewaySession::new(connector, engine, &config);
        let status = session.status();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(session.run(cancel.clone()));
        Self {
            status,
            cancel,
            handle,
        }
    }

    async fn wait_for(&mut self, pred: impl FnMut(&SessionStatus) -> bool) -> SessionStatus {
        *timeout(WAIT, self.status.wait_for(pred))
            .await
            .expect("Session did not reach the expected state in time")
            .expect("Session dropped its status channel")
    }

    async fn wait_connected(&mut self, generation: u64) -> SessionStatus {
        self.wait_for(|s| {
            s.state == ConnectionState::Connected && s.generation == Generation(generation)
        })
        .await
    }

    async fn shutdown(self) -> SessionStatus {
        self.cancel.cancel();
        timeout(WAIT, self.handle)
            .await
            .expect("Session did not stop in time")
            .expect("Session task panicked");
        *self.status.borrow()
    }
}

fn echo_engine() -> Arc<dyn IntentEngine> {
    Arc::new(FnEngine(|text: &str| -> Result<Value, RelayError> {
        Ok(json!({ "status": "ok", "echo": text }))
    }))
}

#[tokio::test]
async fn test_connects_with_bearer_token() {
    let mut gateway = MockGateway::start().await;
    let mut session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());

    let _conn = gateway.accept().await;
    let status = session.wait_connected(1).await;

    assert_eq!(status.generation, Generation(1));
    assert_eq!(gateway.auth_headers(), vec!["Bearer tok-test".to_string()]);

    session.shutdown().await;
}

#[tokio::test]
async fn test_ping_is_answered_with_pong() {
    let mut gateway = MockGateway::start().await;
    let session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());
    let mut conn = gateway.accept().await;

    for _ in 0..3 {
        send_json(&mut conn, json!({"type": "ping"})).await;
        assert_eq!(recv_json(&mut conn).await, json!({"type": "pong"}));
    }

    session.shutdown().await;
}

#[tokio::test]
async fn test_act_returns_correlated_result() {
    let mut gateway = MockGateway::start().await;
    let session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());
    let mut conn = gateway.accept().await;

    send_json(
        &mut conn,
        json!({"type": "act", "req_id": "r1", "text": "turn on lights"}),
    )
    .await;

    assert_eq!(
        recv_json(&mut conn).await,
        json!({
            "type": "act_result",
            "req_id": "r1",
            "result": {"status": "ok", "echo": "turn on lights"},
            "local": true
        })
    );

    session.shutdown().await;
}

#[tokio::test]
async fn test_every_act_gets_exactly_one_result() {
    let mut gateway = MockGateway::start().await;
    let session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());
    let mut conn = gateway.accept().await;

    let sent: HashSet<String> = (0..10).map(|i| format!("r{i}")).collect();
    for req_id in &sent {
        send_json(
            &mut conn,
            json!({"type": "act", "req_id": req_id, "text": "x"}),
        )
        .await;
    }

    let mut received = HashSet::new();
    for _ in 0..sent.len() {
        let msg = recv_json(&mut conn).await;
        assert_eq!(msg["type"], "act_result");
        assert!(received.insert(msg["req_id"].as_str().unwrap().to_string()));
    }
    assert_eq!(received, sent);
    assert!(recv_json_within(&mut conn, Duration::from_millis(200))
        .await
        .is_none());

    session.shutdown().await;
}

#[tokio::test]
async fn test_pong_not_delayed_by_slow_intent() {
    let mut gateway = MockGateway::start().await;
    let engine = Arc::new(GatedEngine::new());
    let session = RunningSession::start(&gateway.credential(), engine.clone(), test_config());
    let mut conn = gateway.accept().await;

    send_json(&mut conn, json!({"type": "act", "req_id": "slow", "text": "x"})).await;
    send_json(&mut conn, json!({"type": "ping"})).await;

    let first = recv_json_within(&mut conn, Duration::from_secs(1))
        .await
        .expect("Pong was held back by the pending intent");
    assert_eq!(first, json!({"type": "pong"}));

    engine.open();
    let result = recv_json(&mut conn).await;
    assert_eq!(result["req_id"], "slow");
    assert_eq!(result["result"], json!({"done": "x"}));

    session.shutdown().await;
}

#[tokio::test]
async fn test_unknown_and_invalid_messages_are_ignored() {
    let mut gateway = MockGateway::start().await;
    let session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());
    let mut conn = gateway.accept().await;

    send_json(&mut conn, json!({"type": "reboot"})).await;
    send_json(&mut conn, json!({"type": "act", "text": "no id"})).await;
    send_json(&mut conn, json!({"type": "pong"})).await;
    send_json(&mut conn, json!({"type": "ping"})).await;

    assert_eq!(recv_json(&mut conn).await, json!({"type": "pong"}));
    assert_eq!(gateway.attempts(), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_act_with_bad_fields_still_gets_result() {
    let mut gateway = MockGateway::start().await;
    let session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());
    let mut conn = gateway.accept().await;

    send_json(&mut conn, json!({"type": "act", "req_id": "r1"})).await;
    assert_eq!(
        recv_json(&mut conn).await,
        json!({
            "type": "act_result",
            "req_id": "r1",
            "result": {"status": "ok", "echo": ""},
            "local": true
        })
    );

    send_json(&mut conn, json!({"type": "act", "req_id": "r2", "text": 42})).await;
    assert_eq!(
        recv_json(&mut conn).await,
        json!({
            "type": "act_result",
            "req_id": "r2",
            "result": {"error": "Invalid intent request"},
            "local": true
        })
    );
    assert_eq!(gateway.attempts(), 1);

    session.shutdown().await;
}

#[tokio::test]
async fn test_malformed_frame_forces_reconnect() {
    let mut gateway = MockGateway::start().await;
    let mut session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());
    let mut conn = gateway.accept().await;
    session.wait_connected(1).await;

    conn.send(Message::Text("this is not json".into()))
        .await
        .unwrap();

    let mut conn = gateway.accept().await;
    session.wait_connected(2).await;

    send_json(&mut conn, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut conn).await, json!({"type": "pong"}));

    session.shutdown().await;
}

#[tokio::test]
async fn test_reconnects_after_gateway_close() {
    let mut gateway = MockGateway::start().await;
    let mut session = RunningSession::start(&gateway.credential(), echo_engine(), test_config());

    let mut first = gateway.accept().await;
    session.wait_connected(1).await;
    first.close(None).await.unwrap();

    let mut second = gateway.accept().await;
    let status = session.wait_connected(2).await;
    assert_eq!(status.generation, Generation(2));

    send_json(
        &mut second,
        json!({"type": "act", "req_id": "r2", "text": "again"}),
    )
    .await;
    assert_eq!(recv_json(&mut second).await["req_id"], "r2");

    session.shutdown().await;
}

#[tokio::test]
async fn test_stale_result_not_written_to_new_connection() {
    let mut gateway = MockGateway::start().await;
    let engine = Arc::new(GatedEngine::new());
    let mut session = RunningSession::start(&gateway.credential(), engine.clone(), test_config());

    let mut first = gateway.accept().await;
    session.wait_connected(1).await;
    send_json(&mut first, json!({"type": "act", "req_id": "old", "text": "x"})).await;

    let deadline = Instant::now() + WAIT;
    while engine.calls() == 0 {
        assert!(Instant::now() < deadline, "Intent never reached the engine");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    first.close(None).await.unwrap();
    let mut second = gateway.accept().await;
    session.wait_connected(2).await;

    engine.open();
    assert!(
        recv_json_within(&mut second, Duration::from_millis(300))
            .await
            .is_none(),
        "Result of the old connection leaked into the new one"
    );

    send_json(&mut second, json!({"type": "ping"})).await;
    assert_eq!(recv_json(&mut second).await, json!({"type": "pong"}));

    session.shutdown().await;
}

#[tokio::test]
async fn test_backoff_after_rejected_handshakes() {
    let mut gateway = MockGateway::rejecting(2).await;
    let config = test_config();
    let initial = config.backoff.initial;

    let started = Instant::now();
    let mut session = RunningSession::start(&gateway.credential(), echo_engine(), config);
    let _conn = gateway.accept().await;
    let status = session.wait_connected(1).await;

    // 50ms after the first failure, 100ms after the second
    assert!(started.elapsed() >= initial * 3);
    assert_eq!(gateway.attempts(), 3);
    assert_eq!(status.backoff, initial);

    session.shutdown().await;
}

#[tokio::test]
async fn test_backoff_persists_without_reset() {
    let mut gateway = MockGateway::rejecting(2).await;
    let config = AgentConfig {
        reset_backoff_on_connect: false,
        ..test_config()
    };
    let initial = config.backoff.initial;

    let mut session = RunningSession::start(&gateway.credential(), echo_engine(), config);
    let _conn = gateway.accept().await;
    let status = session.wait_connected(1).await;

    assert_eq!(status.backoff, initial * 4);

    session.shutdown().await;
}

#[tokio::test]
async fn test_idle_connection_is_replaced() {
    let mut gateway = MockGateway::start().await;
    let config = AgentConfig {
        heartbeat_timeout: Some(Duration::from_millis(200)),
        ..test_config()
    };
    let mut session = RunningSession::start(&gateway.credential(), echo_engine(), config);

    let _silent = gateway.accept().await;
    session.wait_connected(1).await;

    let _next = gateway.accept().await;
    session.wait_connected(2).await;

    session.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_intents() {
    let mut gateway = MockGateway::start().await;
    let engine = Arc::new(GatedEngine::new());
    let mut session = RunningSession::start(&gateway.credential(), engine.clone(), test_config());

    let mut conn = gateway.accept().await;
    session.wait_connected(1).await;
    send_json(&mut conn, json!({"type": "act", "req_id": "r1", "text": "x"})).await;

    let deadline = Instant::now() + WAIT;
    while engine.calls() == 0 {
        assert!(Instant::now() < deadline, "Intent never reached the engine");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let gate = engine.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        gate.open();
    });

    let started = Instant::now();
    let status = session.shutdown().await;
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert!(
        started.elapsed() < test_config().shutdown_grace,
        "Shutdown waited out the whole grace period"
    );

    assert_eq!(recv_json(&mut conn).await["req_id"], "r1");
    assert!(recv_json_within(&mut conn, Duration::from_secs(1))
        .await
        .is_none());
}

#[tokio::test]
async fn test_shutdown_while_disconnected() {
    let credential = PairingCredential {
        device_id: DeviceId::new("dev-test"),
        token: "tok-test".to_string(),
        gateway_url: format!("ws://127.0.0.1:{}/session", common::closed_port()),
        expires_in: None,
    };
    let mut session = RunningSession::start(&credential, echo_engine(), test_config());

    let status = session
        .wait_for(|s| s.state == ConnectionState::Disconnected && s.backoff > Duration::ZERO)
        .await;
    assert_eq!(status.generation, Generation::NONE);

    let status = session.shutdown().await;
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(status.generation, Generation::NONE);
}
