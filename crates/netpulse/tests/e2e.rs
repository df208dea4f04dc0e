// SPDX-FileCopyrightText: 2026 Netpulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: a real hub on an ephemeral port, driven by the real
//! agent client and raw protocol clients. Each test owns an isolated
//! harness with temp SQLite; tests are independent and order-insensitive.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use netpulse_agent::{Agent, AgentEvent, EchoHandler};
use netpulse_core::{CommandStatus, LeaseStore, SESSION_TOKEN_HEADER};
use netpulse_test_utils::{HubHarness, OPERATOR_TOKEN};

fn ws_base(http_base: &str) -> String {
    http_base.replacen("http://", "ws://", 1)
}

/// Poll a command over the operator API until it reaches `want` or the
/// deadline passes.
async fn await_command_status(
    client: &reqwest::Client,
    base_url: &str,
    command_id: &str,
    want: CommandStatus,
) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let response = client
            .get(format!("{base_url}/v1/commands/{command_id}"))
            .bearer_auth(OPERATOR_TOKEN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: serde_json::Value = response.json().await.unwrap();
        if body["status"] == serde_json::json!(want) {
            assert!(body["claim_token"].is_null(), "resolved commands carry no token");
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("command {command_id} stuck at {}", body["status"]);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

// ---- Push path: enqueue -> socket push -> execute -> result -> observers ----

#[tokio::test]
async fn command_pushed_over_socket_completes_end_to_end() {
    let hub = HubHarness::start().await.unwrap();
    hub.register_device("pi-01", "acme", "hunter2").await.unwrap();

    let mut agent = Agent::new(hub.agent_config("pi-01", "hunter2"), Arc::new(EchoHandler));
    let mut events = agent.events().subscribe();
    agent.start().await.unwrap();

    // Wait for the live channel before enqueueing, so this exercises push.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        tokio::select! {
            envelope = events.recv() => {
                if matches!(envelope.unwrap().event, AgentEvent::ChannelConnected) {
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => panic!("channel never connected"),
        }
    }

    let client = reqwest::Client::new();
    let created: serde_json::Value = client
        .post(format!("{}/v1/commands", hub.base_url))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({
            "device_id": "pi-01",
            "kind": "ping",
            "payload": {"target": "192.0.2.1"},
            "priority": 3,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let command_id = created["id"].as_str().unwrap().to_string();

    await_command_status(&client, &hub.base_url, &command_id, CommandStatus::Completed).await;

    agent.stop().await;
}

// ---- Poll path: work queued before the device appears is still delivered ----

#[tokio::test]
async fn commands_enqueued_while_offline_are_claimed_on_poll() {
    let hub = HubHarness::start().await.unwrap();
    hub.register_device("pi-02", "acme", "hunter2").await.unwrap();

    // The device is offline; the queue holds the work.
    let first = hub
        .queue
        .enqueue("pi-02", "api", "dns_lookup", serde_json::json!({"name": "example.com"}), 1)
        .await
        .unwrap();
    let second = hub
        .queue
        .enqueue("pi-02", "api", "ping", serde_json::json!({"target": "192.0.2.7"}), 5)
        .await
        .unwrap();

    let mut agent = Agent::new(hub.agent_config("pi-02", "hunter2"), Arc::new(EchoHandler));
    agent.start().await.unwrap();

    let client = reqwest::Client::new();
    // Both resolve regardless of which path carried them.
    await_command_status(&client, &hub.base_url, &second.id, CommandStatus::Completed).await;
    await_command_status(&client, &hub.base_url, &first.id, CommandStatus::Completed).await;

    agent.stop().await;
}

// ---- Liveness: socket close broadcasts offline to the current customer ----

#[tokio::test]
async fn disconnect_broadcasts_offline_on_customer_channel() {
    let hub = HubHarness::start().await.unwrap();
    hub.register_device("pi-03", "globex", "hunter2").await.unwrap();

    let mut channel = hub.lease.subscribe("customer:globex").await.unwrap();

    let mut agent = Agent::new(hub.agent_config("pi-03", "hunter2"), Arc::new(EchoHandler));
    let mut events = agent.events().subscribe();
    agent.start().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        tokio::select! {
            envelope = events.recv() => {
                if matches!(envelope.unwrap().event, AgentEvent::ChannelConnected) {
                    break;
                }
            }
            _ = tokio::time::sleep_until(deadline) => panic!("channel never connected"),
        }
    }

    // Stop closes the socket with a normal closure; the hub unregisters
    // and emits the offline status for the device's current customer.
    agent.stop().await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let text = tokio::select! {
            message = channel.recv() => message.unwrap(),
            _ = tokio::time::sleep_until(deadline) => panic!("no offline broadcast"),
        };
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        if value["type"] == "device_status" && value["status"] == "offline" {
            assert_eq!(value["device_id"], "pi-03");
            break;
        }
    }
}

// ---- Gateway auth: bad tokens get a 1008 policy closure ----

#[tokio::test]
async fn socket_with_bad_token_is_closed_unauthorized() {
    let hub = HubHarness::start().await.unwrap();

    let url = format!("{}/v1/agent/ws", ws_base(&hub.base_url));
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert(
        SESSION_TOKEN_HEADER,
        HeaderValue::from_static("not-a-real-token"),
    );

    let (mut stream, _response) = tokio_tungstenite::connect_async(request).await.unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out waiting for closure")
        .expect("stream ended without a frame")
        .unwrap();
    match frame {
        Message::Close(Some(close)) => {
            assert_eq!(close.code, CloseCode::Policy);
            assert_eq!(close.reason.as_str(), "Unauthorized");
        }
        other => panic!("expected policy closure, got {other:?}"),
    }
}

// ---- Missing token behaves the same as an unknown one ----

#[tokio::test]
async fn socket_without_token_is_closed_unauthorized() {
    let hub = HubHarness::start().await.unwrap();

    let url = format!("{}/v1/agent/ws", ws_base(&hub.base_url));
    let (mut stream, _response) = tokio_tungstenite::connect_async(
        url.into_client_request().unwrap(),
    )
    .await
    .unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), stream.next())
        .await
        .expect("timed out")
        .expect("stream ended")
        .unwrap();
    assert!(
        matches!(frame, Message::Close(Some(ref close)) if close.code == CloseCode::Policy),
        "got {frame:?}"
    );
}

// ---- Observers: completion events arrive without polling ----

#[tokio::test]
async fn observer_socket_sees_command_completed() {
    let hub = HubHarness::start().await.unwrap();
    hub.register_device("pi-04", "acme", "hunter2").await.unwrap();

    // Observer connects with operator bearer auth before the action starts.
    let url = format!("{}/v1/customers/acme/ws", ws_base(&hub.base_url));
    let mut request = url.into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        HeaderValue::from_str(&format!("Bearer {OPERATOR_TOKEN}")).unwrap(),
    );
    let (observer, _response) = tokio_tungstenite::connect_async(request).await.unwrap();
    let (_observer_sink, mut observer_stream) = observer.split();

    let mut agent = Agent::new(hub.agent_config("pi-04", "hunter2"), Arc::new(EchoHandler));
    agent.start().await.unwrap();

    let client = reqwest::Client::new();
    let created: serde_json::Value = client
        .post(format!("{}/v1/commands", hub.base_url))
        .bearer_auth(OPERATOR_TOKEN)
        .json(&serde_json::json!({"device_id": "pi-04", "kind": "traceroute"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let command_id = created["id"].as_str().unwrap().to_string();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    loop {
        let frame = tokio::select! {
            frame = observer_stream.next() => frame.expect("observer stream ended").unwrap(),
            _ = tokio::time::sleep_until(deadline) => panic!("no command_completed event"),
        };
        let Message::Text(text) = frame else { continue };
        let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
        if value["type"] == "command_completed" && value["command"]["id"] == command_id.as_str() {
            assert_eq!(value["command"]["status"], "completed");
            break;
        }
    }

    agent.stop().await;
}

// ---- Operator auth is enforced on the command API ----

#[tokio::test]
async fn operator_api_rejects_bad_bearer() {
    let hub = HubHarness::start().await.unwrap();
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{}/v1/commands", hub.base_url))
        .bearer_auth("wrong-token")
        .json(&serde_json::json!({"device_id": "pi-01", "kind": "ping"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let response = client
        .get(format!("{}/v1/commands/any-id", hub.base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

// ---- Heartbeat poll claims work and reports 401 for expired sessions ----

#[tokio::test]
async fn heartbeat_poll_claims_and_expired_session_is_unauthorized() {
    let hub = HubHarness::start().await.unwrap();
    hub.register_device("pi-05", "acme", "hunter2").await.unwrap();
    hub.queue
        .enqueue("pi-05", "api", "ping", serde_json::json!({}), 0)
        .await
        .unwrap();

    let client = reqwest::Client::new();
    let auth: serde_json::Value = client
        .post(format!("{}/v1/agent/auth", hub.base_url))
        .json(&serde_json::json!({"device_id": "pi-05", "device_secret": "hunter2"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let token = auth["session_token"].as_str().unwrap().to_string();

    let heartbeat: serde_json::Value = client
        .post(format!("{}/v1/agent/heartbeat", hub.base_url))
        .header(SESSION_TOKEN_HEADER, &token)
        .json(&serde_json::json!({"status": "ok", "metrics": {}}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(heartbeat["ack"], true);
    assert_eq!(heartbeat["commands"].as_array().unwrap().len(), 1);
    assert_eq!(heartbeat["commands"][0]["status"], "claimed");

    // A revoked (or expired) token must be rejected with 401.
    hub.sessions.revoke(&token).await.unwrap();
    let response = client
        .post(format!("{}/v1/agent/heartbeat", hub.base_url))
        .header(SESSION_TOKEN_HEADER, &token)
        .json(&serde_json::json!({"status": "ok", "metrics": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}
