//! Relay WebSocket integration tests.
//!
//! Real connections against the full router: presence, fan-out to other room
//! members, and error replies.

mod common;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use common::TestServer;

type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Receive and parse a JSON message with timeout.
async fn recv_json(ws: &mut Ws) -> Option<Value> {
    let msg = timeout(Duration::from_secs(5), ws.next()).await.ok()??.ok()?;
    match msg {
        Message::Text(text) => serde_json::from_str(&text).ok(),
        _ => None,
    }
}

/// Receive messages until one of `msg_type` arrives.
async fn recv_until_type(ws: &mut Ws, msg_type: &str) -> Option<Value> {
    for _ in 0..10 {
        let msg = recv_json(ws).await?;
        if msg["type"] == msg_type {
            return Some(msg);
        }
    }
    None
}

/// Assert nothing arrives within a short window.
async fn assert_silent(ws: &mut Ws) {
    let next = timeout(Duration::from_millis(200), ws.next()).await;
    assert!(next.is_err(), "unexpected message: {next:?}");
}

async fn send_json(ws: &mut Ws, value: &Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("send failed");
}

/// Connect and consume the welcome, returning the socket and its user ID.
async fn connect(server: &TestServer) -> (Ws, String) {
    let (mut ws, _) = connect_async(server.ws_url())
        .await
        .expect("Failed to connect");
    let welcome = recv_json(&mut ws).await.expect("No welcome message");
    assert_eq!(welcome["type"], "welcome");
    let id = welcome["connection_id"]
        .as_str()
        .expect("connection_id")
        .to_string();
    (ws, id)
}

/// Connect and join `file_id`, draining the joiner's own `users_count`.
async fn connect_and_join(server: &TestServer, file_id: &str) -> (Ws, String) {
    let (mut ws, id) = connect(server).await;
    send_json(&mut ws, &json!({"type": "join", "file_id": file_id})).await;
    let count = recv_until_type(&mut ws, "users_count")
        .await
        .expect("joiner should get users_count");
    assert_eq!(count["file_id"], file_id);
    (ws, id)
}

fn rect(id: &str) -> Value {
    json!({"id": id, "type": "rectangle", "x": 10.0, "y": 20.0, "width": 30.0, "height": 40.0})
}

#[tokio::test]
async fn connect_and_receive_welcome() {
    let server = TestServer::start().await;

    let (mut ws, _) = connect_async(server.ws_url())
        .await
        .expect("Failed to connect");
    let msg = recv_json(&mut ws).await.expect("No welcome message");

    assert_eq!(msg["type"], "welcome");
    assert!(msg["connection_id"].is_string());
    assert!(msg["version"].is_string());

    server.shutdown().await;
}

#[tokio::test]
async fn join_announces_presence_and_count() {
    let server = TestServer::start().await;

    let (mut a, _) = connect_and_join(&server, "f1").await;
    let (mut b, b_id) = connect_and_join(&server, "f1").await;

    let joined = recv_until_type(&mut a, "user_joined")
        .await
        .expect("A should see B join");
    assert_eq!(joined["user_id"], b_id.as_str());
    assert_eq!(joined["file_id"], "f1");

    let count = recv_until_type(&mut a, "users_count")
        .await
        .expect("A should get the new count");
    assert_eq!(count["count"], 2);

    assert_eq!(server.state().relay.rooms().count("f1"), 2);

    let _ = b.close(None).await;
    server.shutdown().await;
}

#[tokio::test]
async fn element_added_reaches_other_members_only() {
    let server = TestServer::start().await;

    let (mut a, a_id) = connect_and_join(&server, "f1").await;
    let (mut b, _) = connect_and_join(&server, "f1").await;
    // Drain A's notifications about B joining.
    recv_until_type(&mut a, "users_count").await.expect("count");

    send_json(
        &mut a,
        &json!({"type": "element_added", "file_id": "f1", "element": rect("e1")}),
    )
    .await;

    let added = recv_until_type(&mut b, "element_added")
        .await
        .expect("B should receive the element");
    assert_eq!(added["user_id"], a_id.as_str());
    assert_eq!(added["file_id"], "f1");
    assert_eq!(added["element"]["id"], "e1");
    assert_eq!(added["element"]["width"], 30.0);

    assert_silent(&mut a).await;

    server.shutdown().await;
}

#[tokio::test]
async fn events_stay_in_their_room() {
    let server = TestServer::start().await;

    let (mut a, _) = connect_and_join(&server, "f1").await;
    let (mut c, _) = connect_and_join(&server, "f2").await;

    send_json(
        &mut a,
        &json!({"type": "element_deleted", "file_id": "f1", "element_id": "e1"}),
    )
    .await;
    send_json(
        &mut a,
        &json!({"type": "cursor_move", "file_id": "f1", "x": 1.0, "y": 2.0, "color": "#f00"}),
    )
    .await;

    assert_silent(&mut c).await;

    server.shutdown().await;
}

#[tokio::test]
async fn edits_from_one_sender_arrive_in_order() {
    let server = TestServer::start().await;

    let (mut a, _) = connect_and_join(&server, "f1").await;
    let (mut b, _) = connect_and_join(&server, "f1").await;

    for x in 0..5 {
        let mut element = rect("e1");
        element["x"] = json!(f64::from(x));
        send_json(
            &mut a,
            &json!({"type": "element_modified", "file_id": "f1", "element": element}),
        )
        .await;
    }

    for x in 0..5 {
        let modified = recv_until_type(&mut b, "element_modified")
            .await
            .expect("modification");
        assert_eq!(modified["element"]["x"], f64::from(x));
    }

    server.shutdown().await;
}

#[tokio::test]
async fn disconnect_notifies_remaining_members() {
    let server = TestServer::start().await;

    let (mut a, _) = connect_and_join(&server, "f1").await;
    let (b, b_id) = connect_and_join(&server, "f1").await;
    recv_until_type(&mut a, "users_count").await.expect("count");

    drop(b);

    let left = recv_until_type(&mut a, "user_left")
        .await
        .expect("A should see B leave");
    assert_eq!(left["user_id"], b_id.as_str());

    let count = recv_until_type(&mut a, "users_count")
        .await
        .expect("count after leave");
    assert_eq!(count["count"], 1);

    server.shutdown().await;
}

#[tokio::test]
async fn explicit_leave_stops_delivery() {
    let server = TestServer::start().await;

    let (mut a, _) = connect_and_join(&server, "f1").await;
    let (mut b, _) = connect_and_join(&server, "f1").await;
    recv_until_type(&mut a, "users_count").await.expect("count");

    send_json(&mut b, &json!({"type": "leave", "file_id": "f1"})).await;
    recv_until_type(&mut a, "user_left").await.expect("user_left");

    send_json(
        &mut a,
        &json!({"type": "canvas_update", "file_id": "f1", "elements": [rect("e1")]}),
    )
    .await;

    assert_silent(&mut b).await;

    server.shutdown().await;
}

#[tokio::test]
async fn ping_gets_pong() {
    let server = TestServer::start().await;
    let (mut ws, _) = connect(&server).await;

    send_json(&mut ws, &json!({"type": "ping"})).await;

    let pong = recv_json(&mut ws).await.expect("pong");
    assert_eq!(pong["type"], "pong");
    assert!(pong["timestamp"].as_u64().unwrap_or(0) > 0);

    server.shutdown().await;
}

#[tokio::test]
async fn malformed_frame_gets_error_and_connection_survives() {
    let server = TestServer::start().await;
    let (mut ws, _) = connect(&server).await;

    ws.send(Message::Text("not json".to_string()))
        .await
        .expect("send");
    let error = recv_json(&mut ws).await.expect("error reply");
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "parse_error");

    send_json(&mut ws, &json!({"type": "ping"})).await;
    let pong = recv_json(&mut ws).await.expect("pong");
    assert_eq!(pong["type"], "pong");

    server.shutdown().await;
}

#[tokio::test]
async fn invalid_file_id_is_rejected() {
    let server = TestServer::start().await;
    let (mut ws, _) = connect(&server).await;

    send_json(&mut ws, &json!({"type": "join", "file_id": ""})).await;

    let error = recv_json(&mut ws).await.expect("error reply");
    assert_eq!(error["type"], "error");
    assert_eq!(error["code"], "validation_error");
    assert_eq!(server.state().relay.rooms().room_count(), 0);

    server.shutdown().await;
}

#[tokio::test]
async fn relay_does_not_touch_the_store() {
    let server = TestServer::start().await;

    let (mut a, _) = connect_and_join(&server, "f1").await;
    send_json(
        &mut a,
        &json!({"type": "element_added", "file_id": "f1", "element": rect("e1")}),
    )
    .await;
    send_json(&mut a, &json!({"type": "ping"})).await;
    recv_until_type(&mut a, "pong").await.expect("pong");

    assert!(server.state().store.peek("f1").is_none());

    server.shutdown().await;
}
