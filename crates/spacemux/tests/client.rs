//! End-to-end tests: a `SpaceClient` against a real WebSocket server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use spacemux::prelude::*;
use spacemux::protocol::decode_message;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

// =========================================================================
// Mock space process
// =========================================================================

type ServerWs = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

const HELLO_REPLY: &str = r#"(did-hello "c1" "p1" ((("uuid" "." "u1")) (("uuid" "." "s1")) "Home"))"#;

/// Binds a listener on `127.0.0.1:0` and returns it with its page origin.
async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().expect("should have an address");
    (listener, format!("http://{addr}"))
}

async fn accept(listener: &TcpListener) -> ServerWs {
    let (stream, _) = listener.accept().await.expect("should accept");
    tokio_tungstenite::accept_async(stream)
        .await
        .expect("handshake should succeed")
}

async fn recv_text(ws: &mut ServerWs) -> String {
    loop {
        let msg = ws
            .next()
            .await
            .expect("client should keep the socket open")
            .expect("frame should be readable");
        if let Message::Text(text) = msg {
            return text.to_string();
        }
    }
}

async fn send_text(ws: &mut ServerWs, text: &str) {
    ws.send(Message::text(text.to_string()))
        .await
        .expect("server send should succeed");
}

/// Accepts the client, checks the hello, and answers it.
async fn attach(listener: &TcpListener) -> ServerWs {
    let mut ws = accept(listener).await;
    assert_eq!(recv_text(&mut ws).await, "(hello)");
    send_text(&mut ws, HELLO_REPLY).await;
    ws
}

fn events(client: &SpaceClient, event: &str) -> mpsc::UnboundedReceiver<Vec<Value>> {
    let (tx, rx) = mpsc::unbounded_channel();
    let receiver = client.receiver();
    client.on(event, receiver, move |args| {
        let _ = tx.send(args.to_vec());
    });
    rx
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<Vec<Value>>) -> Vec<Value> {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event should arrive in time")
        .expect("subscription should stay alive")
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_client_attaches_through_derived_endpoint() {
    let (listener, origin) = listen().await;
    let client = SpaceClient::builder().origin(&origin).connect().unwrap();
    let mut ready = events(&client, "ready");

    let _ws = attach(&listener).await;
    next_event(&mut ready).await;

    assert_eq!(client.state(), MuxState::Open);
    assert_eq!(client.client_id().as_deref(), Some("c1"));
    assert_eq!(client.space_name().as_deref(), Some("Home"));
    assert!(!client.is_owner());
}

#[tokio::test]
async fn test_get_user_info_coalesces_and_caches() {
    let (listener, origin) = listen().await;
    let client = SpaceClient::builder().origin(&origin).connect().unwrap();
    let mut ws = attach(&listener).await;

    let a = client.get_user_info("u1", false);
    let b = client.get_user_info("u1", false);

    let frame = decode_message(&recv_text(&mut ws).await).unwrap().unwrap();
    assert_eq!(frame.method, "request");
    assert_eq!(frame.args[0], Value::from("req-1"));
    assert_eq!(
        &frame.args[2..],
        &[Value::from("space"), Value::from("find-user"), Value::from("u1")]
    );
    send_text(
        &mut ws,
        r#"(did-request "req-1" (("id" "." "u1") ("name" "." "Ann")))"#,
    )
    .await;

    let user_a = a.value().await.expect("user should be found");
    let user_b = b.value().await.expect("user should be found");
    assert_eq!(user_a, user_b);
    assert_eq!(
        serde_json::to_value(&user_a).unwrap(),
        serde_json::json!({ "id": "u1", "name": "Ann" })
    );

    // Served from the cache now.
    assert!(client.get_user_info("u1", false).is_ready());

    // Only one find-user went out: the next request is req-2.
    let _pong = client.request("space", &[Value::from("ping")]).unwrap();
    let frame = decode_message(&recv_text(&mut ws).await).unwrap().unwrap();
    assert_eq!(frame.args[0], Value::from("req-2"));
}

#[tokio::test]
async fn test_get_user_info_unknown_user_is_none() {
    let (listener, origin) = listen().await;
    let client = SpaceClient::builder().origin(&origin).connect().unwrap();
    let mut ws = attach(&listener).await;

    let lookup = client.get_user_info("ghost", false);
    recv_text(&mut ws).await;
    send_text(&mut ws, r#"(did-request "req-1" (error "no such user"))"#).await;

    assert_eq!(lookup.value().await, None);
}

#[tokio::test]
async fn test_notify_and_push_round_trip() {
    let (listener, origin) = listen().await;
    let client = SpaceClient::builder().origin(&origin).connect().unwrap();
    let mut posts = events(&client, "did-post");
    let mut ws = attach(&listener).await;

    client
        .notify("chat", "c-2", &[Value::from("hi"), Value::from(3)])
        .unwrap();
    assert_eq!(recv_text(&mut ws).await, r#"(notify chat "c-2" "hi" 3)"#);

    send_text(&mut ws, r#"(on-notify "did-post" ("hi" 1))"#).await;
    assert_eq!(
        next_event(&mut posts).await,
        vec![Value::from("hi"), Value::from(1)]
    );
}

#[tokio::test]
async fn test_bad_frames_keep_session_open() {
    let (listener, origin) = listen().await;
    let client = SpaceClient::builder().origin(&origin).connect().unwrap();
    let mut states = events(&client, "mux-state");
    let mut posts = events(&client, "did-post");
    let mut ws = attach(&listener).await;

    ws.send(Message::Binary(vec![0xff, 0xfe].into()))
        .await
        .expect("server send should succeed");
    send_text(&mut ws, &format!("{}{}", "(".repeat(1000), ")".repeat(1000))).await;
    send_text(&mut ws, r#"(on-notify "did-post" ("still here"))"#).await;

    assert_eq!(
        next_event(&mut posts).await,
        vec![Value::from("still here")]
    );
    assert_eq!(client.state(), MuxState::Open);
    assert!(states.try_recv().is_err());

    // Same socket: the next request goes out on it.
    let _reply = client.request("space", &[Value::from("ping")]).unwrap();
    let frame = decode_message(&recv_text(&mut ws).await).unwrap().unwrap();
    assert_eq!(frame.method, "request");
}

#[tokio::test]
async fn test_client_reattaches_after_server_drops_socket() {
    let (listener, origin) = listen().await;
    let config = MuxConfig {
        reconnect_delay: Duration::from_millis(20),
        ..MuxConfig::default()
    };
    let client = SpaceClient::builder()
        .origin(&origin)
        .mux_config(config)
        .connect()
        .unwrap();
    let mut states = events(&client, "mux-state");
    let mut reattached = events(&client, "reattached");

    let ws = attach(&listener).await;
    drop(ws);

    assert_eq!(next_event(&mut states).await, vec![Value::from("reattaching 1")]);
    let _ws = attach(&listener).await;
    next_event(&mut reattached).await;
    assert_eq!(next_event(&mut states).await, vec![Value::from("reattached")]);
    assert_eq!(client.state(), MuxState::Open);
}
