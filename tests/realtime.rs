use community_chat::api::{build_router, AppState};
use community_chat::config::Config;
use futures::StreamExt;
use std::net::{SocketAddr, TcpListener};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};
use uuid::Uuid;

async fn spawn_server() -> (SocketAddr, JoinHandle<()>, tempfile::TempDir) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    listener.set_nonblocking(true).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let config = Config {
        bind: addr.to_string(),
        db_path: tmp.path().join("chat.db"),
        online_threshold_secs: 300,
        logging_enabled: false,
    };
    let state = AppState::new(config).unwrap();
    let app = build_router(state);
    let server = tokio::spawn(async move {
        axum::Server::from_tcp(listener)
            .unwrap()
            .serve(app.into_make_service())
            .await
            .unwrap();
    });
    (addr, server, tmp)
}

async fn next_event(
    ws: &mut (impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>>
          + Unpin),
) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for event")
            .unwrap()
            .unwrap();
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

#[tokio::test]
async fn websocket_tail_sees_match_and_message_events() {
    let (addr, server, _tmp) = spawn_server().await;
    let client = reqwest::Client::new();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    for id in [a, b] {
        client
            .post(format!("http://{}/api/profiles", addr))
            .json(&serde_json::json!({"id": id, "role": "seeker", "accepts_messages": true}))
            .send()
            .await
            .unwrap();
    }

    let (mut ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    // the socket task subscribes after the handshake, give it a moment
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    // one-sided like emits nothing; the reciprocal one activates the match
    client
        .post(format!("http://{}/api/like", addr))
        .json(&serde_json::json!({"from": a, "to": b}))
        .send()
        .await
        .unwrap();
    client
        .post(format!("http://{}/api/like", addr))
        .json(&serde_json::json!({"from": b, "to": a}))
        .send()
        .await
        .unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "match_status_changed");
    assert_eq!(event["match"]["status"], "active");

    let convs: Vec<serde_json::Value> = client
        .get(format!("http://{}/api/conversations?user_id={}", addr, a))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let conv_id = convs[0]["id"].as_str().unwrap().to_string();

    client
        .post(format!("http://{}/api/messages", addr))
        .json(&serde_json::json!({"conversation_id": conv_id, "sender_id": a, "body": "hi"}))
        .send()
        .await
        .unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "message_appended");
    assert_eq!(event["message"]["seq"], 1);
    assert_eq!(event["message"]["body"], "hi");

    client
        .post(format!("http://{}/api/unlike", addr))
        .json(&serde_json::json!({"from": a, "to": b}))
        .send()
        .await
        .unwrap();
    let event = next_event(&mut ws).await;
    assert_eq!(event["event"], "match_status_changed");
    assert_eq!(event["match"]["status"], "inactive");

    server.abort();
}
