//! End-to-end stream tests over a real TCP listener.
//!
//! Each test binds an ephemeral port, serves the full router, and reads the
//! SSE body with `reqwest`.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::StreamExt;

use pantheon_sse::api;
use pantheon_sse::app_state::AppState;
use pantheon_sse::config::{PubSubConfig, ServerConfig};

struct Server {
    addr: SocketAddr,
    state: AppState,
}

async fn spawn_server(pubsub: PubSubConfig) -> Server {
    let config = ServerConfig {
        pubsub,
        sse_retry: Duration::from_millis(1500),
        ..ServerConfig::default()
    };
    let state = AppState::new(&config);
    let app = api::build_router().with_state(state.clone());
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Server { addr, state }
}

/// Accumulates the SSE body until `needle` shows up.
struct EventReader {
    body: std::pin::Pin<Box<dyn futures_util::Stream<Item = reqwest::Result<axum::body::Bytes>> + Send>>,
    seen: String,
}

impl EventReader {
    async fn open(server: &Server, query: &str, last_event_id: Option<&str>) -> Self {
        let mut request = reqwest::Client::new()
            .get(format!("http://{}/api/v1/events?{query}", server.addr))
            .header("accept", "text/event-stream");
        if let Some(id) = last_event_id {
            request = request.header("last-event-id", id);
        }
        let Ok(response) = request.send().await else {
            panic!("stream request failed");
        };
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert!(response.headers().contains_key("x-channel-id"));
        Self {
            body: Box::pin(response.bytes_stream()),
            seen: String::new(),
        }
    }

    async fn read_until(&mut self, needle: &str) -> String {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        while !self.seen.contains(needle) {
            match tokio::time::timeout_at(deadline, self.body.next()).await {
                Ok(Some(Ok(chunk))) => self.seen.push_str(&String::from_utf8_lossy(&chunk)),
                Ok(_) => panic!("stream ended before {needle:?}; got {:?}", self.seen),
                Err(_) => panic!("timed out waiting for {needle:?}; got {:?}", self.seen),
            }
        }
        self.seen.clone()
    }

    /// Resolves once the server closes the stream.
    async fn read_to_end(&mut self) -> String {
        loop {
            match tokio::time::timeout(Duration::from_secs(3), self.body.next()).await {
                Ok(Some(Ok(chunk))) => self.seen.push_str(&String::from_utf8_lossy(&chunk)),
                Ok(_) => return self.seen.clone(),
                Err(_) => panic!("stream did not end; got {:?}", self.seen),
            }
        }
    }
}

fn event_ids(text: &str) -> Vec<String> {
    text.lines()
        .filter_map(|line| line.strip_prefix("id: ").or_else(|| line.strip_prefix("id:")))
        .map(str::to_string)
        .collect()
}

fn publish(server: &Server, topic: &str, payload: serde_json::Value) -> u64 {
    let Ok(receipt) = server.state.broadcaster.publish(topic, payload) else {
        panic!("publish failed");
    };
    receipt.sequence_id
}

#[tokio::test]
async fn late_subscriber_sees_only_later_events() {
    let server = spawn_server(PubSubConfig::default()).await;
    let first = publish(&server, "orders", serde_json::json!("A"));

    let mut reader = EventReader::open(&server, "topics=orders", None).await;
    reader.read_until("retry:1500").await;
    let second = publish(&server, "orders", serde_json::json!("B"));
    let text = reader.read_until("\"B\"").await;

    assert!(second > first);
    assert!(!text.contains("\"A\""));
    assert_eq!(event_ids(&text), vec![format!("orders:{second}")]);
}

#[tokio::test]
async fn reconnect_replays_missed_events_before_live_ones() {
    let server = spawn_server(PubSubConfig::default()).await;
    for i in 1..=10 {
        publish(&server, "orders", serde_json::json!(i));
    }

    let mut reader = EventReader::open(&server, "topics=orders&last_seen=orders:5", None).await;
    reader.read_until("id: orders:10").await;
    publish(&server, "orders", serde_json::json!("live"));
    let text = reader.read_until("id: orders:11").await;

    let expected: Vec<String> = (6..=11).map(|i| format!("orders:{i}")).collect();
    assert_eq!(event_ids(&text), expected);
}

#[tokio::test]
async fn last_event_id_header_resumes_stream() {
    let server = spawn_server(PubSubConfig::default()).await;
    for i in 1..=3 {
        publish(&server, "orders", serde_json::json!(i));
    }
    let mut reader = EventReader::open(&server, "topics=orders", Some("orders:2")).await;
    let text = reader.read_until("id: orders:3").await;
    assert_eq!(event_ids(&text), vec!["orders:3".to_string()]);
}

#[tokio::test]
async fn reconnect_with_stale_query_resumes_from_newer_header() {
    let server = spawn_server(PubSubConfig::default()).await;
    for i in 1..=3 {
        publish(&server, "orders", serde_json::json!(i));
    }
    let mut reader =
        EventReader::open(&server, "topics=orders&last_seen=orders:1", Some("orders:3")).await;
    publish(&server, "orders", serde_json::json!(4));
    let text = reader.read_until("id: orders:4").await;
    assert_eq!(event_ids(&text), vec!["orders:4".to_string()]);
}

#[tokio::test]
async fn replay_beyond_retention_sends_gap() {
    let server = spawn_server(PubSubConfig {
        replay_retention: 4,
        ..PubSubConfig::default()
    })
    .await;
    for i in 1..=20 {
        publish(&server, "orders", serde_json::json!(i));
    }
    let mut reader = EventReader::open(&server, "topics=orders&last_seen=orders:3", None).await;
    let text = reader.read_until("event: gap").await;
    assert!(text.contains("\"oldest_available\":17"));
    assert!(event_ids(&text).is_empty());
}

#[tokio::test]
async fn idle_stream_receives_heartbeats() {
    let server = spawn_server(PubSubConfig {
        heartbeat_interval: Duration::from_millis(50),
        ..PubSubConfig::default()
    })
    .await;
    let heartbeat = server
        .state
        .heartbeat()
        .spawn(server.state.connections.shutdown_signal());

    let mut reader = EventReader::open(&server, "topics=orders", None).await;
    let text = reader.read_until("event: heartbeat").await;
    assert!(event_ids(&text).is_empty());

    server.state.connections.shutdown(Duration::from_secs(1)).await;
    assert!(tokio::time::timeout(Duration::from_secs(1), heartbeat).await.is_ok());
}

#[tokio::test]
async fn shutdown_flushes_and_ends_streams() {
    let server = spawn_server(PubSubConfig::default()).await;
    let mut first = EventReader::open(&server, "topics=orders", None).await;
    let mut second = EventReader::open(&server, "topics=orders,invoices", None).await;
    first.read_until("retry:").await;
    second.read_until("retry:").await;
    publish(&server, "orders", serde_json::json!("last words"));

    let report = server.state.connections.shutdown(Duration::from_secs(2)).await;
    assert_eq!(report.closed, 2);
    assert!(!report.timed_out);

    for reader in [&mut first, &mut second] {
        let text = reader.read_to_end().await;
        assert!(text.contains("last words"));
    }
    assert_eq!(server.state.connections.live_connections(), 0);
}

#[tokio::test]
async fn disconnect_removes_channel() {
    let server = spawn_server(PubSubConfig::default()).await;
    let mut reader = EventReader::open(&server, "topics=orders", None).await;
    reader.read_until("retry:").await;
    assert_eq!(server.state.connections.registry().channel_count(), 1);
    drop(reader);

    // The delivery task notices on its next write attempt or when the body
    // is dropped by the server.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while server.state.connections.live_connections() > 0 {
        publish(&server, "orders", serde_json::json!("ping"));
        assert!(tokio::time::Instant::now() < deadline, "channel never closed");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(server.state.connections.registry().fanout_targets("orders").is_empty());
}
