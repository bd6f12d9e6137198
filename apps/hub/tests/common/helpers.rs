//! Test helper functions

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

use tandem_hub::{build_router, Config, FreshnessFilter, Hub, HubHandle};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long to wait for something that should happen
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// How long to listen before deciding nothing is coming
pub const SILENCE: Duration = Duration::from_millis(300);

/// A running server and the hub behind it
pub struct TestServer {
    pub addr: SocketAddr,
    pub hub: HubHandle,
}

impl TestServer {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self, user_id: &str) -> String {
        format!("ws://{}/ws/{}", self.addr, user_id)
    }
}

/// Start the full router on 127.0.0.1 with an ephemeral port
pub async fn spawn_server() -> TestServer {
    spawn_server_with(Config::default()).await
}

pub async fn spawn_server_with(config: Config) -> TestServer {
    let hub =
        Hub::new(FreshnessFilter::new(config.freshness_window)).spawn(config.mailbox_capacity);
    let app = build_router(config, hub.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, hub }
}

/// Connect a participant and wait until the hub has registered it
pub async fn join(server: &TestServer, user_id: &str) -> WsClient {
    let before = server.hub.stats().await.unwrap().connections;
    let (ws, _) = connect_async(server.ws_url(user_id)).await.unwrap();
    wait_for_connections(&server.hub, before + 1).await;
    ws
}

/// Poll hub stats until the connection count matches
pub async fn wait_for_connections(hub: &HubHandle, expected: usize) {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        loop {
            if hub.stats().await.unwrap().connections == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("hub never reached {} connections", expected));
}

/// Send a JSON value as a text frame
pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Next data frame as a string, skipping control frames
pub async fn recv_text(ws: &mut WsClient) -> Option<String> {
    tokio::time::timeout(EVENT_TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Text(text)) => return Some(text),
                Ok(Message::Binary(data)) => return String::from_utf8(data).ok(),
                Ok(Message::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
        None
    })
    .await
    .expect("timed out waiting for a frame")
}

/// Next data frame parsed as JSON
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let text = recv_text(ws).await.expect("connection closed");
    serde_json::from_str(&text).unwrap()
}

/// Assert no data frame arrives for a while
pub async fn assert_silent(ws: &mut WsClient) {
    let result = tokio::time::timeout(SILENCE, async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => return text,
                Some(Ok(Message::Binary(data))) => return format!("{:?}", data),
                Some(Ok(_)) => continue,
                Some(Err(_)) | None => std::future::pending::<()>().await,
            }
        }
    })
    .await;

    if let Ok(frame) = result {
        panic!("expected silence, got {}", frame);
    }
}

/// Wall-clock unix seconds
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
