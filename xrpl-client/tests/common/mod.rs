//! In-process mock ledger node for integration tests.
//!
//! Replies to every command with a success `response` frame, except:
//! - `hang`: never replies
//! - `drop_connection`: closes the socket without replying
//! - `subscribe`/`unsubscribe` naming a `forbidden` stream: error reply

#![allow(dead_code, clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing_subscriber::EnvFilter;

/// Route test logs through the test writer; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A command the mock received.
#[derive(Debug, Clone)]
pub struct Received {
    /// 1-based connection number it arrived on
    pub connection: usize,
    /// Decoded command object
    pub body: Value,
}

impl Received {
    pub fn command(&self) -> &str {
        self.body["command"].as_str().unwrap_or_default()
    }

    pub fn id(&self) -> &str {
        self.body["id"].as_str().unwrap_or_default()
    }

    pub fn streams(&self) -> Vec<String> {
        self.body["streams"]
            .as_array()
            .map(|streams| {
                streams
                    .iter()
                    .filter_map(|s| s.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Responsive,
    Silent,
}

pub struct MockNode {
    addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<Received>,
    push: broadcast::Sender<String>,
    connections: Arc<AtomicUsize>,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
    task: JoinHandle<()>,
}

impl MockNode {
    /// A node that answers commands.
    pub async fn start() -> Self {
        Self::spawn(Mode::Responsive, Duration::ZERO).await
    }

    /// A node that completes the upgrade and then never reads or writes.
    pub async fn start_silent() -> Self {
        Self::spawn(Mode::Silent, Duration::ZERO).await
    }

    /// A responsive node that holds every upgrade after the first for `delay`.
    pub async fn start_slow_redial(delay: Duration) -> Self {
        Self::spawn(Mode::Responsive, delay).await
    }

    async fn spawn(mode: Mode, redial_delay: Duration) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind mock node");
        let addr = listener.local_addr().expect("mock node address");
        let (requests_tx, requests) = mpsc::unbounded_channel();
        let (push, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicUsize::new(0));
        let authorization = Arc::new(Mutex::new(Vec::new()));

        let task = {
            let push = push.clone();
            let connections = Arc::clone(&connections);
            let authorization = Arc::clone(&authorization);
            tokio::spawn(async move {
                let mut parked = Vec::new();
                while let Ok((stream, _)) = listener.accept().await {
                    let connection = connections.fetch_add(1, Ordering::SeqCst) + 1;
                    if connection > 1 && !redial_delay.is_zero() {
                        tokio::time::sleep(redial_delay).await;
                    }
                    let Some(ws) = upgrade(stream, Arc::clone(&authorization)).await else {
                        continue;
                    };
                    match mode {
                        Mode::Silent => parked.push(ws),
                        Mode::Responsive => {
                            tokio::spawn(serve(
                                ws,
                                connection,
                                requests_tx.clone(),
                                push.subscribe(),
                            ));
                        }
                    }
                }
            })
        };

        Self {
            addr,
            requests,
            push,
            connections,
            authorization,
            task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of connections accepted so far.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// `Authorization` header of every upgrade, in order.
    pub fn authorization_headers(&self) -> Vec<Option<String>> {
        self.authorization.lock().expect("header log").clone()
    }

    /// Next command received, waiting up to five seconds.
    pub async fn next_request(&mut self) -> Received {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("mock node received a command in time")
            .expect("mock node running")
    }

    /// Next command with the given name, skipping others.
    pub async fn next_command(&mut self, command: &str) -> Received {
        loop {
            let received = self.next_request().await;
            if received.command() == command {
                return received;
            }
        }
    }

    /// Send `frame` to every connected client.
    pub fn push(&self, frame: Value) {
        self.push
            .send(frame.to_string())
            .expect("at least one client connected");
    }
}

impl Drop for MockNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

type ServerStream = tokio_tungstenite::WebSocketStream<TcpStream>;

async fn upgrade(
    stream: TcpStream,
    authorization: Arc<Mutex<Vec<Option<String>>>>,
) -> Option<ServerStream> {
    let record = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let header = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        authorization.lock().expect("header log").push(header);
        Ok(response)
    };
    tokio_tungstenite::accept_hdr_async(stream, record).await.ok()
}

async fn serve(
    ws: ServerStream,
    connection: usize,
    requests: mpsc::UnboundedSender<Received>,
    mut push: broadcast::Receiver<String>,
) {
    let (mut sink, mut source) = ws.split();
    loop {
        tokio::select! {
            message = source.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    Some(Err(_)) | None => return,
                };
                let Ok(body) = serde_json::from_str::<Value>(text.as_str()) else {
                    continue;
                };
                let received = Received { connection, body };
                let _ = requests.send(received.clone());

                let reply = match received.command() {
                    "hang" => continue,
                    "drop_connection" => return,
                    "subscribe" | "unsubscribe"
                        if received.streams().iter().any(|s| s == "forbidden") =>
                    {
                        json!({
                            "type": "response",
                            "id": received.id(),
                            "status": "error",
                            "error": "malformedStream",
                        })
                    }
                    "server_info" => json!({
                        "type": "response",
                        "id": received.id(),
                        "status": "success",
                        "result": {"info": {"network_id": 21337}},
                    }),
                    command => json!({
                        "type": "response",
                        "id": received.id(),
                        "status": "success",
                        "result": {"command": command},
                    }),
                };
                if sink.send(Message::text(reply.to_string())).await.is_err() {
                    return;
                }
            }
            frame = push.recv() => match frame {
                Ok(frame) => {
                    if sink.send(Message::text(frame)).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

/// Poll `check` every 20ms until it returns true or five seconds pass.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
