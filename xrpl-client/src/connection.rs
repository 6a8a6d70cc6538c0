//! Websocket connection epochs.
//!
//! A [`Connection`] is one dialled socket together with its deadlines, upgrade
//! metadata, read task and heartbeat task. The client replaces it wholesale on
//! reconnect; an epoch is never reused once torn down.

use crate::client::Shared;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatState, Prober};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::{AUTHORIZATION, PROXY_AUTHORIZATION};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, trace, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// How long teardown waits for an epoch's tasks before aborting them.
const TASK_GRACE: Duration = Duration::from_secs(2);

/// HTTP upgrade metadata recorded at dial time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeInfo {
    /// Status code of the upgrade response (101 on success)
    pub status: u16,
    /// Upgrade response headers
    pub headers: Vec<(String, String)>,
    /// When the upgrade completed
    pub established_at: DateTime<Utc>,
}

/// Snapshot of the current epoch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EpochInfo {
    /// Epoch number, increasing per client
    pub epoch: u64,
    /// Upgrade metadata
    pub upgrade: UpgradeInfo,
    /// State of the epoch's heartbeat
    pub heartbeat: HeartbeatState,
}

/// Read and write deadlines of one epoch.
///
/// Every pong pushes both to `now + timeout`.
#[derive(Debug, Clone)]
pub(crate) struct Deadlines {
    read: Arc<watch::Sender<Instant>>,
    write: Arc<watch::Sender<Instant>>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl Deadlines {
    fn arm(read_timeout: Duration, write_timeout: Duration) -> Self {
        let now = Instant::now();
        let (read, _) = watch::channel(now + read_timeout);
        let (write, _) = watch::channel(now + write_timeout);
        Self {
            read: Arc::new(read),
            write: Arc::new(write),
            read_timeout,
            write_timeout,
        }
    }

    pub(crate) fn extend(&self) {
        let now = Instant::now();
        self.read.send_replace(now + self.read_timeout);
        self.write.send_replace(now + self.write_timeout);
    }

    fn watch_read(&self) -> watch::Receiver<Instant> {
        self.read.subscribe()
    }

    fn write_deadline(&self) -> Instant {
        *self.write.borrow()
    }
}

/// Write half of an epoch, shared by callers and the heartbeat.
#[derive(Clone)]
pub(crate) struct EpochWriter {
    epoch: u64,
    sink: Arc<Mutex<WsSink>>,
    deadlines: Deadlines,
}

impl fmt::Debug for EpochWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpochWriter")
            .field("epoch", &self.epoch)
            .field("deadlines", &self.deadlines)
            .finish_non_exhaustive()
    }
}

impl EpochWriter {
    pub(crate) fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Send one frame before the write deadline.
    pub(crate) async fn send(&self, message: Message) -> Result<()> {
        let deadline = self.deadlines.write_deadline();
        let write = async {
            let mut sink = self.sink.lock().await;
            sink.send(message).await
        };

        match tokio::time::timeout_at(deadline, write).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ClientError::write(e.to_string())),
            Err(_) => Err(ClientError::write("write deadline exceeded")),
        }
    }

    pub(crate) async fn send_text(&self, text: String) -> Result<()> {
        self.send(Message::text(text)).await
    }

    pub(crate) async fn ping(&self, payload: Bytes) -> Result<()> {
        self.send(Message::Ping(payload)).await
    }

    pub(crate) async fn close(&self) -> Result<()> {
        let mut sink = self.sink.lock().await;
        match tokio::time::timeout(self.deadlines.write_timeout, sink.close()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(ClientError::write(e.to_string())),
            Err(_) => Err(ClientError::write("close deadline exceeded")),
        }
    }
}

impl Prober for EpochWriter {
    fn probe(&self, payload: String) -> impl Future<Output = Result<()>> + Send {
        let writer = self.clone();
        async move { writer.ping(Bytes::from(payload)).await }
    }
}

/// Read-loop report that an epoch died on its own.
#[derive(Debug)]
pub(crate) struct ConnectionLost {
    pub(crate) epoch: u64,
    pub(crate) error: ClientError,
}

/// One live connection epoch.
#[derive(Debug)]
pub(crate) struct Connection {
    writer: EpochWriter,
    upgrade: UpgradeInfo,
    stop: watch::Sender<bool>,
    heartbeat: HeartbeatMonitor,
    reader: JoinHandle<()>,
    lost: Arc<AtomicBool>,
}

impl Connection {
    pub(crate) fn epoch(&self) -> u64 {
        self.writer.epoch
    }

    pub(crate) fn writer(&self) -> EpochWriter {
        self.writer.clone()
    }

    /// Whether the read loop already gave up on this epoch.
    pub(crate) fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn info(&self) -> EpochInfo {
        EpochInfo {
            epoch: self.epoch(),
            upgrade: self.upgrade.clone(),
            heartbeat: self.heartbeat.state(),
        }
    }

    /// Signal both tasks without waiting for them.
    pub(crate) fn signal_stop(&self) {
        self.stop.send_replace(true);
    }
}

/// Dials and tears down connection epochs.
#[derive(Debug)]
pub(crate) struct ConnectionManager {
    config: Arc<ClientConfig>,
    next_epoch: AtomicU64,
}

impl ConnectionManager {
    pub(crate) fn new(config: Arc<ClientConfig>) -> Self {
        Self {
            config,
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Open a socket and start its read and heartbeat tasks.
    ///
    /// Inbound frames are routed through `shared`; a read failure is reported
    /// on `lost_tx` unless the epoch was stopped first.
    pub(crate) async fn dial(
        &self,
        shared: Weak<Shared>,
        lost_tx: mpsc::UnboundedSender<ConnectionLost>,
    ) -> Result<Connection> {
        let url = self.config.url.as_str();
        let mut request = url
            .into_client_request()
            .map_err(|e| ClientError::dial_failed(url, e))?;
        let headers = [
            (AUTHORIZATION, self.config.authorization.as_deref()),
            (PROXY_AUTHORIZATION, self.config.proxy_authorization.as_deref()),
        ];
        for (name, value) in headers {
            if let Some(value) = value {
                let value = HeaderValue::from_str(value)
                    .map_err(|e| ClientError::dial_failed(url, format!("invalid {name} header: {e}")))?;
                request.headers_mut().insert(name, value);
            }
        }

        let (stream, response) =
            match tokio::time::timeout(self.config.connection_timeout(), connect_async(request)).await {
                Ok(Ok(connected)) => connected,
                Ok(Err(e)) => return Err(ClientError::dial_failed(url, e)),
                Err(_) => {
                    return Err(ClientError::dial_failed(
                        url,
                        format!("no upgrade within {:?}", self.config.connection_timeout()),
                    ));
                }
            };

        let upgrade = UpgradeInfo {
            status: response.status().as_u16(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            established_at: Utc::now(),
        };

        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        let deadlines = Deadlines::arm(self.config.read_timeout(), self.config.write_timeout());
        let (sink, source) = stream.split();
        let writer = EpochWriter {
            epoch,
            sink: Arc::new(Mutex::new(sink)),
            deadlines: deadlines.clone(),
        };

        let (stop, stop_rx) = watch::channel(false);
        let heartbeat = HeartbeatMonitor::spawn(
            writer.clone(),
            self.config.heartbeat_interval(),
            epoch,
            stop.subscribe(),
        );

        let lost = Arc::new(AtomicBool::new(false));
        let reader = tokio::spawn(read_loop(ReadLoop {
            epoch,
            source,
            deadlines,
            stop: stop_rx,
            shared,
            lost_tx,
            lost: Arc::clone(&lost),
        }));

        info!(epoch, url, status = upgrade.status, "Connected to node");

        Ok(Connection {
            writer,
            upgrade,
            stop,
            heartbeat,
            reader,
            lost,
        })
    }

    /// Stop an epoch's tasks and close its socket, ignoring close errors.
    pub(crate) async fn teardown(&self, connection: Connection) {
        let epoch = connection.epoch();
        let writer = stop_tasks(connection).await;
        if let Err(e) = writer.close().await {
            debug!(epoch, error = %e, "Ignoring close error during teardown");
        }
        debug!(epoch, "Connection torn down");
    }

    /// Stop an epoch's tasks, send a normal closure and close the socket.
    pub(crate) async fn shutdown(&self, connection: Connection) -> Result<()> {
        let epoch = connection.epoch();
        let writer = stop_tasks(connection).await;

        let goodbye = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        let sent = writer.send(goodbye).await;
        if let Err(e) = writer.close().await {
            debug!(epoch, error = %e, "Ignoring close error during shutdown");
        }
        debug!(epoch, "Connection shut down");
        sent
    }
}

async fn stop_tasks(connection: Connection) -> EpochWriter {
    let Connection {
        writer,
        stop,
        heartbeat,
        mut reader,
        ..
    } = connection;

    stop.send_replace(true);
    heartbeat.join(TASK_GRACE).await;
    if tokio::time::timeout(TASK_GRACE, &mut reader).await.is_err() {
        warn!(epoch = writer.epoch, "Read task did not stop in time, aborting");
        reader.abort();
    }
    writer
}

struct ReadLoop {
    epoch: u64,
    source: WsSource,
    deadlines: Deadlines,
    stop: watch::Receiver<bool>,
    shared: Weak<Shared>,
    lost_tx: mpsc::UnboundedSender<ConnectionLost>,
    lost: Arc<AtomicBool>,
}

async fn read_loop(mut ctx: ReadLoop) {
    let epoch = ctx.epoch;
    let mut read_deadline = ctx.deadlines.watch_read();

    let error = loop {
        let deadline = *read_deadline.borrow_and_update();

        let message = tokio::select! {
            biased;
            changed = ctx.stop.changed() => {
                if changed.is_err() || *ctx.stop.borrow() {
                    trace!(epoch, "Read loop stopping");
                    return;
                }
                continue;
            }
            _ = read_deadline.changed() => continue,
            () = tokio::time::sleep_until(deadline) => {
                break ClientError::connection_lost("read deadline expired");
            }
            message = ctx.source.next() => message,
        };

        match message {
            Some(Ok(Message::Text(text))) => {
                let Some(shared) = ctx.shared.upgrade() else {
                    trace!(epoch, "Client dropped, read loop exiting");
                    return;
                };
                shared
                    .route_frame(Bytes::copy_from_slice(text.as_bytes()))
                    .await;
            }
            Some(Ok(Message::Pong(_))) => {
                trace!(epoch, "Pong received, extending deadlines");
                ctx.deadlines.extend();
            }
            Some(Ok(Message::Ping(_))) => trace!(epoch, "Ping received"),
            Some(Ok(Message::Close(frame))) => {
                let reason = frame.map_or_else(
                    || "peer closed the connection".to_owned(),
                    |f| {
                        format!(
                            "peer closed the connection: {} {}",
                            u16::from(f.code),
                            f.reason.as_str()
                        )
                    },
                );
                break ClientError::connection_lost(reason);
            }
            Some(Ok(Message::Binary(_) | Message::Frame(_))) => {
                trace!(epoch, "Ignoring non-text frame");
            }
            Some(Err(e)) => break ClientError::read(e.to_string()),
            None => break ClientError::connection_lost("stream ended"),
        }
    };

    if *ctx.stop.borrow() {
        return;
    }

    ctx.lost.store(true, Ordering::Release);
    warn!(epoch, error = %error, "Connection lost");
    if ctx.lost_tx.send(ConnectionLost { epoch, error }).is_err() {
        debug!(epoch, "Client gone, no recovery");
    }
}
