//! Client facade for a ledger node.
//!
//! A [`Client`] owns one connection epoch at a time, correlates concurrent
//! requests with their replies, fans pushed stream frames out to bounded
//! queues, and rebuilds the connection (replaying subscriptions) when the read
//! loop reports a loss.
//!
//! # Examples
//!
//! ```rust,no_run
//! use xrpl_client::{Client, ClientConfig, Request};
//!
//! # async fn run() -> xrpl_client::Result<()> {
//! let client = Client::connect(ClientConfig::new("wss://s1.ripple.com")).await?;
//!
//! let info = client.request(Request::new("server_info")).await?;
//! println!("{:?}", info.result());
//!
//! client.subscribe(["ledger"]).await?;
//! while let Some(frame) = client.ledger_stream().recv().await {
//!     println!("{}", String::from_utf8_lossy(&frame));
//! }
//!
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionLost, ConnectionManager, EpochInfo, EpochWriter};
use crate::correlator::RequestCorrelator;
use crate::error::{ClientError, Result};
use crate::request::{Request, Response};
use crate::queue::{StreamQueue, StreamQueues};
use crate::router::{ReplyResolver, StreamRouter};
use crate::stream::StreamCategory;
use crate::subscription::SubscriptionRegistry;
use bytes::Bytes;
use std::future::Future;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No live epoch; a reconnect may be attempted
    Disconnected,
    /// A dial is in flight
    Connecting,
    /// An epoch is live
    Connected,
    /// `close` has started
    Closing,
    /// `close` has finished
    Closed,
}

impl ConnectionState {
    const fn is_terminal(self) -> bool {
        matches!(self, Self::Closing | Self::Closed)
    }
}

/// Everything guarded by the client lock. Critical sections never perform
/// socket I/O or wait on a caller.
#[derive(Debug)]
struct ClientState {
    lifecycle: ConnectionState,
    connection: Option<Connection>,
    correlator: RequestCorrelator,
    subscriptions: SubscriptionRegistry,
    next_id: u64,
}

impl ClientState {
    /// Writer of the live epoch, or why there is none.
    fn live_writer(&self) -> Result<EpochWriter> {
        match (self.lifecycle, &self.connection) {
            (lifecycle, _) if lifecycle.is_terminal() => Err(ClientError::Closed),
            (ConnectionState::Connected, Some(connection)) => Ok(connection.writer()),
            _ => Err(ClientError::NotConnected),
        }
    }
}

/// State shared between the facade, the read loops and the recovery task.
#[derive(Debug)]
pub(crate) struct Shared {
    config: Arc<ClientConfig>,
    manager: ConnectionManager,
    router: StreamRouter,
    state: Mutex<ClientState>,
    lost_tx: mpsc::UnboundedSender<ConnectionLost>,
}

impl Shared {
    pub(crate) async fn route_frame(&self, frame: Bytes) {
        self.router.route(frame, self).await;
    }

    async fn request(&self, mut request: Request) -> Result<Response> {
        let (id, writer, reply, payload) = {
            let mut state = self.state.lock().await;
            let writer = state.live_writer()?;

            state.next_id += 1;
            let id = state.next_id.to_string();
            request.stamp_id(&id);
            let payload = request.to_json()?;
            let reply = state.correlator.register(&id, writer.epoch())?;
            (id, writer, reply, payload)
        };

        debug!(
            id,
            epoch = writer.epoch(),
            command = request.command().unwrap_or_default(),
            "Sending request"
        );
        if let Err(e) = writer.send_text(payload).await {
            self.state.lock().await.correlator.cancel(&id);
            return Err(e);
        }

        let timeout = self.config.request_timeout();
        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::Closed),
            Err(_) => {
                self.state.lock().await.correlator.cancel(&id);
                warn!(id, ?timeout, "Request timed out");
                Err(ClientError::Timeout { id, timeout })
            }
        }
    }

    async fn ping(&self, payload: Bytes) -> Result<()> {
        let writer = self.state.lock().await.live_writer()?;
        trace!(epoch = writer.epoch(), len = payload.len(), "Sending ping");
        writer.ping(payload).await
    }

    async fn subscribe(&self, streams: Vec<String>) -> Result<Response> {
        let response = self
            .request(Request::new("subscribe").with("streams", streams.clone()))
            .await?;
        if response.is_success() {
            self.state.lock().await.subscriptions.add(&streams);
            info!(?streams, "Subscribed");
        } else {
            warn!(?streams, error = response.error(), "Subscribe rejected");
        }
        Ok(response)
    }

    async fn unsubscribe(&self, streams: Vec<String>) -> Result<Response> {
        let response = self
            .request(Request::new("unsubscribe").with("streams", streams.clone()))
            .await?;
        if response.is_success() {
            self.state.lock().await.subscriptions.remove(&streams);
            info!(?streams, "Unsubscribed");
        } else {
            warn!(?streams, error = response.error(), "Unsubscribe rejected");
        }
        Ok(response)
    }

    async fn reconnect(self: &Arc<Self>) -> Result<()> {
        let previous = {
            let mut state = self.state.lock().await;
            match state.lifecycle {
                lifecycle if lifecycle.is_terminal() => return Err(ClientError::Closed),
                ConnectionState::Connecting => return Err(ClientError::ReconnectInProgress),
                _ => {}
            }
            state.lifecycle = ConnectionState::Connecting;
            state.connection.take()
        };

        if let Some(previous) = previous {
            self.manager.teardown(previous).await;
        }

        let connection = match self
            .manager
            .dial(Arc::downgrade(self), self.lost_tx.clone())
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                let mut state = self.state.lock().await;
                if state.lifecycle == ConnectionState::Connecting {
                    state.lifecycle = ConnectionState::Disconnected;
                }
                return Err(e);
            }
        };

        let (epoch, replay) = {
            let mut state = self.state.lock().await;
            if state.lifecycle.is_terminal() {
                drop(state);
                self.manager.teardown(connection).await;
                return Err(ClientError::Closed);
            }

            let epoch = connection.epoch();
            let lost_early = connection.is_lost();
            state.connection = Some(connection);
            state.lifecycle = ConnectionState::Connected;

            if lost_early {
                let lost = ConnectionLost {
                    epoch,
                    error: ClientError::connection_lost("lost before the epoch was installed"),
                };
                if self.lost_tx.send(lost).is_err() {
                    debug!(epoch, "Recovery task gone");
                }
            }
            (epoch, state.subscriptions.snapshot())
        };

        if !replay.is_empty() {
            info!(epoch, streams = ?replay, "Replaying subscriptions");
            let response = self.subscribe(replay).await?;
            if !response.is_success() {
                warn!(epoch, error = response.error(), "Node rejected subscription replay");
            }
        }
        Ok(())
    }

    async fn recover(self: &Arc<Self>, lost: ConnectionLost) {
        {
            let state = self.state.lock().await;
            let current = state.connection.as_ref().map(Connection::epoch);
            if state.lifecycle != ConnectionState::Connected || current != Some(lost.epoch) {
                debug!(epoch = lost.epoch, ?current, "Ignoring loss of stale epoch");
                return;
            }
        }

        info!(epoch = lost.epoch, error = %lost.error, "Reconnecting after connection loss");
        match self.reconnect().await {
            Ok(()) => info!(previous_epoch = lost.epoch, "Reconnected"),
            Err(e) => error!(previous_epoch = lost.epoch, error = %e, "Automatic reconnect failed"),
        }
    }

    async fn close(&self) -> Result<()> {
        let connection = {
            let mut state = self.state.lock().await;
            if state.lifecycle.is_terminal() {
                return Ok(());
            }
            state.lifecycle = ConnectionState::Closing;
            let released = state.correlator.cancel_all();
            if released > 0 {
                debug!(released, "Released pending requests");
            }
            state.connection.take()
        };

        self.router.queues().close_all();
        let result = match connection {
            Some(connection) => self.manager.shutdown(connection).await,
            None => Ok(()),
        };

        self.state.lock().await.lifecycle = ConnectionState::Closed;
        info!("Client closed");
        result
    }
}

impl ReplyResolver for Shared {
    fn resolve_reply(&self, id: &str, response: Response) -> impl Future<Output = bool> + Send {
        async move { self.state.lock().await.correlator.resolve(id, response) }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(connection) = &self.state.get_mut().connection {
            connection.signal_stop();
        }
    }
}

async fn run_recovery(shared: Weak<Shared>, mut lost_rx: mpsc::UnboundedReceiver<ConnectionLost>) {
    while let Some(lost) = lost_rx.recv().await {
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.recover(lost).await;
    }
    debug!("Recovery task exiting");
}

/// Persistent client for one ledger node. Cheap to clone; clones share the
/// connection, queues and subscriptions.
#[derive(Debug, Clone)]
pub struct Client {
    shared: Arc<Shared>,
}

impl Client {
    /// Validate `config`, dial the node and start the background tasks.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        let config = config.normalized();
        config.validate()?;
        let config = Arc::new(config);

        let (lost_tx, lost_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            manager: ConnectionManager::new(Arc::clone(&config)),
            router: StreamRouter::new(StreamQueues::new(
                config.queue_capacity,
                config.overflow_policy,
            )),
            state: Mutex::new(ClientState {
                lifecycle: ConnectionState::Disconnected,
                connection: None,
                correlator: RequestCorrelator::new(),
                subscriptions: SubscriptionRegistry::new(),
                next_id: 0,
            }),
            lost_tx,
            config,
        });

        tokio::spawn(run_recovery(Arc::downgrade(&shared), lost_rx));
        shared.reconnect().await?;

        Ok(Self { shared })
    }

    /// Send `request` and wait for its reply.
    ///
    /// The request is stamped with a fresh id. The wait is bounded by the
    /// configured request timeout.
    pub async fn request(&self, request: Request) -> Result<Response> {
        self.shared.request(request).await
    }

    /// Send a websocket ping on the live epoch. The matching pong extends the
    /// read and write deadlines like a heartbeat reply.
    pub async fn ping(&self, payload: impl Into<Bytes>) -> Result<()> {
        self.shared.ping(payload.into()).await
    }

    /// Subscribe to `streams`. The registry is updated only when the node
    /// reports success.
    pub async fn subscribe<I, S>(&self, streams: I) -> Result<Response>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared
            .subscribe(streams.into_iter().map(Into::into).collect())
            .await
    }

    /// Unsubscribe from `streams`. The registry is updated only when the node
    /// reports success.
    pub async fn unsubscribe<I, S>(&self, streams: I) -> Result<Response>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shared
            .unsubscribe(streams.into_iter().map(Into::into).collect())
            .await
    }

    /// Replace the current connection with a fresh one and replay
    /// subscriptions. Rejected once the client is closing.
    pub async fn reconnect(&self) -> Result<()> {
        self.shared.reconnect().await
    }

    /// Shut the client down. Calling it again is a no-op.
    pub async fn close(&self) -> Result<()> {
        self.shared.close().await
    }

    /// Sorted snapshot of confirmed subscriptions.
    pub async fn subscriptions(&self) -> Vec<String> {
        self.shared.state.lock().await.subscriptions.snapshot()
    }

    /// Current lifecycle state.
    pub async fn state(&self) -> ConnectionState {
        self.shared.state.lock().await.lifecycle
    }

    /// Details of the live epoch, if any.
    pub async fn epoch_info(&self) -> Option<EpochInfo> {
        self.shared
            .state
            .lock()
            .await
            .connection
            .as_ref()
            .map(Connection::info)
    }

    /// Number of requests awaiting a reply.
    pub async fn pending_requests(&self) -> usize {
        self.shared.state.lock().await.correlator.len()
    }

    /// The configuration in effect, after normalization.
    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Output queue for `category`.
    pub fn stream(&self, category: StreamCategory) -> StreamQueue {
        self.shared.router.queues().get(category).clone()
    }

    /// `ledgerClosed` frames.
    pub fn ledger_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Ledger)
    }

    /// `transaction` frames.
    pub fn transaction_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Transaction)
    }

    /// `validationReceived` frames.
    pub fn validation_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Validation)
    }

    /// `manifestReceived` frames.
    pub fn manifest_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Manifest)
    }

    /// `peerStatusChange` frames.
    pub fn peer_status_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::PeerStatus)
    }

    /// `consensusPhase` frames.
    pub fn consensus_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Consensus)
    }

    /// `path_find` frames.
    pub fn path_find_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::PathFind)
    }

    /// `serverStatus` frames.
    pub fn server_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Server)
    }

    /// Frames that matched no known stream.
    pub fn default_stream(&self) -> StreamQueue {
        self.stream(StreamCategory::Default)
    }
}
