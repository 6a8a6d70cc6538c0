//! Inbound frame classification and delivery.
//!
//! Every text frame is decoded, classified by its `type` field and either
//! resolves a pending request or lands in one of the output queues.

use crate::error::Result;
use crate::queue::{PushOutcome, StreamQueues};
use crate::request::Response;
use crate::stream::{StreamCategory, StreamType};
use bytes::Bytes;
use std::future::Future;
use tracing::{debug, trace, warn};

/// Discriminators checked in order before falling back to `response`.
const ROUTING_TABLE: [StreamType; 8] = [
    StreamType::Ledger,
    StreamType::Transactions,
    StreamType::Validations,
    StreamType::Manifests,
    StreamType::PeerStatus,
    StreamType::Consensus,
    StreamType::PathFind,
    StreamType::Server,
];

/// Where a decoded frame should go.
#[derive(Debug, Clone, PartialEq)]
pub enum Route {
    /// Push frame for an output queue
    Stream(StreamCategory),
    /// Reply to a pending request; `id` is `None` when absent or null
    Reply {
        /// Correlation id as a string
        id: Option<String>,
        /// The decoded reply
        response: Response,
    },
}

/// What happened to a routed frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Queued without loss
    Queued(StreamCategory),
    /// Queued or discarded with loss under the overflow policy
    Overflowed(StreamCategory),
    /// Queue already closed, frame discarded
    QueueClosed(StreamCategory),
    /// Delivered to a waiting caller
    Resolved,
    /// Reply with no waiting caller, discarded
    Unmatched,
    /// Not a JSON object, discarded
    Malformed,
}

/// Decode `frame` and decide where it goes.
pub fn classify(frame: &[u8]) -> Result<Route> {
    let response = Response::from_slice(frame)?;
    let kind = response.response_type().unwrap_or_default();

    for stream in ROUTING_TABLE {
        if kind == stream.response_type()
            && let Some(category) = stream.category()
        {
            return Ok(Route::Stream(category));
        }
    }

    if kind == StreamType::Response.response_type() {
        return Ok(Route::Reply {
            id: response.id(),
            response,
        });
    }

    Ok(Route::Stream(StreamCategory::Default))
}

/// Hands replies to whoever is waiting for them.
pub trait ReplyResolver: Sync {
    /// Deliver `response` to the waiter for `id`; `false` if there is none.
    fn resolve_reply(&self, id: &str, response: Response) -> impl Future<Output = bool> + Send;
}

/// Routes frames to the correlator or the output queues.
#[derive(Debug, Clone)]
pub struct StreamRouter {
    queues: StreamQueues,
}

impl StreamRouter {
    /// Create a router over `queues`.
    pub fn new(queues: StreamQueues) -> Self {
        Self { queues }
    }

    /// The output queues frames are delivered to.
    pub fn queues(&self) -> &StreamQueues {
        &self.queues
    }

    /// Classify and deliver one inbound frame.
    pub async fn route<R: ReplyResolver>(&self, frame: Bytes, resolver: &R) -> RouteOutcome {
        match classify(&frame) {
            Err(err) => {
                warn!(error = %err, len = frame.len(), "Dropping undecodable frame");
                RouteOutcome::Malformed
            }
            Ok(Route::Reply { id, response }) => {
                let Some(id) = id else {
                    debug!("Dropping reply without id");
                    return RouteOutcome::Unmatched;
                };
                if resolver.resolve_reply(&id, response).await {
                    RouteOutcome::Resolved
                } else {
                    debug!(id, "Dropping unmatched reply");
                    RouteOutcome::Unmatched
                }
            }
            Ok(Route::Stream(category)) => match self.queues.get(category).push(frame).await {
                PushOutcome::Enqueued => {
                    trace!(%category, "Queued stream frame");
                    RouteOutcome::Queued(category)
                }
                PushOutcome::DroppedOldest | PushOutcome::DroppedNewest => {
                    warn!(%category, "Output queue full, frame dropped");
                    RouteOutcome::Overflowed(category)
                }
                PushOutcome::Closed => {
                    debug!(%category, "Output queue closed, frame dropped");
                    RouteOutcome::QueueClosed(category)
                }
            },
        }
    }
}
