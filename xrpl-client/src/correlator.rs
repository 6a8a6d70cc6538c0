//! Matches replies to the callers waiting for them.

use crate::error::{ClientError, Result};
use crate::request::Response;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, error};

/// A caller waiting for the reply to one request.
#[derive(Debug)]
pub struct PendingRequest {
    slot: oneshot::Sender<Response>,
    registered_at: Instant,
    epoch: u64,
}

impl PendingRequest {
    /// When the request was registered.
    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    /// Connection epoch the request was written to.
    pub fn epoch(&self) -> u64 {
        self.epoch
    }
}

/// Pending request table keyed by request id.
///
/// Each slot is written at most once: the entry is removed before the reply is
/// handed over, and duplicate ids are refused.
#[derive(Debug, Default)]
pub struct RequestCorrelator {
    pending: HashMap<String, PendingRequest>,
}

impl RequestCorrelator {
    /// Create an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id` and return the receiving end of its delivery slot.
    pub fn register(&mut self, id: &str, epoch: u64) -> Result<oneshot::Receiver<Response>> {
        if self.pending.contains_key(id) {
            error!(id, "Request id already pending");
            return Err(ClientError::DuplicateId(id.to_owned()));
        }

        let (slot, receiver) = oneshot::channel();
        self.pending.insert(
            id.to_owned(),
            PendingRequest {
                slot,
                registered_at: Instant::now(),
                epoch,
            },
        );
        Ok(receiver)
    }

    /// Deliver `response` to the caller waiting on `id`.
    ///
    /// Returns `false` when nobody is waiting, either because the id is
    /// unknown or because the caller already gave up.
    pub fn resolve(&mut self, id: &str, response: Response) -> bool {
        let Some(pending) = self.pending.remove(id) else {
            return false;
        };

        let waited = pending.registered_at.elapsed();
        let delivered = pending.slot.send(response).is_ok();
        debug!(id, epoch = pending.epoch, ?waited, delivered, "Resolved request");
        delivered
    }

    /// Forget `id` without delivering anything.
    pub fn cancel(&mut self, id: &str) -> bool {
        self.pending.remove(id).is_some()
    }

    /// Drop every slot, releasing all waiters. Returns how many were pending.
    pub fn cancel_all(&mut self) -> usize {
        let released = self.pending.len();
        self.pending.clear();
        released
    }

    /// Whether `id` is awaiting a reply.
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Look up a pending request.
    pub fn get(&self, id: &str) -> Option<&PendingRequest> {
        self.pending.get(id)
    }

    /// Number of pending requests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
