//! Bounded output queues for pushed stream frames.
//!
//! There is one queue per [`StreamCategory`]. The router is the only producer;
//! any number of consumers may hold cloned [`StreamQueue`] handles. Queues
//! outlive reconnects and are closed only when the client closes.

use crate::stream::StreamCategory;
use async_channel::{Receiver, Sender, TrySendError};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// What a full queue does with an incoming frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued frame to make room
    #[default]
    DropOldest,
    /// Discard the incoming frame
    DropNewest,
    /// Wait for a consumer to make room (stalls the read loop)
    Block,
}

/// Result of handing a frame to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Frame queued without loss
    Enqueued,
    /// Frame queued after evicting the oldest frame
    DroppedOldest,
    /// Queue was full, frame discarded
    DroppedNewest,
    /// Queue is closed, frame discarded
    Closed,
}

/// Handle to one bounded output queue.
///
/// Clones share the same channel, so any number of consumers may receive.
#[derive(Debug, Clone)]
pub struct StreamQueue {
    category: StreamCategory,
    capacity: usize,
    policy: OverflowPolicy,
    sender: Sender<Bytes>,
    receiver: Receiver<Bytes>,
    dropped: Arc<AtomicU64>,
}

impl StreamQueue {
    pub(crate) fn new(category: StreamCategory, capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = async_channel::bounded(capacity);
        Self {
            category,
            capacity,
            policy,
            sender,
            receiver,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) async fn push(&self, frame: Bytes) -> PushOutcome {
        match self.policy {
            OverflowPolicy::DropOldest => match self.sender.force_send(frame) {
                Ok(None) => PushOutcome::Enqueued,
                Ok(Some(_evicted)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    PushOutcome::DroppedOldest
                }
                Err(_) => PushOutcome::Closed,
            },
            OverflowPolicy::DropNewest => match self.sender.try_send(frame) {
                Ok(()) => PushOutcome::Enqueued,
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    PushOutcome::DroppedNewest
                }
                Err(TrySendError::Closed(_)) => PushOutcome::Closed,
            },
            OverflowPolicy::Block => match self.sender.send(frame).await {
                Ok(()) => PushOutcome::Enqueued,
                Err(_) => PushOutcome::Closed,
            },
        }
    }

    /// Wait for the next frame. Returns `None` once closed and drained.
    pub async fn recv(&self) -> Option<Bytes> {
        self.receiver.recv().await.ok()
    }

    /// Take the next frame if one is queued.
    pub fn try_recv(&self) -> Option<Bytes> {
        self.receiver.try_recv().ok()
    }

    /// Close the channel. Queued frames stay receivable; blocked producers
    /// are released.
    pub(crate) fn close(&self) {
        self.sender.close();
    }

    /// Category this queue carries.
    pub fn category(&self) -> StreamCategory {
        self.category
    }

    /// Maximum number of queued frames.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Overflow policy in effect.
    pub fn policy(&self) -> OverflowPolicy {
        self.policy
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    /// Whether no frames are queued.
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    /// Whether the queue was closed.
    pub fn is_closed(&self) -> bool {
        self.receiver.is_closed()
    }

    /// Frames lost to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// The full set of nine output queues.
#[derive(Debug, Clone)]
pub struct StreamQueues {
    queues: [StreamQueue; StreamCategory::COUNT],
}

impl StreamQueues {
    /// Create every queue with the same capacity and policy.
    pub(crate) fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            queues: StreamCategory::ALL.map(|category| StreamQueue::new(category, capacity, policy)),
        }
    }

    /// Queue for `category`.
    pub fn get(&self, category: StreamCategory) -> &StreamQueue {
        // COUNT-sized array indexed by a dense discriminant
        &self.queues[category.index()]
    }

    /// Iterate every queue in category order.
    pub fn iter(&self) -> impl Iterator<Item = &StreamQueue> {
        self.queues.iter()
    }

    pub(crate) fn close_all(&self) {
        for queue in &self.queues {
            queue.close();
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn frame(n: u32) -> Bytes {
        Bytes::from(format!(r#"{{"seq":{n}}}"#))
    }

    #[tokio::test]
    async fn test_fifo_delivery() {
        let queue = StreamQueue::new(StreamCategory::Ledger, 4, OverflowPolicy::DropOldest);
        for n in 0..3 {
            assert_eq!(queue.push(frame(n)).await, PushOutcome::Enqueued);
        }

        for n in 0..3 {
            assert_eq!(queue.recv().await, Some(frame(n)));
        }
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_drop_oldest_keeps_newest_frames() {
        let queue = StreamQueue::new(StreamCategory::Transaction, 2, OverflowPolicy::DropOldest);
        queue.push(frame(1)).await;
        queue.push(frame(2)).await;
        assert_eq!(queue.push(frame(3)).await, PushOutcome::DroppedOldest);

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_recv(), Some(frame(2)));
        assert_eq!(queue.try_recv(), Some(frame(3)));
        assert_eq!(queue.try_recv(), None);
    }

    #[tokio::test]
    async fn test_drop_newest_keeps_oldest_frames() {
        let queue = StreamQueue::new(StreamCategory::Server, 2, OverflowPolicy::DropNewest);
        queue.push(frame(1)).await;
        queue.push(frame(2)).await;
        assert_eq!(queue.push(frame(3)).await, PushOutcome::DroppedNewest);

        assert_eq!(queue.dropped(), 1);
        assert_eq!(queue.try_recv(), Some(frame(1)));
        assert_eq!(queue.try_recv(), Some(frame(2)));
    }

    #[tokio::test]
    async fn test_block_waits_for_space() {
        let queue = StreamQueue::new(StreamCategory::Validation, 1, OverflowPolicy::Block);
        queue.push(frame(1)).await;

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(frame(2)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.recv().await, Some(frame(1)));
        let outcome = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer unblocked")
            .expect("producer task");
        assert_eq!(outcome, PushOutcome::Enqueued);
        assert_eq!(queue.recv().await, Some(frame(2)));
        assert_eq!(queue.dropped(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_blocked_producer() {
        let queue = StreamQueue::new(StreamCategory::Manifest, 1, OverflowPolicy::Block);
        queue.push(frame(1)).await;

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.push(frame(2)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let outcome = tokio::time::timeout(Duration::from_secs(1), producer)
            .await
            .expect("producer released")
            .expect("producer task");
        assert_eq!(outcome, PushOutcome::Closed);
    }

    #[tokio::test]
    async fn test_close_drains_then_ends_consumers() {
        let queue = StreamQueue::new(StreamCategory::Default, 4, OverflowPolicy::DropOldest);
        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Some(frame) = queue.recv().await {
                    seen.push(frame);
                }
                seen
            })
        };

        queue.push(frame(1)).await;
        queue.push(frame(2)).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let seen = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer finished")
            .expect("consumer task");
        assert_eq!(seen, vec![frame(1), frame(2)]);
        assert_eq!(queue.push(frame(3)).await, PushOutcome::Closed);
    }

    #[tokio::test]
    async fn test_clones_share_one_channel() {
        let queue = StreamQueue::new(StreamCategory::PathFind, 4, OverflowPolicy::DropOldest);
        let other = queue.clone();
        queue.push(frame(1)).await;
        queue.push(frame(2)).await;

        assert_eq!(other.try_recv(), Some(frame(1)));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.try_recv(), Some(frame(2)));
        assert!(other.is_empty());
    }

    #[test]
    fn test_queue_set_covers_every_category() {
        let queues = StreamQueues::new(8, OverflowPolicy::DropNewest);
        for category in StreamCategory::ALL {
            let queue = queues.get(category);
            assert_eq!(queue.category(), category);
            assert_eq!(queue.capacity(), 8);
            assert_eq!(queue.policy(), OverflowPolicy::DropNewest);
        }
        assert_eq!(queues.iter().count(), StreamCategory::COUNT);
    }
}
