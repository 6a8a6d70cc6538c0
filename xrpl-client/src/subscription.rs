//! Confirmed stream subscriptions, replayed after every reconnect.

use std::collections::BTreeSet;

/// Set of stream names the node has acknowledged.
///
/// Adding a name twice is a no-op, as is removing an absent one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionRegistry {
    streams: BTreeSet<String>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Union `streams` into the set.
    pub fn add<I, S>(&mut self, streams: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.streams
            .extend(streams.into_iter().map(|s| s.as_ref().to_owned()));
    }

    /// Remove `streams` from the set.
    pub fn remove<I, S>(&mut self, streams: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for stream in streams {
            self.streams.remove(stream.as_ref());
        }
    }

    /// Sorted copy of the current set.
    pub fn snapshot(&self) -> Vec<String> {
        self.streams.iter().cloned().collect()
    }

    /// Whether `stream` is subscribed.
    pub fn contains(&self, stream: &str) -> bool {
        self.streams.contains(stream)
    }

    /// Number of subscribed streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether nothing is subscribed.
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}
