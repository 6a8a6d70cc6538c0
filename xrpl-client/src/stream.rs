//! Stream names, inbound `type` discriminators and queue categories.
//!
//! The node tags every pushed frame with a `type` field. Each stream a caller
//! can subscribe to maps to exactly one discriminator, and each discriminator
//! is delivered to one of nine output queues ([`StreamCategory`]).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Subscribable stream names plus the synthetic `response` reply type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    /// Closed ledger notifications
    Ledger,
    /// Validated transactions
    Transactions,
    /// Proposed and validated transactions
    TransactionsProposed,
    /// Validation votes
    Validations,
    /// Validator manifest updates
    Manifests,
    /// Peer status changes (admin only)
    PeerStatus,
    /// Consensus phase changes
    Consensus,
    /// Path-finding updates
    PathFind,
    /// Server status changes
    Server,
    /// Correlated command replies
    Response,
}

impl StreamType {
    /// Every stream type, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::Ledger,
        Self::Transactions,
        Self::TransactionsProposed,
        Self::Validations,
        Self::Manifests,
        Self::PeerStatus,
        Self::Consensus,
        Self::PathFind,
        Self::Server,
        Self::Response,
    ];

    /// Name used in `subscribe`/`unsubscribe` commands.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ledger => "ledger",
            Self::Transactions => "transactions",
            Self::TransactionsProposed => "transactions_proposed",
            Self::Validations => "validations",
            Self::Manifests => "manifests",
            Self::PeerStatus => "peer_status",
            Self::Consensus => "consensus",
            Self::PathFind => "path_find",
            Self::Server => "server",
            Self::Response => "response",
        }
    }

    /// The `type` value the node puts on frames of this stream.
    pub const fn response_type(self) -> &'static str {
        match self {
            Self::Ledger => "ledgerClosed",
            Self::Transactions | Self::TransactionsProposed => "transaction",
            Self::Validations => "validationReceived",
            Self::Manifests => "manifestReceived",
            Self::PeerStatus => "peerStatusChange",
            Self::Consensus => "consensusPhase",
            Self::PathFind => "path_find",
            Self::Server => "serverStatus",
            Self::Response => "response",
        }
    }

    /// Queue that receives frames of this stream. Replies have no queue.
    pub const fn category(self) -> Option<StreamCategory> {
        match self {
            Self::Ledger => Some(StreamCategory::Ledger),
            Self::Transactions | Self::TransactionsProposed => Some(StreamCategory::Transaction),
            Self::Validations => Some(StreamCategory::Validation),
            Self::Manifests => Some(StreamCategory::Manifest),
            Self::PeerStatus => Some(StreamCategory::PeerStatus),
            Self::Consensus => Some(StreamCategory::Consensus),
            Self::PathFind => Some(StreamCategory::PathFind),
            Self::Server => Some(StreamCategory::Server),
            Self::Response => None,
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown stream name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stream name: {0}")]
pub struct UnknownStream(pub String);

impl FromStr for StreamType {
    type Err = UnknownStream;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stream| stream.as_str() == s)
            .ok_or_else(|| UnknownStream(s.to_owned()))
    }
}

/// Map a stream name to its inbound discriminator.
///
/// Unknown names yield the empty string, which never matches a frame.
pub fn response_type(stream: &str) -> &'static str {
    stream
        .parse::<StreamType>()
        .map(StreamType::response_type)
        .unwrap_or("")
}

/// One of the nine output queues push frames are delivered to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamCategory {
    /// `ledgerClosed` frames
    Ledger,
    /// `transaction` frames
    Transaction,
    /// `validationReceived` frames
    Validation,
    /// `manifestReceived` frames
    Manifest,
    /// `peerStatusChange` frames
    PeerStatus,
    /// `consensusPhase` frames
    Consensus,
    /// `path_find` frames
    PathFind,
    /// `serverStatus` frames
    Server,
    /// Anything unrecognised
    Default,
}

impl StreamCategory {
    /// Number of output queues.
    pub const COUNT: usize = 9;

    /// Every category, indexed by [`StreamCategory::index`].
    pub const ALL: [Self; Self::COUNT] = [
        Self::Ledger,
        Self::Transaction,
        Self::Validation,
        Self::Manifest,
        Self::PeerStatus,
        Self::Consensus,
        Self::PathFind,
        Self::Server,
        Self::Default,
    ];

    /// Stable position of this category in [`StreamCategory::ALL`].
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Short name used in logs.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ledger => "ledger",
            Self::Transaction => "transaction",
            Self::Validation => "validation",
            Self::Manifest => "manifest",
            Self::PeerStatus => "peer_status",
            Self::Consensus => "consensus",
            Self::PathFind => "path_find",
            Self::Server => "server",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for StreamCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
