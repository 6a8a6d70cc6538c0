//! # xrpl-client
//!
//! A persistent websocket client runtime for XRPL and Xahau ledger nodes.
//!
//! ## Features
//!
//! - **Request correlation**: any number of concurrent requests, matched to
//!   replies by id with a per-request deadline
//! - **Stream fan-out**: pushed frames routed by `type` into nine bounded
//!   queues with a configurable overflow policy
//! - **Heartbeats**: periodic pings; pongs extend the read and write deadlines
//! - **Recovery**: a lost connection is rebuilt and subscriptions replayed
//! - **Layered configuration**: defaults, TOML files and `XRPL_CLIENT_*`
//!   environment variables via figment
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use xrpl_client::{Client, ConfigLoader, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigLoader::new("xrpl-client").load()?;
//!     let client = Client::connect(config).await?;
//!
//!     let fee = client.request(Request::new("fee")).await?;
//!     println!("{:?}", fee.result());
//!
//!     client.subscribe(["ledger", "transactions"]).await?;
//!     let ledgers = client.ledger_stream();
//!     if let Some(frame) = ledgers.recv().await {
//!         println!("{}", String::from_utf8_lossy(&frame));
//!     }
//!
//!     client.close().await?;
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod connection;
pub mod correlator;
pub mod error;
pub mod heartbeat;
pub mod network;
pub mod queue;
pub mod request;
pub mod router;
pub mod stream;
pub mod subscription;
pub mod time;

pub use client::{Client, ConnectionState};
pub use config::{ClientConfig, ConfigLoader};
pub use connection::{EpochInfo, UpgradeInfo};
pub use error::{ClientError, Result};
pub use heartbeat::HeartbeatState;
pub use network::Network;
pub use queue::{OverflowPolicy, StreamQueue, StreamQueues};
pub use request::{Request, Response};
pub use stream::{StreamCategory, StreamType};
