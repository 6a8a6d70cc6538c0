//! Client configuration with hierarchical overrides using figment.
//!
//! Sources, lowest precedence first:
//! 1. Embedded defaults
//! 2. User configuration file (`~/.config/xrpl-client/config.toml`)
//! 3. An explicit TOML file passed to [`ConfigLoader::with_file`]
//! 4. Environment variables (`XRPL_CLIENT_*`)
//! 5. An explicit URL passed to [`ConfigLoader::with_url`] (command-line flags)
//!
//! Zero-valued durations and capacities mean "use the default".

use crate::error::{ClientError, Result};
use crate::queue::OverflowPolicy;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default read deadline.
pub const DEFAULT_READ_TIMEOUT_MS: u64 = 60_000;
/// Default write deadline.
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 60_000;
/// Default ping interval.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
/// Default dial timeout.
pub const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 60_000;
/// Default per-request deadline.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;
/// Default capacity of each output queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;
/// Upper bound for every configured duration.
pub const MAX_DURATION_MS: u64 = 3_600_000;

/// Settings for one client instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Websocket endpoint, `ws://` or `wss://`
    pub url: String,
    /// Read deadline in milliseconds, extended by every pong
    pub read_timeout_ms: u64,
    /// Write deadline in milliseconds, extended by every pong
    pub write_timeout_ms: u64,
    /// Ping interval in milliseconds
    pub heartbeat_interval_ms: u64,
    /// Dial and upgrade timeout in milliseconds
    pub connection_timeout_ms: u64,
    /// Time a caller waits for a reply, in milliseconds
    pub request_timeout_ms: u64,
    /// Capacity of each output queue
    pub queue_capacity: usize,
    /// What a full output queue does with a new frame
    pub overflow_policy: OverflowPolicy,
    /// Sent as the `Authorization` upgrade header
    pub authorization: Option<String>,
    /// Sent as the `Proxy-Authorization` upgrade header
    pub proxy_authorization: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            read_timeout_ms: DEFAULT_READ_TIMEOUT_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow_policy: OverflowPolicy::default(),
            authorization: None,
            proxy_authorization: None,
        }
    }
}

impl ClientConfig {
    /// Defaults for everything but the endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the read deadline.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the write deadline.
    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the ping interval.
    #[must_use]
    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_ms(interval);
        self
    }

    /// Set the dial timeout.
    #[must_use]
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the per-request deadline.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = duration_ms(timeout);
        self
    }

    /// Set the output queue capacity and overflow policy.
    #[must_use]
    pub const fn with_queue(mut self, capacity: usize, policy: OverflowPolicy) -> Self {
        self.queue_capacity = capacity;
        self.overflow_policy = policy;
        self
    }

    /// Set the `Authorization` header sent on upgrade.
    #[must_use]
    pub fn with_authorization(mut self, value: impl Into<String>) -> Self {
        self.authorization = Some(value.into());
        self
    }

    /// Read deadline as a [`Duration`].
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Write deadline as a [`Duration`].
    pub const fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    /// Ping interval as a [`Duration`].
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Dial timeout as a [`Duration`].
    pub const fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    /// Per-request deadline as a [`Duration`].
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Replace zero values with their defaults.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        let fill = |value: &mut u64, default: u64| {
            if *value == 0 {
                *value = default;
            }
        };
        fill(&mut self.read_timeout_ms, DEFAULT_READ_TIMEOUT_MS);
        fill(&mut self.write_timeout_ms, DEFAULT_WRITE_TIMEOUT_MS);
        fill(&mut self.heartbeat_interval_ms, DEFAULT_HEARTBEAT_INTERVAL_MS);
        fill(&mut self.connection_timeout_ms, DEFAULT_CONNECTION_TIMEOUT_MS);
        fill(&mut self.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);
        if self.queue_capacity == 0 {
            self.queue_capacity = DEFAULT_QUEUE_CAPACITY;
        }
        let url = self.url.trim();
        if url.len() != self.url.len() {
            self.url = url.to_owned();
        }
        self
    }

    /// Check the invariants a connection relies on.
    ///
    /// Expects zero values to have been normalized already.
    pub fn validate(&self) -> Result<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ClientError::config_invalid("url must not be empty"));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ClientError::config_invalid(format!(
                "url must use ws:// or wss://, got {url}"
            )));
        }

        let durations = [
            ("read_timeout_ms", self.read_timeout_ms),
            ("write_timeout_ms", self.write_timeout_ms),
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("connection_timeout_ms", self.connection_timeout_ms),
            ("request_timeout_ms", self.request_timeout_ms),
        ];
        for (name, value) in durations {
            if value == 0 {
                return Err(ClientError::config_invalid(format!(
                    "{name} must be greater than 0"
                )));
            }
            if value > MAX_DURATION_MS {
                return Err(ClientError::config_invalid(format!(
                    "{name} must not exceed {MAX_DURATION_MS}, got {value}"
                )));
            }
        }

        if self.read_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ClientError::config_invalid(
                "read_timeout_ms must be greater than heartbeat_interval_ms",
            ));
        }
        if self.write_timeout_ms <= self.heartbeat_interval_ms {
            return Err(ClientError::config_invalid(
                "write_timeout_ms must be greater than heartbeat_interval_ms",
            ));
        }

        if self.queue_capacity == 0 {
            return Err(ClientError::config_invalid(
                "queue_capacity must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Configuration loader with hierarchical override support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    component: String,
    file: Option<PathBuf>,
    url: Option<String>,
}

impl ConfigLoader {
    /// Create a loader whose environment prefix is derived from `component`.
    pub fn new(component: &str) -> Self {
        Self {
            component: component.to_owned(),
            file: None,
            url: None,
        }
    }

    /// Merge an explicit TOML file above the user configuration file.
    #[must_use]
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Override the endpoint above every other source.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Environment variable prefix, e.g. `XRPL_CLIENT_`.
    pub fn env_prefix(&self) -> String {
        format!("{}_", self.component.replace('-', "_").to_uppercase())
    }

    /// Merge every source, normalize and validate.
    pub fn load(&self) -> Result<ClientConfig> {
        let config: ClientConfig = self.figment().extract()?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// The merged provider stack, before extraction.
    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new().merge(Serialized::defaults(ClientConfig::default()));

        if let Some(user_config_path) = self.user_config_path()
            && user_config_path.exists()
        {
            figment = figment.merge(Toml::file(user_config_path));
        }

        if let Some(path) = &self.file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed(&self.env_prefix()).split("__"));

        if let Some(url) = &self.url {
            figment = figment.merge(Serialized::default("url", url));
        }
        figment
    }

    fn user_config_path(&self) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(&self.component).join("config.toml"))
    }
}
