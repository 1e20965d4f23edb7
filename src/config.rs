//! Service configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`). Unset or unparsable numeric values
//! fall back to defaults; an unparsable listen address or backpressure
//! policy is a startup error.

use std::net::SocketAddr;
use std::time::Duration;

use crate::domain::BackpressurePolicy;
use crate::error::ConfigError;

/// Top-level service configuration.
///
/// Loaded once at startup via [`ServerConfig::from_env`].
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:8080`).
    pub listen_addr: SocketAddr,

    /// Reconnect hint sent to clients in the first SSE frame.
    pub sse_retry: Duration,

    /// Settings consumed by the pub/sub core.
    pub pubsub: PubSubConfig,
}

/// The configuration surface consumed by the pub/sub core.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// Per-channel buffer capacity.
    pub channel_capacity: usize,

    /// What to do when a channel buffer is full.
    pub backpressure: BackpressurePolicy,

    /// Period of the heartbeat driver.
    pub heartbeat_interval: Duration,

    /// Inactivity after which a channel is considered dead.
    pub dead_connection_timeout: Duration,

    /// Envelopes retained per topic for reconnect catch-up.
    pub replay_retention: usize,

    /// Upper bound on handing one frame to the outbound stream.
    pub write_timeout: Duration,

    /// Upper bound on waiting for streams to close at shutdown.
    pub shutdown_grace: Duration,

    /// Maximum lifetime of one stream; `None` means unlimited.
    pub stream_timeout: Option<Duration>,

    /// Maximum encoded envelope size in bytes.
    pub max_payload_bytes: usize,

    /// Maximum number of topics a single stream may request.
    pub max_topics_per_stream: usize,

    /// Maximum number of topic logs kept at once. Idle logs are evicted
    /// past this bound.
    pub max_topics: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            sse_retry: Duration::from_millis(3000),
            pubsub: PubSubConfig::default(),
        }
    }
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            backpressure: BackpressurePolicy::DropOldest,
            heartbeat_interval: Duration::from_secs(15),
            dead_connection_timeout: Duration::from_secs(45),
            replay_retention: 256,
            write_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(5),
            stream_timeout: None,
            max_payload_bytes: 64 * 1024,
            max_topics_per_stream: 32,
            max_topics: 10_000,
        }
    }
}

impl PubSubConfig {
    /// Checks that every bound the core relies on is non-zero.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MustBePositive`] naming the first offending
    /// setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.channel_capacity == 0 {
            return Err(ConfigError::MustBePositive("CHANNEL_CAPACITY"));
        }
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::MustBePositive("HEARTBEAT_INTERVAL_SECS"));
        }
        if self.dead_connection_timeout.is_zero() {
            return Err(ConfigError::MustBePositive("DEAD_CONNECTION_TIMEOUT_SECS"));
        }
        if self.write_timeout.is_zero() {
            return Err(ConfigError::MustBePositive("WRITE_TIMEOUT_SECS"));
        }
        if self.max_payload_bytes == 0 {
            return Err(ConfigError::MustBePositive("MAX_PAYLOAD_BYTES"));
        }
        if self.max_topics_per_stream == 0 {
            return Err(ConfigError::MustBePositive("MAX_TOPICS_PER_STREAM"));
        }
        if self.max_topics == 0 {
            return Err(ConfigError::MustBePositive("MAX_TOPICS"));
        }
        Ok(())
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if `LISTEN_ADDR` or `BACKPRESSURE_POLICY`
    /// is set but cannot be parsed, or if a bound is zero.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let raw_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let listen_addr: SocketAddr = raw_addr.parse().map_err(|_| ConfigError::InvalidValue {
            key: "LISTEN_ADDR",
            value: raw_addr.clone(),
        })?;

        let backpressure: BackpressurePolicy = match std::env::var("BACKPRESSURE_POLICY") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "BACKPRESSURE_POLICY",
                value: raw.clone(),
            })?,
            Err(_) => BackpressurePolicy::default(),
        };

        let defaults = PubSubConfig::default();
        let stream_timeout_secs: u64 = parse_env("STREAM_TIMEOUT_SECS", 0);

        let pubsub = PubSubConfig {
            channel_capacity: parse_env("CHANNEL_CAPACITY", defaults.channel_capacity),
            backpressure,
            heartbeat_interval: parse_secs("HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval),
            dead_connection_timeout: parse_secs(
                "DEAD_CONNECTION_TIMEOUT_SECS",
                defaults.dead_connection_timeout,
            ),
            replay_retention: parse_env("REPLAY_RETENTION", defaults.replay_retention),
            write_timeout: parse_secs("WRITE_TIMEOUT_SECS", defaults.write_timeout),
            shutdown_grace: parse_secs("SHUTDOWN_GRACE_SECS", defaults.shutdown_grace),
            stream_timeout: (stream_timeout_secs > 0)
                .then(|| Duration::from_secs(stream_timeout_secs)),
            max_payload_bytes: parse_env("MAX_PAYLOAD_BYTES", defaults.max_payload_bytes),
            max_topics_per_stream: parse_env(
                "MAX_TOPICS_PER_STREAM",
                defaults.max_topics_per_stream,
            ),
            max_topics: parse_env("MAX_TOPICS", defaults.max_topics),
        };
        pubsub.validate()?;

        Ok(Self {
            listen_addr,
            sse_retry: Duration::from_millis(parse_env("SSE_RETRY_MS", 3000)),
            pubsub,
        })
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parses an environment variable holding whole seconds.
fn parse_secs(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}
