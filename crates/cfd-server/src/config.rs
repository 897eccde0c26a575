//! Application configuration.

use crate::error::{AppError, AppResult};
use cfd_feed::FeedConfig;
use cfd_persister::PersisterConfig;
use cfd_realtime::RealtimeConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

/// Upstream feed configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedSettings {
    /// WebSocket endpoint of the upstream trade feed.
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Symbols to subscribe and quote.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,
    /// Maximum reconnection attempts (0 = infinite).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
    /// Base delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for reconnection backoff (ms).
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
}

fn default_ws_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_symbols() -> Vec<String> {
    vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
}

fn default_reconnect_base_delay_ms() -> u64 {
    1000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            symbols: default_symbols(),
            max_reconnect_attempts: 0,
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
        }
    }
}

impl From<&FeedSettings> for FeedConfig {
    fn from(cfg: &FeedSettings) -> Self {
        Self {
            url: cfg.ws_url.clone(),
            symbols: cfg.symbols.clone(),
            max_reconnect_attempts: cfg.max_reconnect_attempts,
            reconnect_base_delay_ms: cfg.reconnect_base_delay_ms,
            reconnect_max_delay_ms: cfg.reconnect_max_delay_ms,
        }
    }
}

/// Durable stream and batch persister configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    /// Stream name.
    #[serde(default = "default_stream_name")]
    pub name: String,
    /// Consumer group name.
    #[serde(default = "default_group")]
    pub group: String,
    /// This process's consumer name.
    #[serde(default = "default_consumer")]
    pub consumer: String,
    /// Maximum entries per stream read.
    #[serde(default = "default_read_count")]
    pub read_count: usize,
    /// Blocking read timeout (ms).
    #[serde(default = "default_block_ms")]
    pub block_ms: u64,
    /// Flush batch size.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Flush interval (ms).
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_stream_name() -> String {
    "trades".to_string()
}

fn default_group() -> String {
    "trade-uploaders".to_string()
}

fn default_consumer() -> String {
    "uploader-1".to_string()
}

fn default_read_count() -> usize {
    50
}

fn default_block_ms() -> u64 {
    1000
}

fn default_batch_size() -> usize {
    100
}

fn default_flush_interval_ms() -> u64 {
    5000
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            name: default_stream_name(),
            group: default_group(),
            consumer: default_consumer(),
            read_count: default_read_count(),
            block_ms: default_block_ms(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl From<&StreamSettings> for PersisterConfig {
    fn from(cfg: &StreamSettings) -> Self {
        Self {
            group: cfg.group.clone(),
            consumer: cfg.consumer.clone(),
            read_count: cfg.read_count,
            block_ms: cfg.block_ms,
            batch_size: cfg.batch_size,
            flush_interval_ms: cfg.flush_interval_ms,
        }
    }
}

/// Realtime fan-out configuration subset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    #[serde(default = "default_realtime_port")]
    pub port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_realtime_port() -> u16 {
    8081
}

fn default_max_connections() -> usize {
    256
}

fn default_broadcast_capacity() -> usize {
    64
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            port: default_realtime_port(),
            max_connections: default_max_connections(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

/// Account provisioning at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSettings {
    /// User ids to provision at startup.
    #[serde(default)]
    pub user_ids: Vec<Uuid>,
    /// Starting cash balance per provisioned account.
    #[serde(default = "default_starting_balance")]
    pub starting_balance: Decimal,
}

fn default_starting_balance() -> Decimal {
    Decimal::from(10_000)
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            user_ids: Vec::new(),
            starting_balance: default_starting_balance(),
        }
    }
}

/// Trade persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceSettings {
    /// Directory for the JSON Lines trade log. Empty disables the log
    /// (trades stay in memory only).
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

fn default_data_dir() -> String {
    "./data/trades".to_string()
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub feed: FeedSettings,
    #[serde(default)]
    pub stream: StreamSettings,
    #[serde(default)]
    pub realtime: RealtimeSettings,
    #[serde(default)]
    pub accounts: AccountSettings,
    #[serde(default)]
    pub persistence: PersistenceSettings,
}

impl AppConfig {
    /// Load configuration, falling back to defaults when the file is
    /// missing.
    pub fn load(path: &str) -> AppResult<Self> {
        if Path::new(path).exists() {
            Self::from_file(path)
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }

    /// Realtime config with the feed's symbol list advertised in the
    /// connect greeting.
    pub fn realtime_config(&self) -> RealtimeConfig {
        RealtimeConfig {
            port: self.realtime.port,
            max_connections: self.realtime.max_connections,
            broadcast_capacity: self.realtime.broadcast_capacity,
            assets: self.feed.symbols.clone(),
        }
    }
}
