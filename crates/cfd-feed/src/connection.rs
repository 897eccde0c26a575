//! Upstream feed connection.
//!
//! Handles the WebSocket lifecycle: connect, subscribe to the configured
//! symbols' trade channels, forward raw frames to the ingestor, and
//! reconnect with exponential backoff on drop. The connection never takes
//! the process down; only exhausting a finite retry budget surfaces an
//! error to the caller.

use crate::error::{FeedError, FeedResult};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async_tls_with_config, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Feed connection configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// WebSocket URL of the upstream feed.
    pub url: String,
    /// Symbols to subscribe to (e.g. "BTCUSDT").
    pub symbols: Vec<String>,
    /// Maximum reconnection attempts (0 = infinite).
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff.
    pub reconnect_base_delay_ms: u64,
    /// Maximum delay for exponential backoff.
    pub reconnect_max_delay_ms: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            symbols: Vec::new(),
            max_reconnect_attempts: 0, // Infinite
            reconnect_base_delay_ms: 1000,
            reconnect_max_delay_ms: 60000,
        }
    }
}

/// Upstream feed connection manager.
pub struct FeedConnection {
    config: FeedConfig,
    message_tx: mpsc::Sender<String>,
    shutdown_token: CancellationToken,
}

impl FeedConnection {
    pub fn new(
        config: FeedConfig,
        message_tx: mpsc::Sender<String>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            message_tx,
            shutdown_token,
        }
    }

    /// Connect and run the read loop, reconnecting on drop.
    pub async fn run(&self) -> FeedResult<()> {
        let mut attempt = 0u32;

        loop {
            if self.shutdown_token.is_cancelled() {
                info!("Shutdown requested, exiting feed connect loop");
                return Ok(());
            }

            match self.try_connect().await {
                Ok(()) => {
                    info!("Feed connection closed");
                    attempt = 0;
                }
                Err(e) => {
                    error!(?e, "Feed connection error");
                }
            }

            if self.shutdown_token.is_cancelled() {
                return Ok(());
            }

            attempt += 1;
            if self.config.max_reconnect_attempts > 0
                && attempt >= self.config.max_reconnect_attempts
            {
                error!(attempt, "Max feed reconnection attempts reached");
                return Err(FeedError::ConnectionFailed(
                    "Max reconnection attempts reached".to_string(),
                ));
            }

            let delay = self.calculate_backoff_delay(attempt);
            warn!(attempt, delay_ms = delay.as_millis(), "Reconnecting to feed");

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown requested during backoff, exiting");
                    return Ok(());
                }
            }
        }
    }

    async fn try_connect(&self) -> FeedResult<()> {
        info!(url = %self.config.url, "Connecting to upstream feed");

        let (ws_stream, _response) =
            connect_async_tls_with_config(&self.config.url, None, true, None).await?;
        let (mut write, mut read) = ws_stream.split();

        info!("Feed connected");

        // Subscribe to the trade channel of each configured symbol
        let params: Vec<String> = self
            .config
            .symbols
            .iter()
            .map(|s| format!("{}@trade", s.to_lowercase()))
            .collect();
        let subscribe = serde_json::json!({
            "method": "SUBSCRIBE",
            "params": params,
            "id": 1,
        });
        write.send(Message::Text(subscribe.to_string().into())).await?;
        debug!(?params, "Sent feed subscription");

        loop {
            tokio::select! {
                () = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received in feed loop");
                    if let Err(e) = write.send(Message::Close(None)).await {
                        warn!(?e, "Failed to send Close frame during shutdown");
                    }
                    return Ok(());
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if self.message_tx.send(text.to_string()).await.is_err() {
                                info!("Ingestor channel closed, stopping feed");
                                return Ok(());
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            write.send(Message::Pong(data)).await?;
                        }
                        Some(Ok(Message::Close(frame))) => {
                            info!(?frame, "Feed sent close frame");
                            return Ok(());
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => return Ok(()),
                    }
                }
            }
        }
    }

    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.reconnect_base_delay_ms;
        let max = self.config.reconnect_max_delay_ms;

        // Exponential backoff: base * 2^(attempt-1), capped
        let exponent = attempt.saturating_sub(1).min(10);
        let delay = base.saturating_mul(1u64 << exponent);
        let delay = delay.min(max);

        Duration::from_millis(delay + rand_jitter())
    }
}

/// Generate random jitter (0-1000ms).
fn rand_jitter() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    (nanos % 1000) as u64
}
