//! Quote pump: bus subscription to listener broadcast channel.

use crate::types::PushEnvelope;
use cfd_broker::QuoteBus;
use cfd_core::extract_symbol;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Forward every published quote to the listener channel until shutdown.
///
/// Having no connected listeners is the normal idle state, not an error.
pub async fn run_quote_pump(
    quotes: Arc<QuoteBus>,
    tx: broadcast::Sender<String>,
    shutdown: CancellationToken,
) {
    let mut rx = quotes.subscribe();
    info!("Quote pump started");

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Quote pump shutting down");
                return;
            }
            message = rx.recv() => match message {
                Ok(message) => {
                    let symbol = extract_symbol(&message.topic)
                        .unwrap_or(&message.quote.symbol)
                        .to_string();
                    let envelope = PushEnvelope::PriceUpdate {
                        symbol,
                        data: message.quote,
                    };
                    match serde_json::to_string(&envelope) {
                        Ok(json) => match tx.send(json) {
                            Ok(n) => trace!(receivers = n, "Quote forwarded"),
                            Err(_) => trace!("No listeners connected"),
                        },
                        Err(e) => debug!(?e, "Failed to encode push envelope"),
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Quote pump lagged behind the bus");
                }
                Err(RecvError::Closed) => {
                    info!("Quote bus closed, quote pump stopping");
                    return;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfd_core::{LiveQuote, Scaled};

    #[tokio::test]
    async fn test_pump_forwards_quotes_as_price_updates() {
        let quotes = Arc::new(QuoteBus::new(16));
        let (tx, mut rx) = broadcast::channel::<String>(16);
        let shutdown = CancellationToken::new();

        let pump = tokio::spawn(run_quote_pump(quotes.clone(), tx, shutdown.clone()));
        // Pump must be subscribed before the publish
        tokio::task::yield_now().await;

        quotes.publish(LiveQuote {
            symbol: "BTCUSDT".to_string(),
            original_price: Scaled(30_000 * 100_000_000),
            bid_price: Scaled(29_970 * 100_000_000),
            ask_price: Scaled(30_030 * 100_000_000),
            timestamp_ms: 1,
        });

        let json: serde_json::Value =
            serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(json["type"], "price_update");
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["data"]["askPrice"], 30_030_i64 * 100_000_000);

        shutdown.cancel();
        pump.await.unwrap();
    }
}
