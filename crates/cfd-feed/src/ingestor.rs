//! Spread injection and quote/stream publication.
//!
//! For each valid trade event the ingestor performs two independent
//! writes: the spread-adjusted quote goes to the live-quote topic (trading
//! decisions), the honest trade record goes to the durable stream
//! (historical candles). The writes are not transactionally linked; a
//! failure of either is logged and the next event is processed.

use crate::parser::parse_trade_event;
use cfd_broker::{QuoteBus, TradeStream};
use cfd_core::{LiveQuote, Scaled, TradeTick};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Fixed synthetic spread: 0.1% either side of the raw trade price.
/// `bid = price * (1 - s)`, `ask = price * (1 + s)`.
const ONE_MINUS_SPREAD: Scaled = Scaled(99_900_000);
const ONE_PLUS_SPREAD: Scaled = Scaled(100_100_000);

/// Market data ingestor: consumes raw feed frames, publishes quotes and
/// appends honest trade records.
pub struct Ingestor {
    quotes: Arc<QuoteBus>,
    stream: Arc<TradeStream>,
}

impl Ingestor {
    pub fn new(quotes: Arc<QuoteBus>, stream: Arc<TradeStream>) -> Self {
        Self { quotes, stream }
    }

    /// Consume frames from the feed connection until shutdown.
    pub async fn run(&self, mut rx: mpsc::Receiver<String>, shutdown: CancellationToken) {
        info!("Ingestor started");
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    info!("Ingestor shutting down");
                    return;
                }
                frame = rx.recv() => {
                    match frame {
                        Some(text) => self.handle_frame(&text),
                        None => {
                            info!("Feed channel closed, ingestor stopping");
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Process one raw frame. Per-event failures never abort the loop.
    pub fn handle_frame(&self, text: &str) {
        match parse_trade_event(text) {
            Ok(Some(tick)) => self.process_tick(tick),
            Ok(None) => {}
            Err(e) => debug!(?e, "Discarding unparsable feed frame"),
        }
    }

    fn process_tick(&self, tick: TradeTick) {
        let quote = LiveQuote {
            symbol: tick.symbol.clone(),
            original_price: tick.price,
            bid_price: tick.price.mul_scaled(ONE_MINUS_SPREAD),
            ask_price: tick.price.mul_scaled(ONE_PLUS_SPREAD),
            timestamp_ms: tick.timestamp_ms,
        };
        self.quotes.publish(quote);

        match serde_json::to_string(&tick) {
            Ok(payload) => {
                self.stream.append(payload, tick.timestamp_ms);
            }
            Err(e) => warn!(?e, symbol = %tick.symbol, "Failed to encode trade for stream"),
        }
    }
}
