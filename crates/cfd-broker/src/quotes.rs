//! Live-quote pub/sub.
//!
//! Quotes are published on `market:<SYMBOL>` topic keys. Subscribers see
//! ticks for one symbol in publish order; no ordering is guaranteed across
//! symbols. The bus also keeps the latest quote per symbol, which is the
//! read path for order open/close ("is there a live price for this asset").

use cfd_core::{quote_topic, LiveQuote};
use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

/// A published quote together with its topic key.
#[derive(Debug, Clone)]
pub struct QuoteMessage {
    pub topic: String,
    pub quote: LiveQuote,
}

/// Quote topic bus with a latest-quote board.
///
/// Owned by the process that creates it; subscribers hold plain
/// `broadcast::Receiver`s. A slow subscriber lags (and is told so by the
/// channel), it never blocks the publisher.
pub struct QuoteBus {
    tx: broadcast::Sender<QuoteMessage>,
    latest: DashMap<String, LiveQuote>,
}

impl QuoteBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            latest: DashMap::new(),
        }
    }

    /// Publish a quote, superseding the previous one for its symbol.
    ///
    /// Returns the number of subscribers that received it. Zero receivers
    /// is normal (e.g. before any downstream loop has started).
    pub fn publish(&self, quote: LiveQuote) -> usize {
        let topic = quote_topic(&quote.symbol);
        self.latest.insert(quote.symbol.clone(), quote.clone());

        match self.tx.send(QuoteMessage {
            topic: topic.clone(),
            quote,
        }) {
            Ok(n) => {
                trace!(topic = %topic, receivers = n, "Published quote");
                n
            }
            Err(_) => 0,
        }
    }

    /// Subscribe to all quote topics (the `market:*` pattern).
    pub fn subscribe(&self) -> broadcast::Receiver<QuoteMessage> {
        self.tx.subscribe()
    }

    /// Latest quote for a symbol, if any tick has been published.
    pub fn latest(&self, symbol: &str) -> Option<LiveQuote> {
        self.latest.get(symbol).map(|q| q.clone())
    }

    /// Symbols that have published at least one quote.
    pub fn symbols(&self) -> Vec<String> {
        self.latest.iter().map(|e| e.key().clone()).collect()
    }
}
