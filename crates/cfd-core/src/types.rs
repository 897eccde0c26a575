//! Market data payloads and trading enums.

use crate::fixed::Scaled;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position side.
///
/// Every bid/ask selection in the system is an exhaustive match on this
/// enum: LONG opens at ask and exits at bid, SHORT mirrors it. That
/// asymmetry is the house-edge mechanism and must hold everywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Long,
    Short,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

/// Why a position was closed. Attached to the close operation for audit
/// logging; not a stored entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CloseReason {
    MarginCall,
    StopLoss,
    TakeProfit,
    Manual,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarginCall => write!(f, "MARGIN_CALL"),
            Self::StopLoss => write!(f, "STOP_LOSS"),
            Self::TakeProfit => write!(f, "TAKE_PROFIT"),
            Self::Manual => write!(f, "MANUAL"),
        }
    }
}

/// Ephemeral per-asset quote with the synthetic spread applied.
///
/// Lives only on the pub/sub path; each new tick for a symbol supersedes
/// the previous one. Prices are scaled integers (10^8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveQuote {
    pub symbol: String,
    pub original_price: Scaled,
    pub bid_price: Scaled,
    pub ask_price: Scaled,
    /// Event time in Unix milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

/// Honest (unspread) trade record appended to the durable stream.
///
/// `(symbol, timestamp_ms, seq)` is the composite identity used for
/// duplicate-key-skip on insert, so redelivery cannot create duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeTick {
    pub symbol: String,
    pub price: Scaled,
    pub quantity: Scaled,
    /// Trade time in Unix milliseconds.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
    /// Upstream trade id, 0 when the feed does not provide one.
    #[serde(default)]
    pub seq: u64,
}

/// Topic key for a symbol's live quotes, e.g. `market:BTCUSDT`.
pub fn quote_topic(symbol: &str) -> String {
    format!("market:{symbol}")
}

/// Extract the symbol from a quote topic key (`market:BTCUSDT` -> `BTCUSDT`).
pub fn extract_symbol(topic: &str) -> Option<&str> {
    topic.strip_prefix("market:").filter(|s| !s.is_empty())
}
