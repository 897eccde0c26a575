//! Raw trade event parsing.
//!
//! The upstream feed sends trade events shaped like
//! `{"e":"trade","s":"BTCUSDT","p":"30000.12","q":"0.5","T":1700000000000,"t":42}`.
//! Events missing any required field are discarded, not retried; frames
//! that are not trade events at all (subscribe acks) are ignored.

use crate::error::{FeedError, FeedResult};
use cfd_core::{Scaled, TradeTick};
use serde::Deserialize;
use tracing::debug;

/// Raw trade event as it arrives on the wire. Every field is optional so
/// the required-field check is ours, not serde's.
#[derive(Debug, Deserialize)]
pub struct RawTradeEvent {
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    /// Price as a decimal string.
    #[serde(rename = "p", default)]
    pub price: Option<String>,
    /// Quantity as a decimal string.
    #[serde(rename = "q", default)]
    pub quantity: Option<String>,
    /// Trade time in Unix milliseconds.
    #[serde(rename = "T", default)]
    pub trade_time: Option<i64>,
    /// Upstream trade id.
    #[serde(rename = "t", default)]
    pub trade_id: Option<u64>,
}

/// Parse a feed frame into a trade tick.
///
/// Returns `Ok(None)` for frames to skip (acks, events with missing or
/// non-positive fields); `Err` only for frames that are not valid JSON.
pub fn parse_trade_event(text: &str) -> FeedResult<Option<TradeTick>> {
    let raw: RawTradeEvent = serde_json::from_str(text)?;

    let (Some(symbol), Some(price), Some(quantity), Some(timestamp_ms)) =
        (raw.symbol, raw.price, raw.quantity, raw.trade_time)
    else {
        debug!("Skipping feed frame with missing fields");
        return Ok(None);
    };

    let price: Scaled = price
        .parse()
        .map_err(|e| FeedError::InvalidData(format!("price: {e}")))?;
    let quantity: Scaled = quantity
        .parse()
        .map_err(|e| FeedError::InvalidData(format!("quantity: {e}")))?;

    if !price.is_positive() || !quantity.is_positive() {
        debug!(%price, %quantity, "Skipping trade with non-positive price or quantity");
        return Ok(None);
    }

    Ok(Some(TradeTick {
        symbol,
        price,
        quantity,
        timestamp_ms,
        seq: raw.trade_id.unwrap_or(0),
    }))
}
