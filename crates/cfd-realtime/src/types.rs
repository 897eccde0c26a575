//! Push envelopes sent to WebSocket listeners.

use cfd_core::LiveQuote;
use serde::{Deserialize, Serialize};

/// Wire envelope for the listener push channel, discriminated by `type`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PushEnvelope {
    /// Sent once when a listener connects.
    Connection {
        message: String,
        assets: Vec<String>,
    },
    /// One per published quote.
    PriceUpdate { symbol: String, data: LiveQuote },
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfd_core::Scaled;

    #[test]
    fn test_connection_envelope_shape() {
        let envelope = PushEnvelope::Connection {
            message: "Connected to live price feed".to_string(),
            assets: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();

        assert_eq!(json["type"], "connection");
        assert_eq!(json["assets"][1], "ETHUSDT");
    }

    #[test]
    fn test_price_update_envelope_shape() {
        let envelope = PushEnvelope::PriceUpdate {
            symbol: "BTCUSDT".to_string(),
            data: LiveQuote {
                symbol: "BTCUSDT".to_string(),
                original_price: Scaled(30_000 * 100_000_000),
                bid_price: Scaled(29_970 * 100_000_000),
                ask_price: Scaled(30_030 * 100_000_000),
                timestamp_ms: 1_700_000_000_000,
            },
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&envelope).unwrap()).unwrap();

        assert_eq!(json["type"], "price_update");
        assert_eq!(json["symbol"], "BTCUSDT");
        assert_eq!(json["data"]["bidPrice"], 29_970_i64 * 100_000_000);
    }
}
