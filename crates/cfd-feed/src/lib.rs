//! Market data ingestion for the CFD simulator.
//!
//! Connects to the upstream trade feed, parses raw trade events, injects
//! the synthetic spread and publishes live quotes plus honest trade
//! records to the broker.

pub mod connection;
pub mod error;
pub mod ingestor;
pub mod parser;

pub use connection::{FeedConfig, FeedConnection};
pub use error::{FeedError, FeedResult};
pub use ingestor::Ingestor;
pub use parser::parse_trade_event;

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any feed connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
