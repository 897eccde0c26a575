//! In-process broker for the CFD simulator.
//!
//! Two independent paths share this crate:
//! - `QuoteBus`: ephemeral live-quote pub/sub on `market:<SYMBOL>` topics,
//!   plus a latest-quote board read by the order path.
//! - `TradeStream`: append-only durable stream with consumer-group
//!   semantics (blocking reads, pending entries, explicit acks).

pub mod error;
pub mod quotes;
pub mod stream;

pub use error::{BrokerError, BrokerResult};
pub use quotes::{QuoteBus, QuoteMessage};
pub use stream::{EntryId, StreamEntry, TradeStream};
