//! Persistent store for the CFD simulator.
//!
//! - `Ledger`: account balances and positions, with per-row atomic balance
//!   mutation and first-writer-wins position close.
//! - `TradeStore`: trade history with duplicate-key-skip bulk insert,
//!   backed by a daily-rotated JSON Lines log.
//! - `TradeSink`: the seam the batch persister writes through.

pub mod error;
pub mod ledger;
pub mod trades;
pub mod writer;

pub use error::{StoreError, StoreResult};
pub use ledger::Ledger;
pub use trades::{TradeSink, TradeStore};
pub use writer::TradeLogWriter;
