//! Order transaction manager.
//!
//! Shared between the user-facing open/close flow and the liquidation
//! engine's forced closes. Every balance effect goes through the ledger's
//! per-row atomic mutations.

pub mod error;
pub mod manager;

pub use error::{OrderError, OrderResult};
pub use manager::{CloseReceipt, OpenReceipt, OpenRequest, OrderManager};
