//! Core domain types for the CFD trading simulator.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Scaled`: fixed-point monetary/quantity values (scaled by 10^8)
//! - `Position`, `Side`: leveraged position model
//! - `LiveQuote`, `TradeTick`: market data payloads crossing the broker

pub mod error;
pub mod fixed;
pub mod position;
pub mod types;

pub use error::{CoreError, Result};
pub use fixed::{
    has_sufficient_balance, long_pnl, margin_for, position_amount, short_pnl, Scaled, SCALE,
};
pub use position::{Position, PositionStatus};
pub use types::{extract_symbol, quote_topic, CloseReason, LiveQuote, Side, TradeTick};
