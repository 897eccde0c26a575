//! Liquidation engine.
//!
//! Subscribes to live quotes and, per tick, re-evaluates every open
//! position on that asset against margin-call, stop-loss and take-profit
//! thresholds, forcing a close when one fires.

pub mod engine;

pub use engine::{evaluate, LiquidationEngine};
