//! Live-quote fan-out.
//!
//! A pump task subscribes to the quote bus and re-encodes each quote as a
//! push envelope on a broadcast channel; an axum WebSocket endpoint
//! forwards that channel to any number of connected listeners.

pub mod broadcast;
pub mod error;
pub mod server;
pub mod types;

pub use error::{RealtimeError, RealtimeResult};
pub use server::{run_server, AppState, ConnectionLimiter, RealtimeConfig};
pub use types::PushEnvelope;
