//! CFD trading simulator server.
//!
//! Binds the feed, ingestor, persister, liquidation engine and realtime
//! fan-out into one process.

pub mod app;
pub mod config;
pub mod error;
pub mod logging;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use logging::init_logging;
