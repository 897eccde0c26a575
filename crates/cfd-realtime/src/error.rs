//! Realtime server error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RealtimeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type RealtimeResult<T> = Result<T, RealtimeError>;
