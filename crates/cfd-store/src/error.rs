//! Store error types.

use cfd_core::Scaled;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Scaled, available: Scaled },

    #[error("Unknown account: {0}")]
    UnknownAccount(Uuid),

    #[error("Position not found: {0}")]
    NotFound(Uuid),

    #[error("Position already closed: {0}")]
    AlreadyClosed(Uuid),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;
