//! Order error types.
//!
//! These are the user-surfaceable failure codes: each maps to a stable
//! rejection the request layer can return without leaking internals.

use cfd_core::{CoreError, Scaled};
use cfd_store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrderError {
    #[error("Invalid leverage: {0} (must be 1-100)")]
    InvalidLeverage(u32),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: Scaled, available: Scaled },

    #[error("Position not found: {0}")]
    NotFound(Uuid),

    #[error("Position already closed: {0}")]
    AlreadyClosed(Uuid),

    #[error("Price data not available for {0}")]
    PriceUnavailable(String),

    #[error("Unknown account: {0}")]
    UnknownAccount(Uuid),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<StoreError> for OrderError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InsufficientFunds {
                required,
                available,
            } => Self::InsufficientFunds {
                required,
                available,
            },
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::AlreadyClosed(id) => Self::AlreadyClosed(id),
            StoreError::UnknownAccount(id) => Self::UnknownAccount(id),
            other => Self::Store(other.to_string()),
        }
    }
}

pub type OrderResult<T> = Result<T, OrderError>;
