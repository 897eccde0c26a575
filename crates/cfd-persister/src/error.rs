//! Persister error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersisterError {
    #[error("Broker error: {0}")]
    Broker(#[from] cfd_broker::BrokerError),

    #[error("Startup failed: {0}")]
    Startup(String),
}

pub type PersisterResult<T> = Result<T, PersisterError>;
