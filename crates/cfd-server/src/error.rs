//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Core error: {0}")]
    Core(#[from] cfd_core::CoreError),

    #[error("Feed error: {0}")]
    Feed(#[from] cfd_feed::FeedError),

    #[error("Broker error: {0}")]
    Broker(#[from] cfd_broker::BrokerError),

    #[error("Store error: {0}")]
    Store(#[from] cfd_store::StoreError),

    #[error("Order error: {0}")]
    Order(#[from] cfd_orders::OrderError),

    #[error("Persister error: {0}")]
    Persister(#[from] cfd_persister::PersisterError),

    #[error("Realtime error: {0}")]
    Realtime(#[from] cfd_realtime::RealtimeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
