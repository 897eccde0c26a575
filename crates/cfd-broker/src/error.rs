//! Broker error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Consumer group already exists: {0}")]
    GroupExists(String),

    #[error("No such consumer group: {0}")]
    NoSuchGroup(String),

    #[error("Channel closed")]
    ChannelClosed,
}

pub type BrokerResult<T> = Result<T, BrokerError>;
