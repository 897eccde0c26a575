//! Stream batch persister.
//!
//! A named consumer in a durable consumer group that accumulates trade
//! records into batches by size or time, bulk-writes them, and
//! acknowledges only after a successful write.

pub mod consumer;
pub mod error;

pub use consumer::{BatchPersister, PersisterConfig};
pub use error::{PersisterError, PersisterResult};
