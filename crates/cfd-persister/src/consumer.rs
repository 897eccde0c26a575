//! Batch accumulation and acknowledgment discipline.
//!
//! The persister reads with a short blocking timeout so the time-based
//! flush trigger is serviced even when no data arrives. The flush
//! condition (`size >= batch_size OR elapsed >= flush_interval`) is
//! evaluated after every read, including empty ones. Entries are
//! acknowledged only after a successful bulk insert; a failed insert
//! leaves them pending for redelivery, and the sink's duplicate-key-skip
//! makes the retry idempotent.

use crate::error::{PersisterError, PersisterResult};
use cfd_broker::{BrokerError, EntryId, StreamEntry, TradeStream};
use cfd_core::TradeTick;
use cfd_store::TradeSink;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Persister configuration.
#[derive(Debug, Clone)]
pub struct PersisterConfig {
    /// Consumer group name.
    pub group: String,
    /// This process's consumer name within the group.
    pub consumer: String,
    /// Maximum entries per stream read.
    pub read_count: usize,
    /// Blocking read timeout.
    pub block_ms: u64,
    /// Flush when the buffer reaches this size.
    pub batch_size: usize,
    /// Flush when this much time has passed since the last flush.
    pub flush_interval_ms: u64,
}

impl Default for PersisterConfig {
    fn default() -> Self {
        Self {
            group: "trade-uploaders".to_string(),
            consumer: "uploader-1".to_string(),
            read_count: 50,
            block_ms: 1000,
            batch_size: 100,
            flush_interval_ms: 5000,
        }
    }
}

/// Durable-stream consumer that bulk-writes trade batches.
pub struct BatchPersister<S: TradeSink> {
    stream: Arc<TradeStream>,
    sink: Arc<S>,
    config: PersisterConfig,
    buffer: Vec<StreamEntry>,
    last_flush: Instant,
}

impl<S: TradeSink> BatchPersister<S> {
    pub fn new(stream: Arc<TradeStream>, sink: Arc<S>, config: PersisterConfig) -> Self {
        Self {
            stream,
            sink,
            config,
            buffer: Vec::new(),
            last_flush: Instant::now(),
        }
    }

    /// Create the consumer group. "Already exists" is success; any other
    /// creation failure is fatal at startup.
    pub fn init(&self) -> PersisterResult<()> {
        match self.stream.create_group(&self.config.group) {
            Ok(()) => info!(group = %self.config.group, "Consumer group created"),
            Err(BrokerError::GroupExists(_)) => {
                info!(group = %self.config.group, "Consumer group already exists");
            }
            Err(e) => {
                return Err(PersisterError::Startup(format!(
                    "Failed to create consumer group: {e}"
                )))
            }
        }
        Ok(())
    }

    /// Claim entries left pending by a previous incarnation of this
    /// consumer, so unacknowledged work is redelivered after a restart.
    pub fn recover_pending(&mut self) -> PersisterResult<()> {
        let pending = self.stream.claim_pending(
            &self.config.group,
            &self.config.consumer,
            self.config.batch_size,
        )?;
        if !pending.is_empty() {
            info!(count = pending.len(), "Recovered pending entries for redelivery");
            self.buffer.extend(pending);
        }
        Ok(())
    }

    /// One read-then-maybe-flush step.
    pub async fn poll_once(&mut self) -> PersisterResult<()> {
        let entries = self
            .stream
            .read_group(
                &self.config.group,
                &self.config.consumer,
                self.config.read_count,
                Duration::from_millis(self.config.block_ms),
            )
            .await?;

        if !entries.is_empty() {
            debug!(
                received = entries.len(),
                buffered = self.buffer.len() + entries.len(),
                "Buffered stream entries"
            );
            self.buffer.extend(entries);
        }

        if self.should_flush() {
            self.flush();
        }
        Ok(())
    }

    /// Run until shutdown. The read timeout bounds shutdown latency.
    pub async fn run(mut self, shutdown: CancellationToken) -> PersisterResult<()> {
        self.init()?;
        self.recover_pending()?;
        self.last_flush = Instant::now();
        info!(
            group = %self.config.group,
            consumer = %self.config.consumer,
            "Batch persister started"
        );

        loop {
            if shutdown.is_cancelled() {
                info!("Persister shutting down, flushing buffer");
                self.flush();
                return Ok(());
            }
            self.poll_once().await?;
        }
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.config.batch_size
            || self.last_flush.elapsed() >= Duration::from_millis(self.config.flush_interval_ms)
    }

    /// Parse, bulk-insert and acknowledge the buffered batch.
    ///
    /// Unparsable entries are skipped (and never acknowledged, so they
    /// stay pending). On insert failure nothing is acknowledged. The
    /// buffer and flush timer reset either way.
    pub fn flush(&mut self) {
        let entries = std::mem::take(&mut self.buffer);
        self.last_flush = Instant::now();
        if entries.is_empty() {
            return;
        }

        let mut ticks: Vec<TradeTick> = Vec::with_capacity(entries.len());
        let mut ids: Vec<EntryId> = Vec::with_capacity(entries.len());
        for entry in &entries {
            match serde_json::from_str::<TradeTick>(&entry.payload) {
                Ok(tick) => {
                    ticks.push(tick);
                    ids.push(entry.id);
                }
                Err(e) => warn!(id = %entry.id, ?e, "Skipping unparsable stream entry"),
            }
        }

        if ticks.is_empty() {
            return;
        }

        match self.sink.insert_batch(&ticks) {
            Ok(inserted) => match self.stream.ack(&self.config.group, &ids) {
                Ok(acked) => debug!(inserted, acked, "Flushed trade batch"),
                Err(e) => warn!(?e, "Failed to acknowledge flushed batch"),
            },
            Err(e) => {
                warn!(
                    ?e,
                    count = ticks.len(),
                    "Trade insert failed, batch left pending for redelivery"
                );
            }
        }
    }

    #[cfg(test)]
    fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfd_core::Scaled;
    use cfd_store::{StoreError, StoreResult, TradeStore};
    use std::sync::atomic::{AtomicBool, Ordering};

    const GROUP: &str = "trade-uploaders";

    fn tick_json(seq: u64) -> String {
        let tick = TradeTick {
            symbol: "BTCUSDT".to_string(),
            price: Scaled(30_000 * 100_000_000),
            quantity: Scaled(100_000_000),
            timestamp_ms: 1_700_000_000_000 + seq as i64,
            seq,
        };
        serde_json::to_string(&tick).unwrap()
    }

    fn config(batch_size: usize, block_ms: u64) -> PersisterConfig {
        PersisterConfig {
            batch_size,
            block_ms,
            read_count: 200,
            ..Default::default()
        }
    }

    fn persister(
        batch_size: usize,
        block_ms: u64,
    ) -> (BatchPersister<TradeStore>, Arc<TradeStream>, Arc<TradeStore>) {
        let stream = Arc::new(TradeStream::new("trades"));
        let sink = Arc::new(TradeStore::new());
        let persister = BatchPersister::new(stream.clone(), sink.clone(), config(batch_size, block_ms));
        persister.init().unwrap();
        (persister, stream, sink)
    }

    #[tokio::test]
    async fn test_size_trigger_flushes_at_batch_size() {
        let (mut persister, stream, sink) = persister(100, 10);

        for seq in 0..99 {
            stream.append(tick_json(seq), 1 + seq as i64);
        }
        persister.poll_once().await.unwrap();
        assert_eq!(persister.buffered(), 99);
        assert_eq!(sink.len(), 0);

        // The hundredth message tips the batch over
        stream.append(tick_json(99), 100);
        persister.poll_once().await.unwrap();
        assert_eq!(persister.buffered(), 0);
        assert_eq!(sink.len(), 100);
        assert_eq!(stream.pending_count(GROUP).unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_trigger_flushes_single_entry() {
        let (mut persister, stream, sink) = persister(100, 1000);

        stream.append(tick_json(0), 1);
        persister.poll_once().await.unwrap();
        assert_eq!(persister.buffered(), 1);
        assert_eq!(sink.len(), 0);

        // Empty reads must still service the timeout branch
        tokio::time::advance(Duration::from_millis(5001)).await;
        persister.poll_once().await.unwrap();
        assert_eq!(persister.buffered(), 0);
        assert_eq!(sink.len(), 1);
    }

    #[tokio::test]
    async fn test_unparsable_entry_skipped_and_left_pending() {
        let (mut persister, stream, sink) = persister(2, 10);

        stream.append("garbage".to_string(), 1);
        stream.append(tick_json(1), 2);
        persister.poll_once().await.unwrap();

        assert_eq!(sink.len(), 1);
        // The garbage entry was never acknowledged
        assert_eq!(stream.pending_count(GROUP).unwrap(), 1);
    }

    /// Sink that records rows but fails the first insert after writing,
    /// simulating a crash between insert and acknowledgment.
    struct FlakySink {
        store: TradeStore,
        fail_once: AtomicBool,
    }

    impl TradeSink for FlakySink {
        fn insert_batch(&self, ticks: &[TradeTick]) -> StoreResult<usize> {
            let inserted = self.store.insert_batch(ticks)?;
            if self.fail_once.swap(false, Ordering::SeqCst) {
                return Err(StoreError::Io(std::io::Error::other("injected failure")));
            }
            Ok(inserted)
        }
    }

    #[tokio::test]
    async fn test_replay_after_failure_stores_exactly_one_row() {
        let stream = Arc::new(TradeStream::new("trades"));
        let sink = Arc::new(FlakySink {
            store: TradeStore::new(),
            fail_once: AtomicBool::new(true),
        });
        let mut persister = BatchPersister::new(stream.clone(), sink.clone(), config(1, 10));
        persister.init().unwrap();

        stream.append(tick_json(0), 1);
        persister.poll_once().await.unwrap();

        // Insert "failed": entry unacknowledged, row written once
        assert_eq!(stream.pending_count(GROUP).unwrap(), 1);
        assert_eq!(sink.store.len(), 1);

        // Group re-read redelivers; duplicate-key-skip keeps it one row
        persister.recover_pending().unwrap();
        persister.flush();
        assert_eq!(stream.pending_count(GROUP).unwrap(), 0);
        assert_eq!(sink.store.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_failure_does_not_acknowledge() {
        struct AlwaysFail;
        impl TradeSink for AlwaysFail {
            fn insert_batch(&self, _ticks: &[TradeTick]) -> StoreResult<usize> {
                Err(StoreError::Io(std::io::Error::other("down")))
            }
        }

        let stream = Arc::new(TradeStream::new("trades"));
        let mut persister =
            BatchPersister::new(stream.clone(), Arc::new(AlwaysFail), config(1, 10));
        persister.init().unwrap();

        stream.append(tick_json(0), 1);
        persister.poll_once().await.unwrap();

        assert_eq!(stream.pending_count(GROUP).unwrap(), 1);
        // Buffer was still reset; the entry comes back via pending claim
        assert_eq!(persister.buffered(), 0);
    }
}
