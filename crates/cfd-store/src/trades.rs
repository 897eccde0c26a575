//! Trade history store with duplicate-key-skip bulk insert.

use crate::error::StoreResult;
use crate::writer::TradeLogWriter;
use cfd_core::TradeTick;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

/// The seam the batch persister writes through. Implementations must be
/// idempotent against redelivery of the same rows.
pub trait TradeSink: Send + Sync {
    /// Bulk-insert rows, skipping those whose composite identity already
    /// exists. Returns the number actually inserted.
    fn insert_batch(&self, ticks: &[TradeTick]) -> StoreResult<usize>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TradeKey {
    symbol: String,
    timestamp_ms: i64,
    seq: u64,
}

impl TradeKey {
    fn of(tick: &TradeTick) -> Self {
        Self {
            symbol: tick.symbol.clone(),
            timestamp_ms: tick.timestamp_ms,
            seq: tick.seq,
        }
    }
}

/// Trade row store keyed on `(symbol, timestamp, seq)`, optionally backed
/// by an append-only JSON Lines log.
#[derive(Default)]
pub struct TradeStore {
    rows: DashMap<TradeKey, TradeTick>,
    log: Option<Mutex<TradeLogWriter>>,
}

impl TradeStore {
    /// In-memory store without a durable log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store backed by a JSON Lines log under `data_dir`.
    pub fn with_log(data_dir: &str) -> Self {
        Self {
            rows: DashMap::new(),
            log: Some(Mutex::new(TradeLogWriter::new(data_dir))),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn count_for(&self, symbol: &str) -> usize {
        self.rows.iter().filter(|r| r.key().symbol == symbol).count()
    }
}

impl TradeSink for TradeStore {
    fn insert_batch(&self, ticks: &[TradeTick]) -> StoreResult<usize> {
        // Collect rows not yet present (also dedups within the batch)
        let mut fresh: Vec<TradeTick> = Vec::with_capacity(ticks.len());
        let mut seen: Vec<TradeKey> = Vec::with_capacity(ticks.len());
        for tick in ticks {
            let key = TradeKey::of(tick);
            if self.rows.contains_key(&key) || seen.contains(&key) {
                continue;
            }
            seen.push(key);
            fresh.push(tick.clone());
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        // Durable log first: a failed append leaves the store untouched,
        // so unacked entries retry cleanly after redelivery.
        if let Some(log) = &self.log {
            log.lock().append_batch(&fresh)?;
        }

        for tick in &fresh {
            self.rows.insert(TradeKey::of(tick), tick.clone());
        }

        debug!(
            inserted = fresh.len(),
            skipped = ticks.len() - fresh.len(),
            "Trade batch inserted"
        );
        Ok(fresh.len())
    }
}
