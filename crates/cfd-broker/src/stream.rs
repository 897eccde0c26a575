//! Durable trade stream with consumer-group semantics.
//!
//! Append-only stream of JSON payload entries. A consumer group tracks a
//! delivery cursor and a pending list: entries handed to a consumer stay
//! pending until explicitly acknowledged, so a crashed or failed consumer
//! sees them again via `claim_pending`. This gives at-least-once delivery;
//! the storage layer's duplicate-key-skip closes the gap to effective
//! exactly-once.

use crate::error::{BrokerError, BrokerResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Stream entry id: `<timestamp_ms>-<seq>`, strictly increasing in append
/// order even if wall-clock timestamps regress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct EntryId {
    pub ms: i64,
    pub seq: u64,
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.ms, self.seq)
    }
}

/// An entry as delivered to a consumer.
#[derive(Debug, Clone)]
pub struct StreamEntry {
    pub id: EntryId,
    pub payload: String,
}

#[derive(Debug)]
struct PendingEntry {
    consumer: String,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct GroupState {
    last_delivered: EntryId,
    pending: BTreeMap<EntryId, PendingEntry>,
}

#[derive(Debug, Default)]
struct StreamInner {
    entries: Vec<StreamEntry>,
    last_id: EntryId,
    groups: HashMap<String, GroupState>,
}

impl StreamInner {
    fn next_id(&mut self, timestamp_ms: i64) -> EntryId {
        let id = if timestamp_ms > self.last_id.ms {
            EntryId {
                ms: timestamp_ms,
                seq: 0,
            }
        } else {
            EntryId {
                ms: self.last_id.ms,
                seq: self.last_id.seq + 1,
            }
        };
        self.last_id = id;
        id
    }

    fn group_mut(&mut self, group: &str) -> BrokerResult<&mut GroupState> {
        self.groups
            .get_mut(group)
            .ok_or_else(|| BrokerError::NoSuchGroup(group.to_string()))
    }

    /// Deliver up to `count` entries past the group's cursor, marking them
    /// pending for `consumer`.
    fn take_new(
        &mut self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> BrokerResult<Vec<StreamEntry>> {
        let cursor = self.group_mut(group)?.last_delivered;

        let start = self
            .entries
            .partition_point(|entry| entry.id <= cursor);
        let batch: Vec<StreamEntry> = self.entries[start..]
            .iter()
            .take(count)
            .cloned()
            .collect();

        if let Some(last) = batch.last() {
            let state = self.group_mut(group)?;
            state.last_delivered = last.id;
            for entry in &batch {
                state.pending.insert(
                    entry.id,
                    PendingEntry {
                        consumer: consumer.to_string(),
                        delivery_count: 1,
                    },
                );
            }
        }

        Ok(batch)
    }
}

/// The durable trade stream.
pub struct TradeStream {
    name: String,
    inner: Mutex<StreamInner>,
    notify: Notify,
}

impl TradeStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(StreamInner::default()),
            notify: Notify::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a JSON payload, returning the assigned entry id.
    pub fn append(&self, payload: String, timestamp_ms: i64) -> EntryId {
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id(timestamp_ms);
            inner.entries.push(StreamEntry { id, payload });
            id
        };
        self.notify.notify_waiters();
        id
    }

    /// Create a consumer group positioned at the current stream tail
    /// (only entries appended after creation are delivered to it).
    ///
    /// Fails with `GroupExists` when the group is already present; callers
    /// treat that as success at startup.
    pub fn create_group(&self, group: &str) -> BrokerResult<()> {
        let mut inner = self.inner.lock();
        if inner.groups.contains_key(group) {
            return Err(BrokerError::GroupExists(group.to_string()));
        }
        let last = inner.last_id;
        inner.groups.insert(
            group.to_string(),
            GroupState {
                last_delivered: last,
                pending: BTreeMap::new(),
            },
        );
        debug!(stream = %self.name, group, "Consumer group created");
        Ok(())
    }

    /// Read new entries for a consumer, blocking up to `block` when the
    /// stream has nothing past the group cursor. Returns an empty batch on
    /// timeout so the caller can service time-based work between reads.
    pub async fn read_group(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> BrokerResult<Vec<StreamEntry>> {
        let deadline = Instant::now() + block;

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);

            {
                let mut inner = self.inner.lock();
                let batch = inner.take_new(group, consumer, count)?;
                if !batch.is_empty() {
                    return Ok(batch);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    /// Redeliver up to `count` pending (delivered but unacknowledged)
    /// entries to `consumer`. Used on restart and group re-read.
    pub fn claim_pending(
        &self,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> BrokerResult<Vec<StreamEntry>> {
        let mut inner = self.inner.lock();

        let ids: Vec<EntryId> = {
            let state = inner.group_mut(group)?;
            state.pending.keys().take(count).copied().collect()
        };

        let mut claimed = Vec::with_capacity(ids.len());
        for id in &ids {
            if let Ok(idx) = inner.entries.binary_search_by(|e| e.id.cmp(id)) {
                claimed.push(inner.entries[idx].clone());
            }
        }

        let state = inner.group_mut(group)?;
        for id in &ids {
            if let Some(pending) = state.pending.get_mut(id) {
                debug!(
                    id = %id,
                    from = %pending.consumer,
                    to = consumer,
                    delivery = pending.delivery_count + 1,
                    "Reassigning pending entry"
                );
                pending.consumer = consumer.to_string();
                pending.delivery_count += 1;
            }
        }

        Ok(claimed)
    }

    /// Acknowledge processed entries, removing them from the pending list.
    /// Returns how many ids were actually pending.
    pub fn ack(&self, group: &str, ids: &[EntryId]) -> BrokerResult<usize> {
        let mut inner = self.inner.lock();
        let state = inner.group_mut(group)?;
        let mut removed = 0;
        for id in ids {
            if state.pending.remove(id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Number of delivered-but-unacknowledged entries for a group.
    pub fn pending_count(&self, group: &str) -> BrokerResult<usize> {
        let mut inner = self.inner.lock();
        Ok(inner.group_mut(group)?.pending.len())
    }

    /// Total entries appended so far.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "uploader";
    const CONSUMER: &str = "worker-1";

    fn stream_with_group() -> TradeStream {
        let stream = TradeStream::new("trades");
        stream.create_group(GROUP).unwrap();
        stream
    }

    #[test]
    fn test_ids_increase_even_when_time_regresses() {
        let stream = TradeStream::new("trades");
        let a = stream.append("a".into(), 100);
        let b = stream.append("b".into(), 100);
        let c = stream.append("c".into(), 50);

        assert!(a < b && b < c);
        assert_eq!(b, EntryId { ms: 100, seq: 1 });
        assert_eq!(c, EntryId { ms: 100, seq: 2 });
    }

    #[test]
    fn test_create_group_twice_fails_with_group_exists() {
        let stream = stream_with_group();
        let err = stream.create_group(GROUP).unwrap_err();
        assert!(matches!(err, BrokerError::GroupExists(_)));
    }

    #[tokio::test]
    async fn test_read_unknown_group_fails() {
        let stream = TradeStream::new("trades");
        let err = stream
            .read_group("nope", CONSUMER, 10, Duration::from_millis(1))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NoSuchGroup(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_times_out_with_empty_batch() {
        let stream = stream_with_group();
        let batch = stream
            .read_group(GROUP, CONSUMER, 10, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn test_read_delivers_and_marks_pending() {
        let stream = stream_with_group();
        stream.append("one".into(), 1);
        stream.append("two".into(), 2);

        let batch = stream
            .read_group(GROUP, CONSUMER, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(stream.pending_count(GROUP).unwrap(), 2);

        // Cursor advanced: nothing new to read
        let again = stream
            .read_group(GROUP, CONSUMER, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(again.is_empty());
    }

    #[tokio::test]
    async fn test_ack_removes_from_pending() {
        let stream = stream_with_group();
        stream.append("one".into(), 1);

        let batch = stream
            .read_group(GROUP, CONSUMER, 10, Duration::from_millis(10))
            .await
            .unwrap();
        let ids: Vec<EntryId> = batch.iter().map(|e| e.id).collect();

        assert_eq!(stream.ack(GROUP, &ids).unwrap(), 1);
        assert_eq!(stream.pending_count(GROUP).unwrap(), 0);
        // Acking again is a no-op
        assert_eq!(stream.ack(GROUP, &ids).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_claim_pending_redelivers_unacked() {
        let stream = stream_with_group();
        stream.append("one".into(), 1);

        let first = stream
            .read_group(GROUP, CONSUMER, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(first.len(), 1);

        // Consumer "crashed" without acking; a restarted consumer claims it
        let claimed = stream.claim_pending(GROUP, "worker-2", 10).unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].payload, "one");
        assert_eq!(claimed[0].id, first[0].id);
    }

    #[tokio::test]
    async fn test_group_starts_at_tail() {
        let stream = TradeStream::new("trades");
        stream.append("before".into(), 1);
        stream.create_group(GROUP).unwrap();
        stream.append("after".into(), 2);

        let batch = stream
            .read_group(GROUP, CONSUMER, 10, Duration::from_millis(10))
            .await
            .unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, "after");
    }

    #[tokio::test(start_paused = true)]
    async fn test_blocked_read_wakes_on_append() {
        let stream = std::sync::Arc::new(stream_with_group());
        let reader = stream.clone();

        let handle = tokio::spawn(async move {
            reader
                .read_group(GROUP, CONSUMER, 10, Duration::from_secs(1))
                .await
                .unwrap()
        });

        // Let the reader block, then append
        tokio::time::sleep(Duration::from_millis(10)).await;
        stream.append("wake".into(), 1);

        let batch = handle.await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].payload, "wake");
    }
}
