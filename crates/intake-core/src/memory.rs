// In-memory implementations for tests and local development
//
// These implementations keep all data in memory, making them useful for:
// - Unit and HTTP-level tests that need to inspect what was written
// - Running the API locally without a database (STORE_BACKEND=memory)
// - Exercising failure paths with a store that always errors

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::event::EventRecord;
use crate::traits::{Clock, EventStore, IdGenerator};

// ============================================================================
// InMemoryEventStore - Stores events in memory
// ============================================================================

/// In-memory event store
///
/// Records are kept in a HashMap keyed by event id, plus a write log so tests
/// can count individual `put` calls (including idempotent re-puts).
#[derive(Debug, Default, Clone)]
pub struct InMemoryEventStore {
    records: Arc<RwLock<HashMap<Uuid, EventRecord>>>,
    writes: Arc<AtomicU64>,
}

impl InMemoryEventStore {
    /// Create a new in-memory event store
    pub fn new() -> Self {
        Self::default()
    }

    /// All stored records, oldest first
    pub async fn records(&self) -> Vec<EventRecord> {
        let mut records: Vec<EventRecord> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|r| (r.received_at, r.event_id));
        records
    }

    /// Get a record by event id
    pub async fn get(&self, event_id: Uuid) -> Option<EventRecord> {
        self.records.read().await.get(&event_id).cloned()
    }

    /// Number of distinct records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Number of `put` calls seen
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Clear all records
    pub async fn clear(&self) {
        self.records.write().await.clear();
        self.writes.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn put(&self, record: &EventRecord) -> Result<()> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let mut records = self.records.write().await;
        match records.get(&record.event_id) {
            Some(existing) if existing == record => Ok(()),
            Some(_) => Err(StoreError::database(format!(
                "conflicting record for event_id {}",
                record.event_id
            ))),
            None => {
                records.insert(record.event_id, record.clone());
                Ok(())
            }
        }
    }
}

// ============================================================================
// FailingEventStore - Rejects every write
// ============================================================================

/// Store whose writes and pings always fail with the configured error
#[derive(Debug, Clone)]
pub struct FailingEventStore {
    error: StoreError,
}

impl FailingEventStore {
    pub fn new(error: StoreError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl EventStore for FailingEventStore {
    async fn put(&self, _record: &EventRecord) -> Result<()> {
        Err(self.error.clone())
    }

    async fn ping(&self) -> Result<()> {
        Err(self.error.clone())
    }
}

// ============================================================================
// FixedClock / SequentialIdGenerator - Deterministic sources
// ============================================================================

/// Clock that returns a settable instant
#[derive(Debug, Default)]
pub struct FixedClock {
    now: AtomicI64,
}

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix_seconds(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Yields `Uuid::from_u128(1)`, `Uuid::from_u128(2)`, ...
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    next: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn generate(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::SeqCst) + 1;
        Uuid::from_u128(n as u128)
    }
}
