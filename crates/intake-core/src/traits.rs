// Core traits for pluggable backends
//
// These traits let the ingestion handler run against different backends:
// - In-memory implementations for tests and local development
// - Database implementations for production
// - Fixed clocks and id generators when tests need exact values

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::error::Result;
use crate::event::EventRecord;

// ============================================================================
// EventStore - Durable store for accepted events
// ============================================================================

/// Key-value store that accepted events are written to
///
/// `put` is a single atomic write keyed by `record.event_id`. Re-putting an
/// identical record must succeed without creating a duplicate.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Persist one event record
    async fn put(&self, record: &EventRecord) -> Result<()>;

    /// Check that the store is reachable
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// Clock - Source of received_at timestamps
// ============================================================================

pub trait Clock: Send + Sync {
    /// Current time as Unix seconds
    fn now_unix_seconds(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix_seconds(&self) -> i64 {
        Utc::now().timestamp()
    }
}

// ============================================================================
// IdGenerator - Source of event ids
// ============================================================================

pub trait IdGenerator: Send + Sync {
    /// A fresh id, never returned before by this generator
    fn generate(&self) -> Uuid;
}

/// Time-ordered UUIDs (default)
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn generate(&self) -> Uuid {
        Uuid::now_v7()
    }
}

/// Fully random UUIDs
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4Generator;

impl IdGenerator for UuidV4Generator {
    fn generate(&self) -> Uuid {
        Uuid::new_v4()
    }
}
