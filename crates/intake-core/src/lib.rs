// Event ingestion core
//
// This crate provides a transport- and DB-agnostic implementation of the
// ingestion pipeline (validate -> enrich -> persist -> acknowledge).
//
// Key design decisions:
// - The durable store is a trait (EventStore) injected into the handler
// - Time and id generation are traits too, so tests can pin exact values
// - Payloads stay as serde_json::Value; only the top-level `type` is read
// - Client errors become 400 responses, store errors propagate to the caller

pub mod error;
pub mod event;
pub mod handler;
pub mod traits;

// In-memory implementations for tests and local development
pub mod memory;

// Re-exports for convenience
pub use error::{IngestError, Result, StoreError};
pub use event::{EventRecord, Invocation, InvocationResponse};
pub use handler::{is_truthy, IngestionHandler};
pub use memory::{FailingEventStore, FixedClock, InMemoryEventStore, SequentialIdGenerator};
pub use traits::{Clock, EventStore, IdGenerator, SystemClock, UuidV4Generator, UuidV7Generator};
