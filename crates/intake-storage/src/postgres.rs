//! PostgreSQL implementation of EventStore
//!
//! One row per accepted event, keyed by `event_id`:
//!
//! ```sql
//! CREATE TABLE events (
//!     event_id    UUID PRIMARY KEY,
//!     event_type  JSON NOT NULL,
//!     received_at BIGINT NOT NULL,
//!     payload     JSON NOT NULL,
//!     request_id  TEXT NOT NULL
//! );
//! ```
//!
//! `JSON` rather than `JSONB`: the column keeps the serialized text as sent,
//! so number literals survive unchanged and `\u0000` escapes are accepted.
//! JSON values are bound and read back as text.
//!
//! Provisioning the table is left to the deployment; this module only writes.

use std::time::Duration;

use async_trait::async_trait;
use intake_core::{EventRecord, EventStore, Result, StoreError};
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::{FromRow, PgPool};
use tracing::{debug, error, instrument};
use uuid::Uuid;

use crate::table::TableName;

/// PostgreSQL-backed event store
///
/// Holds a connection pool created once at process start and shared by all
/// invocations.
///
/// # Example
///
/// ```ignore
/// use intake_storage::{PostgresEventStore, TableName};
///
/// let table = TableName::parse("events")?;
/// let store = PostgresEventStore::connect("postgres://localhost/intake", table, 10).await?;
/// ```
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
    table: TableName,
    insert_sql: String,
}

#[derive(Debug, FromRow)]
struct EventRow {
    event_id: Uuid,
    event_type: String,
    received_at: i64,
    payload: String,
    request_id: String,
}

impl TryFrom<EventRow> for EventRecord {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self> {
        Ok(EventRecord {
            event_id: row.event_id,
            event_type: from_json_text::<Value>(&row.event_type)?,
            received_at: row.received_at,
            payload: from_json_text::<Map<String, Value>>(&row.payload)?,
            request_id: row.request_id,
        })
    }
}

impl PostgresEventStore {
    /// Create a store over an existing pool
    pub fn new(pool: PgPool, table: TableName) -> Self {
        let insert_sql = format!(
            "INSERT INTO {} (event_id, event_type, received_at, payload, request_id) \
             VALUES ($1, $2::json, $3, $4::json, $5) \
             ON CONFLICT (event_id) DO NOTHING",
            table.quoted()
        );
        Self {
            pool,
            table,
            insert_sql,
        }
    }

    /// Connect a new pool
    pub async fn connect(database_url: &str, table: TableName, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool, table))
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn table(&self) -> &TableName {
        &self.table
    }

    /// Fetch a stored record by id
    #[instrument(skip(self))]
    pub async fn get(&self, event_id: Uuid) -> Result<Option<EventRecord>> {
        let sql = format!(
            "SELECT event_id, event_type::text AS event_type, received_at, payload::text AS payload, request_id \
             FROM {} WHERE event_id = $1",
            self.table.quoted()
        );
        let row = sqlx::query_as::<_, EventRow>(&sql)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to get event: {}", e);
                map_sqlx_error(e)
            })?;

        row.map(EventRecord::try_from).transpose()
    }
}

#[async_trait]
impl EventStore for PostgresEventStore {
    #[instrument(skip(self, record), fields(event_id = %record.event_id))]
    async fn put(&self, record: &EventRecord) -> Result<()> {
        let event_type = to_json_text(&record.event_type)?;
        let payload = to_json_text(&record.payload)?;

        let result = sqlx::query(&self.insert_sql)
            .bind(record.event_id)
            .bind(event_type)
            .bind(record.received_at)
            .bind(payload)
            .bind(&record.request_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to put event: {}", e);
                map_sqlx_error(e)
            })?;

        if result.rows_affected() == 0 {
            debug!("event already stored");
        }
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

fn to_json_text<T: serde::Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn from_json_text<T: serde::de::DeserializeOwned>(text: &str) -> Result<T> {
    serde_json::from_str(text).map_err(|e| StoreError::Serialization(e.to_string()))
}

// Postgres error class 53 = insufficient resources (too many connections,
// out of memory, disk full).
const INSUFFICIENT_RESOURCES_CLASS: &str = "53";

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        sqlx::Error::Database(db)
            if db
                .code()
                .is_some_and(|code| code.starts_with(INSUFFICIENT_RESOURCES_CLASS)) =>
        {
            StoreError::Throttled(err.to_string())
        }
        _ => StoreError::Database(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_map_to_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_other_errors_map_to_database() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }

    #[test]
    fn test_json_text_keeps_number_literals() {
        let payload: Map<String, Value> =
            serde_json::from_str(r#"{"n":123456789012345678901234567890,"s":"\u0000"}"#).unwrap();

        let text = to_json_text(&payload).unwrap();
        assert_eq!(text, r#"{"n":123456789012345678901234567890,"s":"\u0000"}"#);
        assert_eq!(from_json_text::<Map<String, Value>>(&text).unwrap(), payload);
    }

    #[test]
    fn test_unreadable_json_text_is_serialization_error() {
        assert!(matches!(
            from_json_text::<Value>("{"),
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_insert_sql_uses_quoted_table() {
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost/intake_test")
            .unwrap();
        let store = PostgresEventStore::new(pool, TableName::parse("ingest.events").unwrap());

        assert!(store
            .insert_sql
            .starts_with("INSERT INTO \"ingest\".\"events\" (event_id"));
        assert!(store.insert_sql.contains("$2::json"));
        assert!(store.insert_sql.contains("$4::json"));
        assert!(store.insert_sql.ends_with("ON CONFLICT (event_id) DO NOTHING"));
        assert_eq!(store.table().to_string(), "ingest.events");
    }
}
