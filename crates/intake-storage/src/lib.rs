// Postgres storage layer with sqlx
//
// This crate provides the database implementation of the core EventStore
// trait: PostgresEventStore writes one row per accepted event.

pub mod postgres;
pub mod table;

pub use postgres::PostgresEventStore;
pub use table::{TableName, TableNameError};
