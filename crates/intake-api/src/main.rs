// Intake API server
// Decision: One store client per process, created at startup and shared by every request

use anyhow::{Context, Result};
use intake_api::config::{AppConfig, StoreBackend};
use intake_api::{build_app, telemetry};
use intake_core::{EventStore, InMemoryEventStore};
use intake_storage::PostgresEventStore;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded environment from {}", path.display());
    }

    let config = AppConfig::from_env().context("Failed to load configuration")?;

    telemetry::init(config.log_format);

    tracing::info!("intake-api starting...");

    let store = connect_store(&config).await?;
    tracing::info!(
        backend = %config.store_backend,
        table = %config.events_table,
        "Event store ready"
    );

    if !config.api_prefix.is_empty() {
        tracing::info!(prefix = %config.api_prefix, "API prefix configured");
    }

    let app = build_app(
        store,
        &config.store_backend.to_string(),
        &config.api_prefix,
    );

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .context("Failed to bind to address")?;
    tracing::info!("Listening on {}", config.bind_addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn connect_store(config: &AppConfig) -> Result<Arc<dyn EventStore>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory event store; events are lost on restart");
            Ok(Arc::new(InMemoryEventStore::new()))
        }
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL environment variable required")?;
            let store = PostgresEventStore::connect(
                database_url,
                config.events_table.clone(),
                config.database_max_connections,
            )
            .await
            .context("Failed to connect to database")?;
            Ok(Arc::new(store))
        }
    }
}
