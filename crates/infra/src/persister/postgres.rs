//! Postgres-backed event sink.
//!
//! Rows land in the `item_events` table, created on startup if missing. The sink is
//! called from the consumer thread (synchronous), so each insert is driven to
//! completion on the runtime handle captured at construction.

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::runtime::Handle;
use tracing::info;

use super::{EventSink, PersistedEvent, SinkError};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS item_events (
    id          BIGSERIAL PRIMARY KEY,
    event       TEXT        NOT NULL,
    message     TEXT        NOT NULL,
    received_at TIMESTAMPTZ NOT NULL
)
"#;

pub struct PostgresEventSink {
    pool: Arc<PgPool>,
    runtime: Handle,
}

impl PostgresEventSink {
    /// Connect, make sure the table exists, and bind to the current runtime.
    ///
    /// Must be called from within a tokio runtime; inserts must then happen on a thread
    /// that is *not* a runtime worker (the consumer thread).
    pub async fn connect(database_url: &str) -> Result<Self, SinkError> {
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(database_url)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;

        let sink = Self {
            pool: Arc::new(pool),
            runtime: Handle::current(),
        };
        sink.ensure_schema().await?;
        info!("postgres event sink ready");
        Ok(sink)
    }

    pub async fn ensure_schema(&self) -> Result<(), SinkError> {
        sqlx::query(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| SinkError::Unavailable(e.to_string()))?;
        Ok(())
    }
}

impl core::fmt::Debug for PostgresEventSink {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PostgresEventSink").finish_non_exhaustive()
    }
}

impl EventSink for PostgresEventSink {
    fn insert(&self, event: &PersistedEvent) -> Result<(), SinkError> {
        let pool = self.pool.clone();
        let event = event.clone();

        self.runtime.block_on(async move {
            sqlx::query("INSERT INTO item_events (event, message, received_at) VALUES ($1, $2, $3)")
                .bind(event.event.as_str())
                .bind(&event.message)
                .bind(event.received_at)
                .execute(&*pool)
                .await
                .map_err(|e| SinkError::Insert(e.to_string()))
        })?;
        Ok(())
    }
}
