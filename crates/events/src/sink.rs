//! Delivery targets for asset events.

use async_trait::async_trait;
use stockpile_core::event::AssetEvent;
use stockpile_db::repositories::EventRepo;
use stockpile_db::DbPool;

#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// A destination the [`EventProcessor`](crate::EventProcessor) forwards
/// events to. Failures are logged by the processor and never retried.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Short sink name for logs.
    fn name(&self) -> &'static str;

    async fn deliver(&self, event: &AssetEvent) -> Result<(), SinkError>;
}

// ---------------------------------------------------------------------------
// LogSink
// ---------------------------------------------------------------------------

/// Writes each event to the tracing log at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

#[async_trait]
impl EventSink for LogSink {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, event: &AssetEvent) -> Result<(), SinkError> {
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            kind = %event.kind,
            "Asset event"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// PersistenceSink
// ---------------------------------------------------------------------------

/// Stores each event as a row in `asset_events`.
#[derive(Debug, Clone)]
pub struct PersistenceSink {
    pool: DbPool,
}

impl PersistenceSink {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventSink for PersistenceSink {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn deliver(&self, event: &AssetEvent) -> Result<(), SinkError> {
        EventRepo::insert(&self.pool, event).await?;
        Ok(())
    }
}
