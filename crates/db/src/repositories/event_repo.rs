//! Repository for the `asset_events` table.

use sqlx::PgPool;
use stockpile_core::event::AssetEvent;
use uuid::Uuid;

/// Write side of the `asset_events` audit table. Rows are read back with
/// plain SQL; nothing in the service queries them.
pub struct EventRepo;

impl EventRepo {
    /// Insert an event row, returning its id.
    pub async fn insert(pool: &PgPool, event: &AssetEvent) -> Result<Uuid, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO asset_events (id, event_type, kind, payload, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING id",
        )
        .bind(event.id)
        .bind(&event.event_type)
        .bind(event.kind.as_str())
        .bind(&event.payload)
        .bind(event.timestamp)
        .fetch_one(pool)
        .await
    }
}
