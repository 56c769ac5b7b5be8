use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::repository::{ReleaseBacklog, StoreError, StoreResult, StuckRelease};
use sqlx::PgPool;
use uuid::Uuid;

use crate::database::{store_error, to_i32, to_u32};

/// Stuck seat releases, persisted so they survive a restart.
pub struct PgReleaseBacklog {
    pool: PgPool,
}

impl PgReleaseBacklog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct StuckReleaseRow {
    id: Uuid,
    hold_id: Uuid,
    booking_id: Option<Uuid>,
    flight_id: Uuid,
    slot: i32,
    attempts: i32,
    last_error: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<StuckReleaseRow> for StuckRelease {
    type Error = StoreError;

    fn try_from(row: StuckReleaseRow) -> Result<Self, Self::Error> {
        Ok(StuckRelease {
            id: row.id,
            hold_id: row.hold_id,
            booking_id: row.booking_id,
            flight_id: row.flight_id,
            slot: to_u32(row.slot, "slot")?,
            attempts: to_u32(row.attempts, "attempts")?,
            last_error: row.last_error,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl ReleaseBacklog for PgReleaseBacklog {
    async fn push(&self, release: &StuckRelease) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO stuck_releases (id, hold_id, booking_id, flight_id, slot, attempts, last_error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(release.id)
        .bind(release.hold_id)
        .bind(release.booking_id)
        .bind(release.flight_id)
        .bind(to_i32(release.slot, "slot")?)
        .bind(to_i32(release.attempts, "attempts")?)
        .bind(&release.last_error)
        .bind(release.created_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn pending(&self, limit: usize) -> StoreResult<Vec<StuckRelease>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows: Vec<StuckReleaseRow> = sqlx::query_as(
            r#"
            SELECT id, hold_id, booking_id, flight_id, slot, attempts, last_error, created_at
            FROM stuck_releases
            ORDER BY created_at
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(StuckRelease::try_from).collect()
    }

    async fn resolve(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM stuck_releases WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }

    async fn record_failure(&self, id: Uuid, reason: &str) -> StoreResult<()> {
        sqlx::query("UPDATE stuck_releases SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(id)
            .bind(reason)
            .execute(&self.pool)
            .await
            .map_err(store_error)?;
        Ok(())
    }
}
