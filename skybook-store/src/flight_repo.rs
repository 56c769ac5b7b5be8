use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::flight::{ReleaseOutcome, ReserveOutcome};
use skybook_core::repository::{FlightRepository, StoreError, StoreResult};
use skybook_core::{Flight, FlightFilter, FlightStatus};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::warn;
use uuid::Uuid;

use crate::database::{store_error, to_i32, to_u32};
use crate::RedisClient;

const COLUMNS: &str = "id, name, origin, destination, departure, capacity, available_slot, status, created_at, updated_at";

/// Flight inventory in PostgreSQL. Seat counters only ever move inside a
/// transaction that holds the flight row lock and records the hold key in
/// `seat_holds`, so concurrent callers serialize on the row and a hold moves
/// the counter at most once each way.
pub struct PgFlightRepository {
    pool: PgPool,
    mirror: Option<RedisClient>,
}

impl PgFlightRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, mirror: None }
    }

    /// Also write post-update availability to Redis. The mirror is never
    /// read back for decisions.
    pub fn with_mirror(mut self, redis: RedisClient) -> Self {
        self.mirror = Some(redis);
        self
    }

    /// Why a conditional reserve updated nothing. Only used for reporting.
    async fn explain_refusal(&self, id: Uuid) -> StoreResult<ReserveOutcome> {
        let counter: Option<CounterRow> = sqlx::query_as("SELECT available_slot, status FROM flights WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        let Some(counter) = counter else {
            return Ok(ReserveOutcome::Missing);
        };
        let status = counter.status.parse::<FlightStatus>().map_err(StoreError::Corrupt)?;
        if status != FlightStatus::Scheduled {
            return Ok(ReserveOutcome::NotBookable(status));
        }
        Ok(ReserveOutcome::Insufficient {
            available: to_u32(counter.available_slot, "available_slot")?,
        })
    }

    async fn mirror(&self, flight_id: Uuid, available: u32) {
        if let Some(redis) = &self.mirror {
            if let Err(e) = redis.set_flight_availability(flight_id, available).await {
                warn!(flight_id = %flight_id, "Availability mirror write failed: {}", e);
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    name: String,
    origin: String,
    destination: String,
    departure: DateTime<Utc>,
    capacity: i32,
    available_slot: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = StoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        Ok(Flight {
            id: row.id,
            name: row.name,
            origin: row.origin,
            destination: row.destination,
            departure: row.departure,
            capacity: to_u32(row.capacity, "capacity")?,
            available_slot: to_u32(row.available_slot, "available_slot")?,
            status: row.status.parse::<FlightStatus>().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CounterRow {
    available_slot: i32,
    status: String,
}

#[derive(sqlx::FromRow)]
struct CapacityRow {
    available_slot: i32,
    capacity: i32,
}

#[async_trait]
impl FlightRepository for PgFlightRepository {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Flight>> {
        let row: Option<FlightRow> = sqlx::query_as(&format!("SELECT {} FROM flights WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Flight::try_from).transpose()
    }

    async fn insert(&self, flight: &Flight) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO flights (id, name, origin, destination, departure, capacity, available_slot, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(flight.id)
        .bind(&flight.name)
        .bind(&flight.origin)
        .bind(&flight.destination)
        .bind(flight.departure)
        .bind(to_i32(flight.capacity, "capacity")?)
        .bind(to_i32(flight.available_slot, "available_slot")?)
        .bind(flight.status.as_str())
        .bind(flight.created_at)
        .bind(flight.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        self.mirror(flight.id, flight.available_slot).await;
        Ok(())
    }

    async fn search(&self, filter: &FlightFilter) -> StoreResult<Vec<Flight>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM flights WHERE TRUE", COLUMNS));

        for (column, value) in [
            ("name", &filter.name),
            ("origin", &filter.origin),
            ("destination", &filter.destination),
        ] {
            if let Some(value) = value {
                query.push(format!(" AND {} = ", column)).push_bind(value.clone());
            }
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY departure");

        let rows: Vec<FlightRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter().map(Flight::try_from).collect()
    }

    async fn set_status(&self, id: Uuid, status: FlightStatus) -> StoreResult<Option<Flight>> {
        let sql = format!(
            "UPDATE flights SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
            COLUMNS
        );
        let row: Option<FlightRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(status.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Flight::try_from).transpose()
    }

    async fn reserve_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReserveOutcome> {
        let count = to_i32(count, "count")?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE flights
            SET available_slot = available_slot - $2, updated_at = NOW()
            WHERE id = $1 AND status = 'SCHEDULED' AND available_slot >= $2
            RETURNING available_slot
            "#,
        )
        .bind(id)
        .bind(count)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let Some(remaining) = remaining else {
            tx.rollback().await.map_err(store_error)?;
            return self.explain_refusal(id).await;
        };

        let recorded = sqlx::query(
            r#"
            INSERT INTO seat_holds (id, flight_id, slot, status)
            VALUES ($1, $2, $3, 'HELD')
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(hold_id)
        .bind(id)
        .bind(count)
        .execute(&mut *tx)
        .await
        .map_err(store_error)?;

        if recorded.rows_affected() == 0 {
            tx.rollback().await.map_err(store_error)?;
            return Ok(ReserveOutcome::Settled);
        }
        tx.commit().await.map_err(store_error)?;

        let remaining = to_u32(remaining, "available_slot")?;
        self.mirror(id, remaining).await;
        Ok(ReserveOutcome::Reserved { remaining })
    }

    async fn release_slots(&self, id: Uuid, hold_id: Uuid, count: u32) -> StoreResult<ReleaseOutcome> {
        let requested = to_i32(count, "count")?;
        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Row lock on the flight first, same order as reserve_slots.
        let counter: Option<CapacityRow> =
            sqlx::query_as("SELECT available_slot, capacity FROM flights WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?;

        let Some(counter) = counter else {
            tx.rollback().await.map_err(store_error)?;
            return Ok(ReleaseOutcome::Missing);
        };

        let held: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE seat_holds
            SET status = 'RELEASED', released_at = NOW()
            WHERE id = $1 AND flight_id = $2 AND status = 'HELD'
            RETURNING slot
            "#,
        )
        .bind(hold_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(store_error)?;

        let Some(held) = held else {
            // Close the key so a reserve still in flight for it cannot land.
            let closed = sqlx::query(
                r#"
                INSERT INTO seat_holds (id, flight_id, slot, status, released_at)
                VALUES ($1, $2, $3, 'RELEASED', NOW())
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(hold_id)
            .bind(id)
            .bind(requested)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
            tx.commit().await.map_err(store_error)?;

            return Ok(if closed.rows_affected() == 0 {
                ReleaseOutcome::AlreadyReleased
            } else {
                ReleaseOutcome::NeverHeld
            });
        };

        let wanted = counter.available_slot.saturating_add(held);
        let available = wanted.min(counter.capacity);
        sqlx::query("UPDATE flights SET available_slot = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(available)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        tx.commit().await.map_err(store_error)?;

        let available = to_u32(available, "available_slot")?;
        self.mirror(id, available).await;

        if wanted > counter.capacity {
            return Ok(ReleaseOutcome::Clamped {
                available,
                overflow: to_u32(wanted - counter.capacity, "overflow")?,
            });
        }
        Ok(ReleaseOutcome::Released { available })
    }
}
