use async_trait::async_trait;
use chrono::{DateTime, Utc};
use skybook_core::repository::{BookingRepository, StoreError, StoreResult, Transition};
use skybook_core::{Booking, BookingCode, BookingFilter, BookingStatus};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::database::{store_error, to_i32, to_u32};

const COLUMNS: &str = "id, customer_id, flight_id, booked_slot, code, status, booked_date, created_at, updated_at";

pub struct PgBookingRepository {
    pool: PgPool,
}

impl PgBookingRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    customer_id: Uuid,
    flight_id: Uuid,
    booked_slot: i32,
    code: String,
    status: String,
    booked_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            customer_id: row.customer_id,
            flight_id: row.flight_id,
            booked_slot: to_u32(row.booked_slot, "booked_slot")?,
            code: BookingCode::parse(&row.code).map_err(|e| StoreError::Corrupt(e.to_string()))?,
            status: row.status.parse::<BookingStatus>().map_err(StoreError::Corrupt)?,
            booked_date: row.booked_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl BookingRepository for PgBookingRepository {
    async fn get(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(&format!("SELECT {} FROM bookings WHERE id = $1", COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn insert(&self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, customer_id, flight_id, booked_slot, code, status, booked_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(booking.id)
        .bind(booking.customer_id)
        .bind(booking.flight_id)
        .bind(to_i32(booking.booked_slot, "booked_slot")?)
        .bind(booking.code.as_str())
        .bind(booking.status.as_str())
        .bind(booking.booked_date)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn transition(&self, id: Uuid, from: BookingStatus, to: BookingStatus) -> StoreResult<Transition> {
        let sql = format!(
            "UPDATE bookings SET status = $3, updated_at = NOW() WHERE id = $1 AND status = $2 RETURNING {}",
            COLUMNS
        );
        let applied: Option<BookingRow> = sqlx::query_as(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        if let Some(row) = applied {
            return Ok(Transition::Applied(row.try_into()?));
        }

        Ok(match self.get(id).await? {
            Some(current) => Transition::Unchanged(current),
            None => Transition::Missing,
        })
    }

    async fn search(&self, filter: &BookingFilter) -> StoreResult<Vec<Booking>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!("SELECT {} FROM bookings WHERE TRUE", COLUMNS));

        if let Some(customer_id) = filter.customer_id {
            query.push(" AND customer_id = ").push_bind(customer_id);
        }
        if let Some(flight_id) = filter.flight_id {
            query.push(" AND flight_id = ").push_bind(flight_id);
        }
        if let Some(code) = &filter.code {
            query.push(" AND code = ").push_bind(code.clone());
        }
        if let Some(status) = filter.status {
            query.push(" AND status = ").push_bind(status.as_str());
        }
        query.push(" ORDER BY created_at DESC");

        let rows: Vec<BookingRow> = query
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(store_error)?;

        rows.into_iter().map(Booking::try_from).collect()
    }
}
