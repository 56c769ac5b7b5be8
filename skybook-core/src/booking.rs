use crate::code::BookingCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Active,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Active => "ACTIVE",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(BookingStatus::Active),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{}'", other)),
        }
    }
}

/// Seats held by one customer on one flight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub flight_id: Uuid,
    pub booked_slot: u32,
    pub code: BookingCode,
    pub status: BookingStatus,
    pub booked_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn new(id: Uuid, customer_id: Uuid, flight_id: Uuid, booked_slot: u32, code: BookingCode) -> Self {
        let now = Utc::now();
        Self {
            id,
            customer_id,
            flight_id,
            booked_slot,
            code,
            status: BookingStatus::Active,
            booked_date: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == BookingStatus::Active
    }
}

/// Conjunctive booking query. An empty filter selects everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingFilter {
    pub customer_id: Option<Uuid>,
    pub flight_id: Option<Uuid>,
    pub code: Option<String>,
    pub status: Option<BookingStatus>,
}

impl BookingFilter {
    pub fn for_customer(customer_id: Uuid) -> Self {
        Self {
            customer_id: Some(customer_id),
            ..Default::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        self.customer_id.map_or(true, |c| c == booking.customer_id)
            && self.flight_id.map_or(true, |f| f == booking.flight_id)
            && self.code.as_ref().map_or(true, |c| c == booking.code.as_str())
            && self.status.map_or(true, |s| s == booking.status)
    }
}
