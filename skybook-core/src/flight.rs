use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlightStatus {
    Scheduled,
    Cancelled,
    Departed,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "SCHEDULED",
            FlightStatus::Cancelled => "CANCELLED",
            FlightStatus::Departed => "DEPARTED",
        }
    }
}

impl FromStr for FlightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SCHEDULED" => Ok(FlightStatus::Scheduled),
            "CANCELLED" => Ok(FlightStatus::Cancelled),
            "DEPARTED" => Ok(FlightStatus::Departed),
            other => Err(format!("unknown flight status '{}'", other)),
        }
    }
}

/// A scheduled flight and its aggregate seat counter.
///
/// `available_slot` is the only record of remaining capacity; there are no
/// per-seat rows. Invariant: `available_slot <= capacity`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub capacity: u32,
    pub available_slot: u32,
    pub status: FlightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewFlight {
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub departure: DateTime<Utc>,
    pub capacity: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Availability {
    pub flight_id: Uuid,
    pub available_slot: u32,
    pub capacity: u32,
    pub status: FlightStatus,
}

/// Result of a conditional check-and-decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Reserved { remaining: u32 },
    Insufficient { available: u32 },
    NotBookable(FlightStatus),
    /// The hold key was already used or already released; nothing changed.
    Settled,
    Missing,
}

/// Result of a keyed, clamped increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    Released { available: u32 },
    /// More slots came back than were ever taken; the excess was discarded.
    Clamped { available: u32, overflow: u32 },
    /// This hold was released before; nothing changed.
    AlreadyReleased,
    /// Nothing was ever reserved under this hold. The key is now closed, so
    /// a reserve still in flight for it becomes a no-op.
    NeverHeld,
    Missing,
}

/// What a hold key has done to a flight's counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldState {
    Held(u32),
    Released,
}

impl Flight {
    pub fn new(new_flight: NewFlight) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: new_flight.name,
            origin: new_flight.origin,
            destination: new_flight.destination,
            departure: new_flight.departure,
            capacity: new_flight.capacity,
            available_slot: new_flight.capacity,
            status: FlightStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn availability(&self) -> Availability {
        Availability {
            flight_id: self.id,
            available_slot: self.available_slot,
            capacity: self.capacity,
            status: self.status,
        }
    }

    /// Check and decrement in one step. Callers must hold whatever lock
    /// serializes access to this flight.
    pub fn take_slots(&mut self, count: u32) -> ReserveOutcome {
        if self.status != FlightStatus::Scheduled {
            return ReserveOutcome::NotBookable(self.status);
        }
        if self.available_slot < count {
            return ReserveOutcome::Insufficient {
                available: self.available_slot,
            };
        }
        self.available_slot -= count;
        self.updated_at = Utc::now();
        ReserveOutcome::Reserved {
            remaining: self.available_slot,
        }
    }

    /// Increment, never past capacity.
    pub fn return_slots(&mut self, count: u32) -> ReleaseOutcome {
        let wanted = self.available_slot.saturating_add(count);
        self.available_slot = wanted.min(self.capacity);
        self.updated_at = Utc::now();
        if wanted > self.capacity {
            ReleaseOutcome::Clamped {
                available: self.available_slot,
                overflow: wanted - self.capacity,
            }
        } else {
            ReleaseOutcome::Released {
                available: self.available_slot,
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightFilter {
    pub name: Option<String>,
    pub origin: Option<String>,
    pub destination: Option<String>,
    pub status: Option<FlightStatus>,
}

impl FlightFilter {
    pub fn matches(&self, flight: &Flight) -> bool {
        self.name.as_ref().map_or(true, |n| *n == flight.name)
            && self.origin.as_ref().map_or(true, |o| *o == flight.origin)
            && self.destination.as_ref().map_or(true, |d| *d == flight.destination)
            && self.status.map_or(true, |s| s == flight.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flight(capacity: u32) -> Flight {
        Flight::new(NewFlight {
            name: "VN213".to_string(),
            origin: "HAN".to_string(),
            destination: "SGN".to_string(),
            departure: Utc::now(),
            capacity,
        })
    }

    #[test]
    fn test_take_slots_is_all_or_nothing() {
        let mut f = flight(10);
        assert_eq!(f.take_slots(4), ReserveOutcome::Reserved { remaining: 6 });
        assert_eq!(f.take_slots(4), ReserveOutcome::Reserved { remaining: 2 });
        assert_eq!(f.take_slots(4), ReserveOutcome::Insufficient { available: 2 });
        assert_eq!(f.available_slot, 2);
    }

    #[test]
    fn test_take_slots_rejects_unscheduled() {
        let mut f = flight(10);
        f.status = FlightStatus::Departed;
        assert_eq!(f.take_slots(1), ReserveOutcome::NotBookable(FlightStatus::Departed));
        assert_eq!(f.available_slot, 10);
    }

    #[test]
    fn test_return_slots_clamps_at_capacity() {
        let mut f = flight(10);
        f.take_slots(3);
        assert_eq!(f.return_slots(3), ReleaseOutcome::Released { available: 10 });
        assert_eq!(
            f.return_slots(3),
            ReleaseOutcome::Clamped { available: 10, overflow: 3 }
        );
        assert_eq!(f.available_slot, 10);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [FlightStatus::Scheduled, FlightStatus::Cancelled, FlightStatus::Departed] {
            assert_eq!(status.as_str().parse::<FlightStatus>().unwrap(), status);
        }
        assert!("BOARDING".parse::<FlightStatus>().is_err());
    }
}
