use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::restaurant::RestaurantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReservationId(pub String);

impl ReservationId {
    pub fn generate() -> Self {
        let simple = Uuid::new_v4().simple().to_string();
        Self(format!("rsv-{}", &simple[..12]))
    }
}

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller-supplied token that makes a booking safe to retry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Held,
    Confirmed,
    Cancelled,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Held => "held",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "held" => Some(Self::Held),
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Identity of one bookable seating: a restaurant at a date and time.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CapacityKey {
    pub restaurant_id: RestaurantId,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

impl CapacityKey {
    pub fn new(restaurant_id: RestaurantId, date: NaiveDate, time: NaiveTime) -> Self {
        Self { restaurant_id, date, time }
    }
}

impl std::fmt::Display for CapacityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}T{}", self.restaurant_id, self.date, self.time.format("%H:%M"))
    }
}

/// Seat counter for one key. `seats_reserved <= total_seats` always holds.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacitySlot {
    pub key: CapacityKey,
    pub total_seats: u32,
    pub seats_reserved: u32,
}

impl CapacitySlot {
    pub fn new(key: CapacityKey, total_seats: u32) -> Self {
        Self { key, total_seats, seats_reserved: 0 }
    }

    pub fn seats_available(&self) -> u32 {
        self.total_seats.saturating_sub(self.seats_reserved)
    }

    /// Applies the increment only if it fits; returns whether it did.
    pub fn try_reserve(&mut self, party_size: u32) -> bool {
        match self.seats_reserved.checked_add(party_size) {
            Some(next) if next <= self.total_seats => {
                self.seats_reserved = next;
                true
            }
            _ => false,
        }
    }

    pub fn release(&mut self, party_size: u32) {
        self.seats_reserved = self.seats_reserved.saturating_sub(party_size);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationRecord {
    pub id: ReservationId,
    pub restaurant_id: RestaurantId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub party_size: u32,
    pub customer_name: Option<String>,
    pub status: ReservationStatus,
    pub idempotency_key: Option<OperationKey>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ReservationRecord {
    pub fn key(&self) -> CapacityKey {
        CapacityKey::new(self.restaurant_id.clone(), self.date, self.time)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub key: CapacityKey,
    pub party_size: u32,
    pub customer_name: Option<String>,
    pub idempotency_key: Option<OperationKey>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReserveOutcome {
    Confirmed(ReservationRecord),
    CapacityExceeded { seats_available: u32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelOutcome {
    Cancelled(ReservationRecord),
    /// Cancelling twice is a no-op; the record is returned unchanged.
    AlreadyCancelled(ReservationRecord),
}

impl CancelOutcome {
    pub fn record(&self) -> &ReservationRecord {
        match self {
            Self::Cancelled(record) | Self::AlreadyCancelled(record) => record,
        }
    }
}
