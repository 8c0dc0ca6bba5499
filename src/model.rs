use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::index::IntervalIndex;

/// Unix milliseconds, the only time type.
pub type Ms = i64;

/// Money in the smallest currency unit.
pub type Cents = u64;

pub const HOUR_MS: Ms = 3_600_000;

/// Returned by [`Interval::new`] when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidInterval {
    pub start: Ms,
    pub end: Ms,
}

impl std::fmt::Display for InvalidInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid interval: start {} is after end {}", self.start, self.end)
    }
}

impl std::error::Error for InvalidInterval {}

/// Closed interval `[start, end]`. Touching endpoints count as overlapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawInterval", into = "RawInterval")]
pub struct Interval {
    start: Ms,
    end: Ms,
}

#[derive(Serialize, Deserialize)]
struct RawInterval {
    start: Ms,
    end: Ms,
}

impl TryFrom<RawInterval> for Interval {
    type Error = InvalidInterval;

    fn try_from(raw: RawInterval) -> Result<Self, Self::Error> {
        Interval::new(raw.start, raw.end)
    }
}

impl From<Interval> for RawInterval {
    fn from(i: Interval) -> Self {
        RawInterval { start: i.start, end: i.end }
    }
}

impl Interval {
    pub fn new(start: Ms, end: Ms) -> Result<Self, InvalidInterval> {
        if start > end {
            return Err(InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn end(&self) -> Ms {
        self.end
    }

    /// Width in milliseconds. Unsigned so the full `i64` range cannot overflow.
    pub fn duration_ms(&self) -> u64 {
        self.end.abs_diff(self.start)
    }

    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Whole hours covered, rounded up. A zero-length interval bills nothing.
    pub fn billable_hours(&self) -> u64 {
        self.duration_ms().div_ceil(HOUR_MS as u64)
    }
}

impl std::fmt::Display for Interval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// One reservation of one vehicle by one client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    /// E-mail of the booking user.
    pub client: String,
    pub interval: Interval,
    pub cost: Cents,
}

impl Booking {
    pub fn new(id: Ulid, client: impl Into<String>, interval: Interval, cost: Cents) -> Self {
        Self {
            id,
            client: client.into(),
            interval,
            cost,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.client.is_empty() && self.interval.start <= self.interval.end
    }
}

#[derive(Debug, Clone)]
pub struct VehicleState {
    pub plate: String,
    pub model: String,
    pub hourly_rate: Cents,
    /// All bookings of this vehicle, keyed by interval.
    pub bookings: IntervalIndex,
}

impl VehicleState {
    pub fn new(plate: String, model: String, hourly_rate: Cents) -> Self {
        Self {
            plate,
            model,
            hourly_rate,
            bookings: IntervalIndex::new(),
        }
    }

    /// Price of renting this vehicle for `interval`. `None` on overflow.
    pub fn quote(&self, interval: &Interval) -> Option<Cents> {
        self.hourly_rate.checked_mul(interval.billable_hours())
    }

    pub fn info(&self) -> VehicleInfo {
        VehicleInfo {
            plate: self.plate.clone(),
            model: self.model.clone(),
            hourly_rate: self.hourly_rate,
            booking_count: self.bookings.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub email: String,
    pub name: String,
    /// PHC-formatted argon2 hash.
    pub password_hash: String,
}

/// The event types, flat with no nesting. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered {
        email: String,
        name: String,
        password_hash: String,
    },
    VehicleAdded {
        plate: String,
        model: String,
        hourly_rate: Cents,
    },
    VehicleRemoved {
        plate: String,
    },
    BookingConfirmed {
        id: Ulid,
        plate: String,
        client: String,
        interval: Interval,
        cost: Cents,
    },
    BookingCancelled {
        id: Ulid,
        plate: String,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserInfo {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VehicleInfo {
    pub plate: String,
    pub model: String,
    pub hourly_rate: Cents,
    pub booking_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingInfo {
    pub id: Ulid,
    pub plate: String,
    pub client: String,
    pub start: Ms,
    pub end: Ms,
    pub cost: Cents,
}

impl BookingInfo {
    pub fn from_booking(plate: &str, b: &Booking) -> Self {
        Self {
            id: b.id,
            plate: plate.to_string(),
            client: b.client.clone(),
            start: b.interval.start(),
            end: b.interval.end(),
            cost: b.cost,
        }
    }
}
