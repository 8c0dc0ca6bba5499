use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::index::IndexError;
use crate::model::*;

pub type SharedVehicleState = Arc<RwLock<VehicleState>>;

/// Where a booking lives, so it can be found without scanning every vehicle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRef {
    pub plate: String,
    pub interval: Interval,
}

pub struct InMemoryStore {
    vehicles: DashMap<String, SharedVehicleState>,
    users: DashMap<String, UserRecord>,
    booking_to_vehicle: DashMap<Ulid, BookingRef>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            vehicles: DashMap::new(),
            users: DashMap::new(),
            booking_to_vehicle: DashMap::new(),
        }
    }

    // ── Vehicles ─────────────────────────────────────────────

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn contains_vehicle(&self, plate: &str) -> bool {
        self.vehicles.contains_key(plate)
    }

    pub fn get_vehicle(&self, plate: &str) -> Option<SharedVehicleState> {
        self.vehicles.get(plate).map(|e| e.value().clone())
    }

    /// Returns false when the plate is already taken; the stored vehicle is kept.
    pub fn insert_vehicle(&self, state: VehicleState) -> bool {
        match self.vehicles.entry(state.plate.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(RwLock::new(state)));
                true
            }
        }
    }

    /// Drop a vehicle. The caller holds its write lock and passes the state so
    /// the booking ids it owned can be unmapped.
    pub fn remove_vehicle(&self, vs: &VehicleState) {
        for booking in &vs.bookings {
            self.booking_to_vehicle.remove(&booking.id);
        }
        self.vehicles.remove(&vs.plate);
    }

    /// Every vehicle, sorted by plate.
    pub fn vehicles(&self) -> Vec<SharedVehicleState> {
        let mut entries: Vec<(String, SharedVehicleState)> = self
            .vehicles
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, vs)| vs).collect()
    }

    // ── Users ────────────────────────────────────────────────

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn contains_user(&self, email: &str) -> bool {
        self.users.contains_key(email)
    }

    pub fn get_user(&self, email: &str) -> Option<UserRecord> {
        self.users.get(email).map(|e| e.value().clone())
    }

    /// Returns false when the e-mail is already taken.
    pub fn insert_user(&self, user: UserRecord) -> bool {
        match self.users.entry(user.email.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(user);
                true
            }
        }
    }

    /// Every user, sorted by e-mail.
    pub fn users(&self) -> Vec<UserRecord> {
        let mut users: Vec<UserRecord> = self.users.iter().map(|e| e.value().clone()).collect();
        users.sort_by(|a, b| a.email.cmp(&b.email));
        users
    }

    // ── Booking index ────────────────────────────────────────

    pub fn booking_count(&self) -> usize {
        self.booking_to_vehicle.len()
    }

    pub fn get_booking_ref(&self, id: &Ulid) -> Option<BookingRef> {
        self.booking_to_vehicle.get(id).map(|e| e.value().clone())
    }

    // ── Event application ────────────────────────────────────

    /// Apply a booking event to the vehicle it targets (caller holds the lock).
    /// User and vehicle lifecycle events are handled at the map level.
    pub fn apply_event(&self, vs: &mut VehicleState, event: &Event) -> Result<(), IndexError> {
        match event {
            Event::BookingConfirmed {
                id,
                plate,
                client,
                interval,
                cost,
            } => {
                vs.bookings
                    .insert(Booking::new(*id, client.clone(), *interval, *cost))?;
                self.booking_to_vehicle.insert(
                    *id,
                    BookingRef {
                        plate: plate.clone(),
                        interval: *interval,
                    },
                );
            }
            Event::BookingCancelled { id, .. } => {
                if let Some((_, r)) = self.booking_to_vehicle.remove(id) {
                    vs.bookings.remove_interval(&r.interval);
                }
            }
            Event::UserRegistered { .. } | Event::VehicleAdded { .. } | Event::VehicleRemoved { .. } => {}
        }
        Ok(())
    }
}
