use ulid::Ulid;

use crate::model::*;

use super::conflict::{normalize_email, normalize_plate, validate_interval};
use super::{Engine, EngineError, SharedVehicleState};

impl Engine {
    fn vehicle(&self, plate: &str) -> Result<(String, SharedVehicleState), EngineError> {
        let plate = normalize_plate(plate)?;
        let shared = self
            .store
            .get_vehicle(&plate)
            .ok_or_else(|| EngineError::NotFound(plate.clone()))?;
        Ok((plate, shared))
    }

    pub fn get_user(&self, email: &str) -> Result<UserInfo, EngineError> {
        let email = normalize_email(email)?;
        let user = self
            .store
            .get_user(&email)
            .ok_or(EngineError::NotFound(email))?;
        Ok(UserInfo {
            email: user.email,
            name: user.name,
        })
    }

    pub fn list_users(&self) -> Vec<UserInfo> {
        self.store
            .users()
            .into_iter()
            .map(|u| UserInfo {
                email: u.email,
                name: u.name,
            })
            .collect()
    }

    pub async fn get_vehicle(&self, plate: &str) -> Result<VehicleInfo, EngineError> {
        let (_, shared) = self.vehicle(plate)?;
        let guard = shared.read().await;
        Ok(guard.info())
    }

    /// All vehicles sorted by plate.
    pub async fn list_vehicles(&self) -> Vec<VehicleInfo> {
        let mut out = Vec::new();
        for shared in self.store.vehicles() {
            out.push(shared.read().await.info());
        }
        out
    }

    /// Vehicles with no booking overlapping `interval`, sorted by plate.
    pub async fn available_vehicles(&self, interval: Interval) -> Result<Vec<VehicleInfo>, EngineError> {
        validate_interval(&interval)?;
        let mut out = Vec::new();
        for shared in self.store.vehicles() {
            let guard = shared.read().await;
            if !guard.bookings.is_occupied(&interval) {
                out.push(guard.info());
            }
        }
        Ok(out)
    }

    pub async fn is_available(&self, plate: &str, interval: Interval) -> Result<bool, EngineError> {
        validate_interval(&interval)?;
        let (_, shared) = self.vehicle(plate)?;
        let guard = shared.read().await;
        Ok(!guard.bookings.is_occupied(&interval))
    }

    /// Price `plate` would charge for `interval`, without booking it.
    pub async fn quote(&self, plate: &str, interval: Interval) -> Result<Cents, EngineError> {
        validate_interval(&interval)?;
        let (_, shared) = self.vehicle(plate)?;
        let guard = shared.read().await;
        guard
            .quote(&interval)
            .ok_or(EngineError::LimitExceeded("booking cost overflows"))
    }

    /// Chronological bookings of one vehicle.
    pub async fn vehicle_bookings(&self, plate: &str) -> Result<Vec<BookingInfo>, EngineError> {
        let (plate, shared) = self.vehicle(plate)?;
        let guard = shared.read().await;
        Ok(guard
            .bookings
            .iter()
            .map(|b| BookingInfo::from_booking(&plate, b))
            .collect())
    }

    /// Every booking of `plate` overlapping `interval`, in start order.
    pub async fn conflicts(&self, plate: &str, interval: Interval) -> Result<Vec<BookingInfo>, EngineError> {
        validate_interval(&interval)?;
        let (plate, shared) = self.vehicle(plate)?;
        let guard = shared.read().await;
        Ok(guard
            .bookings
            .overlapping(&interval)
            .iter()
            .map(|b| BookingInfo::from_booking(&plate, b))
            .collect())
    }

    /// Bookings of one user across all vehicles, ordered by start then plate.
    pub async fn user_bookings(&self, email: &str) -> Result<Vec<BookingInfo>, EngineError> {
        let email = normalize_email(email)?;
        if !self.store.contains_user(&email) {
            return Err(EngineError::NotFound(email));
        }
        let mut out = Vec::new();
        for shared in self.store.vehicles() {
            let guard = shared.read().await;
            out.extend(
                guard
                    .bookings
                    .iter()
                    .filter(|b| b.client == email)
                    .map(|b| BookingInfo::from_booking(&guard.plate, b)),
            );
        }
        out.sort_by(|a, b| a.start.cmp(&b.start).then_with(|| a.plate.cmp(&b.plate)));
        Ok(out)
    }

    pub async fn get_booking(&self, id: Ulid) -> Result<BookingInfo, EngineError> {
        let not_found = || EngineError::NotFound(id.to_string());
        let booking_ref = self.store.get_booking_ref(&id).ok_or_else(not_found)?;
        let shared = self
            .store
            .get_vehicle(&booking_ref.plate)
            .ok_or_else(not_found)?;
        let guard = shared.read().await;
        guard
            .bookings
            .overlapping(&booking_ref.interval)
            .iter()
            .find(|b| b.id == id)
            .map(|b| BookingInfo::from_booking(&booking_ref.plate, b))
            .ok_or_else(not_found)
    }
}
