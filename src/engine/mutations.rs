use tokio::sync::oneshot;
use tracing::{info, warn};
use ulid::Ulid;

use crate::auth;
use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, normalize_email, normalize_plate, validate_interval, validate_text};
use super::{Engine, EngineError, WalCommand};

impl Engine {
    pub async fn register_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<UserInfo, EngineError> {
        let _gate = self.write_gate.read().await;
        let email = normalize_email(email)?;
        validate_text(name, MAX_NAME_LEN, "user name")?;
        if self.store.user_count() >= MAX_USERS {
            return Err(EngineError::LimitExceeded("too many users"));
        }
        if self.store.contains_user(&email) {
            return Err(EngineError::AlreadyExists(email));
        }

        // Argon2 is deliberately slow; keep it off the async workers.
        let password = password.to_string();
        let password_hash = tokio::task::spawn_blocking(move || auth::hash_password(&password))
            .await
            .map_err(|e| EngineError::PasswordHash(e.to_string()))??;

        let _catalog = self.catalog.lock().await;
        if self.store.contains_user(&email) {
            return Err(EngineError::AlreadyExists(email));
        }
        let name = name.trim().to_string();
        let event = Event::UserRegistered {
            email: email.clone(),
            name: name.clone(),
            password_hash: password_hash.clone(),
        };
        self.wal_append(&event).await?;
        if !self.store.insert_user(UserRecord {
            email: email.clone(),
            name: name.clone(),
            password_hash,
        }) {
            warn!("concurrent registration of {email}; keeping the first");
            return Err(EngineError::AlreadyExists(email));
        }
        info!("registered user {email}");
        Ok(UserInfo { email, name })
    }

    /// Unknown e-mails and wrong passwords are indistinguishable to the caller.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<UserInfo, EngineError> {
        let email = normalize_email(email).map_err(|_| EngineError::InvalidCredentials)?;
        let user = self
            .store
            .get_user(&email)
            .ok_or(EngineError::InvalidCredentials)?;

        let password = password.to_string();
        let stored = user.password_hash.clone();
        let ok = tokio::task::spawn_blocking(move || auth::verify_password(&password, &stored))
            .await
            .map_err(|e| EngineError::PasswordHash(e.to_string()))??;
        if !ok {
            return Err(EngineError::InvalidCredentials);
        }
        Ok(UserInfo {
            email: user.email,
            name: user.name,
        })
    }

    pub async fn add_vehicle(
        &self,
        plate: &str,
        model: &str,
        hourly_rate: Cents,
    ) -> Result<VehicleInfo, EngineError> {
        let _gate = self.write_gate.read().await;
        let plate = normalize_plate(plate)?;
        validate_text(model, MAX_MODEL_LEN, "vehicle model")?;
        let _catalog = self.catalog.lock().await;
        if self.store.vehicle_count() >= MAX_VEHICLES {
            return Err(EngineError::LimitExceeded("too many vehicles"));
        }
        if self.store.contains_vehicle(&plate) {
            return Err(EngineError::AlreadyExists(plate));
        }

        let model = model.trim().to_string();
        let event = Event::VehicleAdded {
            plate: plate.clone(),
            model: model.clone(),
            hourly_rate,
        };
        self.wal_append(&event).await?;
        let vs = VehicleState::new(plate.clone(), model, hourly_rate);
        let info = vs.info();
        if !self.store.insert_vehicle(vs) {
            warn!("concurrent add of vehicle {plate}; keeping the first");
            return Err(EngineError::AlreadyExists(plate));
        }
        info!("added vehicle {plate}");
        Ok(info)
    }

    /// Remove a vehicle together with all of its bookings.
    /// Returns how many bookings were dropped.
    pub async fn remove_vehicle(&self, plate: &str) -> Result<usize, EngineError> {
        let _gate = self.write_gate.read().await;
        let plate = normalize_plate(plate)?;
        let shared = self
            .store
            .get_vehicle(&plate)
            .ok_or_else(|| EngineError::NotFound(plate.clone()))?;
        let mut guard = shared.write().await;
        if !self.store.contains_vehicle(&plate) {
            return Err(EngineError::NotFound(plate));
        }

        let event = Event::VehicleRemoved { plate: plate.clone() };
        self.wal_append(&event).await?;
        let dropped = guard.bookings.len();
        self.store.remove_vehicle(&guard);
        // In-flight readers may still hold the Arc; they must see no bookings.
        guard.bookings.clear();
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(self.store.booking_count() as f64);
        info!("removed vehicle {plate} with {dropped} bookings");
        Ok(dropped)
    }

    /// Reserve `plate` for `client` during `interval`.
    ///
    /// Fails with [`EngineError::Conflict`] when any existing booking of the
    /// vehicle overlaps, touching endpoints included.
    pub async fn book(
        &self,
        id: Ulid,
        plate: &str,
        client: &str,
        interval: Interval,
    ) -> Result<BookingInfo, EngineError> {
        let _gate = self.write_gate.read().await;
        validate_interval(&interval)?;
        let plate = normalize_plate(plate)?;
        let client = normalize_email(client)?;
        if !self.store.contains_user(&client) {
            return Err(EngineError::NotFound(client));
        }
        let shared = self
            .store
            .get_vehicle(&plate)
            .ok_or_else(|| EngineError::NotFound(plate.clone()))?;
        let mut guard = shared.write().await;
        if !self.store.contains_vehicle(&plate) {
            return Err(EngineError::NotFound(plate));
        }
        if guard.bookings.len() >= MAX_BOOKINGS_PER_VEHICLE {
            return Err(EngineError::LimitExceeded("too many bookings on vehicle"));
        }
        if self.store.get_booking_ref(&id).is_some() {
            return Err(EngineError::AlreadyExists(id.to_string()));
        }

        check_no_conflict(&guard, &interval)?;
        let cost = guard
            .quote(&interval)
            .ok_or(EngineError::LimitExceeded("booking cost overflows"))?;

        let event = Event::BookingConfirmed {
            id,
            plate: plate.clone(),
            client: client.clone(),
            interval,
            cost,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CONFIRMED_TOTAL).increment(1);
        info!("booked {plate} for {client} during {interval} ({id})");

        Ok(BookingInfo {
            id,
            plate,
            client,
            start: interval.start(),
            end: interval.end(),
            cost,
        })
    }

    /// Cancel a booking on behalf of `requester`, who must own it.
    pub async fn cancel_booking(&self, id: Ulid, requester: &str) -> Result<BookingInfo, EngineError> {
        let _gate = self.write_gate.read().await;
        let requester = normalize_email(requester)?;
        let (booking_ref, mut guard) = self.resolve_booking_write(&id).await?;
        let booking = guard
            .bookings
            .overlapping(&booking_ref.interval)
            .into_iter()
            .find(|b| b.id == id)
            .ok_or_else(|| EngineError::NotFound(id.to_string()))?;
        if booking.client != requester {
            return Err(EngineError::Forbidden(id));
        }

        let event = Event::BookingCancelled {
            id,
            plate: booking_ref.plate.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        metrics::counter!(crate::observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        info!("cancelled booking {id} on {}", booking_ref.plate);
        Ok(BookingInfo::from_booking(&booking_ref.plate, &booking))
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let _gate = self.write_gate.write().await;
        let mut events = Vec::new();
        for user in self.store.users() {
            events.push(Event::UserRegistered {
                email: user.email,
                name: user.name,
                password_hash: user.password_hash,
            });
        }
        for shared in self.store.vehicles() {
            let guard = shared.read().await;
            events.push(Event::VehicleAdded {
                plate: guard.plate.clone(),
                model: guard.model.clone(),
                hourly_rate: guard.hourly_rate,
            });
            for booking in &guard.bookings {
                events.push(Event::BookingConfirmed {
                    id: booking.id,
                    plate: guard.plate.clone(),
                    client: booking.client.clone(),
                    interval: booking.interval,
                    cost: booking.cost,
                });
            }
        }

        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!("compacted WAL to {count} events");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
