mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::EngineError;
pub use store::{BookingRef, InMemoryStore, SharedVehicleState};

use std::io;
use std::path::PathBuf;

use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{info, warn};

use crate::model::*;
use crate::wal::Wal;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit.
/// Waits for one append, drains whatever else is already queued, then
/// flushes and fsyncs the whole batch once and answers every sender.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let (event, response) = match cmd {
            WalCommand::Append { event, response } => (event, response),
            other => {
                handle_non_append(&mut wal, other);
                continue;
            }
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }
        commit_batch(&mut wal, batch);
        // Compaction must observe the batch that preceded it.
        if let Some(other) = deferred {
            handle_non_append(&mut wal, other);
        }
    }
}

fn commit_batch(wal: &mut Wal, batch: Vec<PendingAppend>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();

    let mut result = Ok(());
    for (event, _) in &batch {
        if let Err(e) = wal.append_buffered(event) {
            result = Err(e);
            break;
        }
    }
    // Always flush so partially buffered bytes never leak into the next batch.
    let flushed = wal.flush_sync();
    if result.is_ok() {
        result = flushed;
    }

    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        warn!("WAL batch of {} failed: {e}", batch.len());
    }
    for (_, tx) in batch {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The booking manager: users, vehicles and one interval index per vehicle,
/// made durable through the WAL.
pub struct Engine {
    pub store: InMemoryStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared from validation until applied; compaction
    /// holds it exclusively so its snapshot cannot miss an appended event.
    pub(super) write_gate: RwLock<()>,
    /// Serialises user and vehicle creation from the existence check to the
    /// insert, so the WAL never records a second claim on the same key.
    pub(super) catalog: Mutex<()>,
}

impl Engine {
    /// Replay the log at `wal_path` and start the WAL writer task.
    /// Must be called from within a tokio runtime.
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.discarded_bytes > 0 {
            warn!(
                "discarding {} bytes of torn or corrupt WAL tail in {}",
                replay.discarded_bytes,
                wal_path.display()
            );
        }
        let wal = Wal::open(&wal_path, replay.valid_len)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            write_gate: RwLock::new(()),
            catalog: Mutex::new(()),
        };
        for event in &replay.events {
            engine.apply_replayed(event);
        }
        info!(
            "replayed {} events: {} users, {} vehicles",
            replay.events.len(),
            engine.store.user_count(),
            engine.store.vehicle_count()
        );
        Ok(engine)
    }

    /// Replay owns every lock, so `try_write` never contends. Never block
    /// here: this may run inside an async context.
    fn apply_replayed(&self, event: &Event) {
        match event {
            Event::UserRegistered {
                email,
                name,
                password_hash,
            } => {
                self.store.insert_user(UserRecord {
                    email: email.clone(),
                    name: name.clone(),
                    password_hash: password_hash.clone(),
                });
            }
            Event::VehicleAdded {
                plate,
                model,
                hourly_rate,
            } => {
                let vs = VehicleState::new(plate.clone(), model.clone(), *hourly_rate);
                if !self.store.insert_vehicle(vs) {
                    warn!("replay: duplicate vehicle {plate}; keeping the first");
                }
            }
            Event::VehicleRemoved { plate } => {
                if let Some(shared) = self.store.get_vehicle(plate)
                    && let Ok(guard) = shared.try_write()
                {
                    self.store.remove_vehicle(&guard);
                }
            }
            Event::BookingConfirmed { plate, .. } | Event::BookingCancelled { plate, .. } => {
                let Some(shared) = self.store.get_vehicle(plate) else {
                    warn!("replay: booking event for unknown vehicle {plate}");
                    return;
                };
                if let Ok(mut guard) = shared.try_write()
                    && let Err(e) = self.store.apply_event(&mut guard, event)
                {
                    warn!("replay: skipping booking on {plate}: {e}");
                }
            }
        }
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append then apply to the locked vehicle.
    pub(super) async fn persist_and_apply(
        &self,
        vs: &mut VehicleState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(vs, event)?;
        metrics::gauge!(crate::observability::BOOKINGS_ACTIVE).set(self.store.booking_count() as f64);
        Ok(())
    }

    /// Lookup booking → vehicle, acquire the vehicle's write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        id: &ulid::Ulid,
    ) -> Result<(BookingRef, tokio::sync::OwnedRwLockWriteGuard<VehicleState>), EngineError> {
        let not_found = || EngineError::NotFound(id.to_string());
        let booking_ref = self.store.get_booking_ref(id).ok_or_else(not_found)?;
        let shared = self
            .store
            .get_vehicle(&booking_ref.plate)
            .ok_or_else(not_found)?;
        let guard = shared.write_owned().await;
        // Re-check under the lock: the booking may have been cancelled meanwhile.
        let booking_ref = self.store.get_booking_ref(id).ok_or_else(not_found)?;
        Ok((booking_ref, guard))
    }
}
