mod conflict;
mod error;
mod mutations;
mod queries;
mod store;

pub use error::StoreError;
pub use store::{CommitOutcome, VehicleStore};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tracing::{error, info};
use ulid::Ulid;

use crate::model::*;
use crate::wal::Wal;

pub type SharedVehicle = Arc<RwLock<Vehicle>>;

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

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders with the batch result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                flush_and_respond(&mut wal, &mut batch);
                if let Some(other) = pending {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    for (_, tx) in batch.drain(..) {
        let r = match &result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    let err = match append_err {
        Some(e) => e,
        None => match wal.flush_sync() {
            Ok(()) => return Ok(()),
            Err(e) => e,
        },
    };
    // Every sender in the batch gets Err, so none of it may reach the log
    // through a later flush.
    if let Err(discard_err) = wal.discard_unflushed() {
        error!("failed to discard unflushed WAL batch: {discard_err}");
    }
    Err(err)
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
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The vehicle record store: every vehicle behind its own lock, every change
/// logged to the WAL before it is applied.
pub struct FleetStore {
    pub(super) vehicles: DashMap<Vin, SharedVehicle>,
    /// Reverse lookup: reservation id → vehicle holding it.
    pub(super) reservations: DashMap<Ulid, Vin>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub(super) wal_path: PathBuf,
    /// Writers hold it shared; compaction holds it exclusively so that no
    /// append can land between the snapshot and the file swap.
    pub(super) write_gate: RwLock<()>,
    /// Serializes provisioning so a VIN can't be registered twice.
    pub(super) provisioning: Mutex<()>,
}

/// Apply an event to a vehicle record (caller holds the lock).
fn apply_to_vehicle(vehicle: &mut Vehicle, event: &Event, index: &DashMap<Ulid, Vin>) {
    match event {
        Event::ReservationCommitted { vin, reservation } => {
            if let Some(previous) = vehicle.reservation.replace(*reservation) {
                index.remove(&previous.id);
            }
            index.insert(reservation.id, vin.clone());
        }
        // Provisioning is handled at the map level, not here
        Event::VehicleProvisioned { .. } => {}
    }
}

impl FleetStore {
    /// Open the store at `wal_path`, replaying whatever the log holds.
    /// Must be called inside a tokio runtime: the WAL writer is spawned here.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        ensure_wal_file(&wal_path)?;
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = Self {
            vehicles: DashMap::new(),
            reservations: DashMap::new(),
            wal_tx,
            wal_path,
            write_gate: RwLock::new(()),
            provisioning: Mutex::new(()),
        };

        // Replay: we are the sole owner of these Arcs, so try_write always
        // succeeds. Never use blocking_write here: we may be inside a runtime.
        for event in &events {
            match event {
                Event::VehicleProvisioned { vin, store: name, location, car_type } => {
                    let vehicle = Vehicle::new(vin.clone(), *name, location.clone(), *car_type);
                    store.vehicles.insert(vin.clone(), Arc::new(RwLock::new(vehicle)));
                }
                Event::ReservationCommitted { vin, .. } => {
                    if let Some(shared) = store.get_shared(vin)
                        && let Ok(mut guard) = shared.try_write()
                    {
                        apply_to_vehicle(&mut guard, event, &store.reservations);
                    }
                }
            }
        }

        metrics::gauge!(crate::observability::FLEET_SIZE).set(store.vehicles.len() as f64);
        info!(
            "fleet store opened at {}: replayed {} events, {} vehicles",
            store.wal_path.display(),
            events.len(),
            store.vehicles.len()
        );
        Ok(store)
    }

    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    pub(super) fn get_shared(&self, vin: &Vin) -> Option<SharedVehicle> {
        self.vehicles.get(vin).map(|e| e.value().clone())
    }

    /// Snapshot of every vehicle handle, ordered by VIN. DashMap refs are
    /// dropped before returning so callers may await on the locks.
    pub(super) fn handles_by_vin(&self) -> Vec<(Vin, SharedVehicle)> {
        let mut handles: Vec<(Vin, SharedVehicle)> = self
            .vehicles
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));
        handles
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), StoreError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))?
            .map_err(StoreError::from)
    }

    /// WAL-append, then apply. The record is untouched if the append fails.
    pub(super) async fn persist_and_apply(
        &self,
        vehicle: &mut Vehicle,
        event: &Event,
    ) -> Result<(), StoreError> {
        self.wal_append(event).await?;
        apply_to_vehicle(vehicle, event, &self.reservations);
        Ok(())
    }
}

/// Create the WAL's directory and an empty log if either is missing.
pub(super) fn ensure_wal_file(path: &Path) -> io::Result<()> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(())
}
