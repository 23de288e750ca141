use std::sync::Arc;

use tokio::sync::{oneshot, RwLock};
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{blocking_reservation, validate_span};
use super::{CommitOutcome, FleetStore, StoreError, WalCommand};

impl FleetStore {
    /// Register a vehicle with the fleet, unreserved.
    pub async fn provision_vehicle(
        &self,
        vin: Vin,
        store: StoreName,
        location: String,
        car_type: CarType,
    ) -> Result<(), StoreError> {
        if location.trim().is_empty() {
            return Err(StoreError::LimitExceeded("location is empty"));
        }
        if location.len() > MAX_LOCATION_LEN {
            return Err(StoreError::LimitExceeded("location too long"));
        }

        let _serial = self.provisioning.lock().await;
        if self.vehicles.len() >= MAX_VEHICLES {
            return Err(StoreError::LimitExceeded("too many vehicles"));
        }
        if self.vehicles.contains_key(&vin) {
            return Err(StoreError::AlreadyExists(vin));
        }

        let event = Event::VehicleProvisioned {
            vin: vin.clone(),
            store,
            location: location.clone(),
            car_type,
        };
        let _gate = self.write_gate.read().await;
        self.wal_append(&event).await?;
        let vehicle = Vehicle::new(vin.clone(), store, location, car_type);
        self.vehicles.insert(vin.clone(), Arc::new(RwLock::new(vehicle)));
        metrics::gauge!(crate::observability::FLEET_SIZE).set(self.vehicles.len() as f64);
        debug!("provisioned vehicle {vin}");
        Ok(())
    }

    /// Conditional update: under the vehicle's write lock, re-check that the
    /// stored reservation (if any) leaves `span` free, then log and apply.
    pub async fn commit_reservation(
        &self,
        vin: &Vin,
        span: Span,
    ) -> Result<CommitOutcome, StoreError> {
        validate_span(&span)?;
        let Some(shared) = self.get_shared(vin) else {
            return Ok(CommitOutcome::Missing);
        };

        let _gate = self.write_gate.read().await;
        let mut guard = shared.write().await;
        if let Some(existing) = blocking_reservation(&guard, &span) {
            debug!("commit on {vin} lost to reservation {}", existing.id);
            return Ok(CommitOutcome::Conflict(existing.id));
        }

        let reservation = Reservation {
            id: Ulid::new(),
            span,
        };
        let event = Event::ReservationCommitted {
            vin: vin.clone(),
            reservation,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        debug!(
            "reserved {vin} [{}, {}) as {}",
            span.start, span.end, reservation.id
        );
        Ok(CommitOutcome::Committed(reservation))
    }

    /// Compact the WAL down to the events needed to recreate the current fleet.
    pub async fn compact_wal(&self) -> Result<(), StoreError> {
        let _gate = self.write_gate.write().await;

        let handles = self.handles_by_vin();
        let mut events = Vec::with_capacity(handles.len() * 2);
        for (_, shared) in handles {
            let vehicle = shared.read().await;
            events.push(Event::VehicleProvisioned {
                vin: vehicle.vin.clone(),
                store: vehicle.store,
                location: vehicle.location.clone(),
                car_type: vehicle.car_type,
            });
            if let Some(reservation) = vehicle.reservation {
                events.push(Event::ReservationCommitted {
                    vin: vehicle.vin.clone(),
                    reservation,
                });
            }
        }
        let count = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| StoreError::Unavailable("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| StoreError::Unavailable("WAL writer dropped response".into()))??;

        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
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
