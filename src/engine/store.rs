use async_trait::async_trait;
use ulid::Ulid;

use crate::model::*;

use super::{ensure_wal_file, FleetStore, StoreError};

/// Result of a conditional commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Reservation),
    /// Another reservation landed on the vehicle after it was selected.
    Conflict(Ulid),
    /// The vehicle is no longer on record.
    Missing,
}

/// Storage seam consumed by the reservation core.
#[async_trait]
pub trait VehicleStore: Send + Sync {
    /// Idempotently prepare the backing storage.
    async fn ensure_schema(&self) -> Result<(), StoreError>;

    /// First vehicle, by VIN, at `location` of `car_type` that is free for `span`.
    async fn query(
        &self,
        location: &str,
        car_type: CarType,
        span: Span,
    ) -> Result<Option<Vehicle>, StoreError>;

    /// Record a reservation on `vin` only if it is still free for `span`.
    async fn update_reservation(&self, vin: &Vin, span: Span) -> Result<CommitOutcome, StoreError>;

    async fn get_vehicle(&self, vin: &Vin) -> Result<Option<Vehicle>, StoreError>;

    /// The vehicle currently holding reservation `id`.
    async fn find_reservation(&self, id: Ulid) -> Result<Option<Vehicle>, StoreError>;
}

#[async_trait]
impl VehicleStore for FleetStore {
    async fn ensure_schema(&self) -> Result<(), StoreError> {
        ensure_wal_file(&self.wal_path)?;
        Ok(())
    }

    async fn query(
        &self,
        location: &str,
        car_type: CarType,
        span: Span,
    ) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.first_available(location, car_type, &span).await)
    }

    async fn update_reservation(&self, vin: &Vin, span: Span) -> Result<CommitOutcome, StoreError> {
        self.commit_reservation(vin, span).await
    }

    async fn get_vehicle(&self, vin: &Vin) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicle(vin).await)
    }

    async fn find_reservation(&self, id: Ulid) -> Result<Option<Vehicle>, StoreError> {
        Ok(self.vehicle_for_reservation(id).await)
    }
}
