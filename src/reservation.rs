use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::engine::{CommitOutcome, StoreError, VehicleStore};
use crate::limits::MAX_RESERVE_ATTEMPTS;
use crate::model::*;
use crate::observability;

#[derive(Debug, Error)]
pub enum ReserveError {
    /// Rejected before the store was consulted.
    #[error("malformed request: {0}")]
    MalformedRequest(&'static str),
    /// The store failed; never reported as "no vehicle available".
    #[error("store failure: {0}")]
    StoreUnavailable(StoreError),
}

impl From<StoreError> for ReserveError {
    /// Only a failing log is an outage. Everything else the store rejects is
    /// a bad argument.
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Unavailable(_) => ReserveError::StoreUnavailable(e),
            StoreError::LimitExceeded(reason) => ReserveError::MalformedRequest(reason),
            StoreError::InvalidVin(_) => ReserveError::MalformedRequest("invalid VIN"),
            StoreError::AlreadyExists(_) => {
                ReserveError::MalformedRequest("vehicle already provisioned")
            }
        }
    }
}

/// Picks a candidate vehicle for a request.
#[async_trait]
pub trait Selector: Send + Sync {
    async fn select(&self, request: &ReservationRequest) -> Result<Option<Vehicle>, ReserveError>;
}

/// Asks the store for the lowest-VIN vehicle that matches the request.
pub struct StoreSelector<S> {
    store: Arc<S>,
}

impl<S> StoreSelector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: VehicleStore> Selector for StoreSelector<S> {
    async fn select(&self, request: &ReservationRequest) -> Result<Option<Vehicle>, ReserveError> {
        let candidate = self
            .store
            .query(request.location(), request.car_type(), request.span())
            .await?;
        Ok(candidate)
    }
}

/// Moves a selected vehicle into the reserved state via the store's
/// conditional update.
pub struct Committer<S> {
    store: Arc<S>,
}

impl<S: VehicleStore> Committer<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub async fn commit(&self, vin: &Vin, span: Span) -> Result<CommitOutcome, ReserveError> {
        Ok(self.store.update_reservation(vin, span).await?)
    }
}

/// Select-then-commit, one logical transaction per request.
pub struct ReservationService<S, L = StoreSelector<S>> {
    store: Arc<S>,
    selector: L,
    committer: Committer<S>,
}

impl<S: VehicleStore> ReservationService<S> {
    pub fn new(store: Arc<S>) -> Self {
        let selector = StoreSelector::new(store.clone());
        Self::with_selector(store, selector)
    }
}

impl<S: VehicleStore, L: Selector> ReservationService<S, L> {
    pub fn with_selector(store: Arc<S>, selector: L) -> Self {
        Self {
            committer: Committer::new(store.clone()),
            store,
            selector,
        }
    }

    /// Reserve one vehicle for `request`.
    ///
    /// A commit that loses a race is retried once with a fresh selection;
    /// after that the request is answered as unavailable. Store failures
    /// come back as `Err`.
    ///
    /// A vehicle holds one reservation at a time. Booking a window that does
    /// not conflict with the current one replaces it, and the replaced
    /// reservation's id stops resolving in [`lookup`](Self::lookup).
    pub async fn reserve(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationResponse, ReserveError> {
        let started = Instant::now();
        let result = self.select_and_commit(request).await;

        let outcome = match &result {
            Ok(response) if response.is_success() => "reserved",
            Ok(_) => "unavailable",
            Err(_) => "error",
        };
        metrics::counter!(observability::RESERVATIONS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(observability::RESERVE_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            warn!(
                "reservation for {:?} at {:?} failed: {e}",
                request.car_type(),
                request.location()
            );
        }
        result
    }

    async fn select_and_commit(
        &self,
        request: &ReservationRequest,
    ) -> Result<ReservationResponse, ReserveError> {
        let span = request.span();
        for attempt in 1..=MAX_RESERVE_ATTEMPTS {
            let Some(candidate) = self.selector.select(request).await? else {
                debug!(
                    "no {:?} free at {:?} for [{}, {})",
                    request.car_type(),
                    request.location(),
                    span.start,
                    span.end
                );
                return Ok(ReservationResponse::unavailable());
            };

            match self.committer.commit(&candidate.vin, span).await? {
                CommitOutcome::Committed(reservation) => {
                    info!("reserved {} as {}", candidate.vin, reservation.id);
                    return Ok(ReservationResponse::reserved(
                        &candidate.vin,
                        candidate.store,
                        reservation.id,
                    ));
                }
                CommitOutcome::Conflict(blocking) => {
                    metrics::counter!(observability::COMMIT_CONFLICTS_TOTAL).increment(1);
                    debug!(
                        "attempt {attempt}: {} was taken by {blocking} before commit",
                        candidate.vin
                    );
                }
                CommitOutcome::Missing => {
                    debug!("attempt {attempt}: {} vanished before commit", candidate.vin);
                }
            }
        }
        Ok(ReservationResponse::unavailable())
    }

    /// Details of a live reservation.
    ///
    /// Confirmation ids expire: once a later booking replaces the reservation
    /// on its vehicle, the old id resolves to `None`.
    pub async fn lookup(&self, id: Ulid) -> Result<Option<ReservationDetails>, ReserveError> {
        let Some(vehicle) = self.store.find_reservation(id).await? else {
            return Ok(None);
        };
        Ok(vehicle
            .reservation
            .filter(|r| r.id == id)
            .map(|r| ReservationDetails::from_vehicle(&vehicle, &r)))
    }
}
