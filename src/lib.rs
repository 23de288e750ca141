//! Car-rental inventory reservations.
//!
//! A [`ReservationService`] finds one vehicle matching a location, car type
//! and time window, and reserves it with a conditional commit so two
//! customers can never hold the same car for conflicting windows.
//!
//! ```no_run
//! use std::sync::Arc;
//! use car_reservations::{CarType, Config, FleetStore, ReservationRequest, ReservationService};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env();
//! car_reservations::observability::init_tracing();
//! car_reservations::observability::init_metrics(config.metrics_port)?;
//!
//! let store = Arc::new(FleetStore::open(config.wal_path())?);
//! let compactor = car_reservations::maintenance::spawn_compactor(store.clone(), &config);
//! let service = ReservationService::new(store);
//!
//! let request = ReservationRequest::new("Downtown", CarType::Sedan, 1_767_603_600_000, 1_767_610_800_000)?;
//! let response = service.reserve(&request).await?;
//! println!("reserved: {}", response.is_success());
//!
//! compactor.abort();
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod engine;
pub mod limits;
pub mod maintenance;
pub mod model;
pub mod observability;
pub mod reservation;
pub mod wal;

pub use config::Config;
pub use engine::{CommitOutcome, FleetStore, StoreError, VehicleStore};
pub use model::{
    CarType, Ms, Reservation, ReservationDetails, ReservationRequest, ReservationResponse, Span,
    StoreName, Vehicle, Vin,
};
pub use reservation::{Committer, ReservationService, ReserveError, Selector, StoreSelector};
