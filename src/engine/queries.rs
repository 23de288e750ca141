use ulid::Ulid;

use crate::model::*;

use super::FleetStore;

impl FleetStore {
    /// Walk the fleet in VIN order and return the first vehicle that matches.
    /// Each record is read under its own lock and released before the next,
    /// so the answer is a hint: the commit re-checks it.
    pub async fn first_available(
        &self,
        location: &str,
        car_type: CarType,
        span: &Span,
    ) -> Option<Vehicle> {
        for (_, shared) in self.handles_by_vin() {
            let guard = shared.read().await;
            if guard.matches(location, car_type, span) {
                return Some(guard.clone());
            }
        }
        None
    }

    pub async fn vehicle(&self, vin: &Vin) -> Option<Vehicle> {
        let shared = self.get_shared(vin)?;
        let guard = shared.read().await;
        Some(guard.clone())
    }

    pub async fn vehicle_for_reservation(&self, id: Ulid) -> Option<Vehicle> {
        let vin = self.reservations.get(&id).map(|e| e.value().clone())?;
        let vehicle = self.vehicle(&vin).await?;
        // The index can trail a replacement by a moment; trust the record.
        vehicle
            .reservation
            .is_some_and(|r| r.id == id)
            .then_some(vehicle)
    }

    pub async fn list_vehicles(&self) -> Vec<Vehicle> {
        let mut vehicles = Vec::with_capacity(self.vehicles.len());
        for (_, shared) in self.handles_by_vin() {
            vehicles.push(shared.read().await.clone());
        }
        vehicles
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }
}
