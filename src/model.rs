use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;
use crate::reservation::ReserveError;

/// Unix milliseconds. The only time type.
pub type Ms = i64;

/// Reservation window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Whether `self`, an existing reservation, blocks `requested`.
    ///
    /// The existing window only stays clear of the request when it starts
    /// strictly after the request ends or ends strictly before it starts.
    /// Touching at either boundary is a conflict: the car needs servicing
    /// between consecutive rentals.
    pub fn conflicts_with(&self, requested: &Span) -> bool {
        !(self.start > requested.end || self.end < requested.start)
    }
}

/// Vehicle identification number. Primary key of the fleet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Vin(String);

impl Vin {
    pub fn parse(raw: &str) -> Result<Self, crate::engine::StoreError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_VIN_LEN
            && raw.chars().all(|c| c.is_ascii_alphanumeric());
        if !valid {
            return Err(crate::engine::StoreError::InvalidVin(raw.to_string()));
        }
        Ok(Self(raw.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Vin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Rental branches a vehicle can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoreName {
    Downtown,
    Airport,
    Harbor,
    University,
    Suburban,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CarType {
    Economy,
    Compact,
    Sedan,
    Suv,
    Luxury,
    Van,
}

/// A committed reservation. The id doubles as the customer's confirmation number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vehicle {
    pub vin: Vin,
    pub store: StoreName,
    pub location: String,
    pub car_type: CarType,
    /// `None` while unreserved. A new commit replaces the previous reservation.
    pub reservation: Option<Reservation>,
}

impl Vehicle {
    pub fn new(vin: Vin, store: StoreName, location: String, car_type: CarType) -> Self {
        Self {
            vin,
            store,
            location,
            car_type,
            reservation: None,
        }
    }

    /// Case-insensitive prefix match on the vehicle's location.
    pub fn is_at(&self, location: &str) -> bool {
        let loc = self.location.as_bytes();
        loc.len() >= location.len() && loc[..location.len()].eq_ignore_ascii_case(location.as_bytes())
    }

    /// Unreserved vehicles are always free; reserved ones are free only when
    /// the existing reservation does not conflict with `span`.
    pub fn is_free_for(&self, span: &Span) -> bool {
        match &self.reservation {
            None => true,
            Some(existing) => !existing.span.conflicts_with(span),
        }
    }

    pub fn matches(&self, location: &str, car_type: CarType, span: &Span) -> bool {
        self.car_type == car_type && self.is_at(location) && self.is_free_for(span)
    }
}

/// WAL record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    VehicleProvisioned {
        vin: Vin,
        store: StoreName,
        location: String,
        car_type: CarType,
    },
    ReservationCommitted {
        vin: Vin,
        reservation: Reservation,
    },
}

// ── Request / response types ─────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    location: String,
    car_type: CarType,
    span: Span,
}

impl ReservationRequest {
    /// Rejects windows where `start >= end` or outside the supported range,
    /// and empty or oversized locations.
    pub fn new(
        location: impl Into<String>,
        car_type: CarType,
        start: Ms,
        end: Ms,
    ) -> Result<Self, ReserveError> {
        let location = location.into();
        if start >= end {
            return Err(ReserveError::MalformedRequest("start must be before end"));
        }
        if start < MIN_VALID_TIMESTAMP_MS || end > MAX_VALID_TIMESTAMP_MS {
            return Err(ReserveError::MalformedRequest("timestamp out of range"));
        }
        if end - start > MAX_SPAN_DURATION_MS {
            return Err(ReserveError::MalformedRequest("reservation window too wide"));
        }
        if location.trim().is_empty() {
            return Err(ReserveError::MalformedRequest("location is empty"));
        }
        if location.len() > MAX_LOCATION_LEN {
            return Err(ReserveError::MalformedRequest("location too long"));
        }
        Ok(Self {
            location,
            car_type,
            span: Span::new(start, end),
        })
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn car_type(&self) -> CarType {
        self.car_type
    }

    pub fn span(&self) -> Span {
        self.span
    }
}

/// Outcome handed back to the caller. Either fully populated or fully empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    vin: String,
    store: Option<StoreName>,
    reservation_id: Option<Ulid>,
    success: bool,
}

impl ReservationResponse {
    pub fn reserved(vin: &Vin, store: StoreName, reservation_id: Ulid) -> Self {
        Self {
            vin: vin.to_string(),
            store: Some(store),
            reservation_id: Some(reservation_id),
            success: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            vin: String::new(),
            store: None,
            reservation_id: None,
            success: false,
        }
    }

    pub fn vin(&self) -> &str {
        &self.vin
    }

    pub fn store(&self) -> Option<StoreName> {
        self.store
    }

    pub fn reservation_id(&self) -> Option<Ulid> {
        self.reservation_id
    }

    pub fn is_success(&self) -> bool {
        self.success
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationDetails {
    pub reservation_id: Ulid,
    pub vin: Vin,
    pub store: StoreName,
    pub location: String,
    pub car_type: CarType,
    pub start: Ms,
    pub end: Ms,
}

impl ReservationDetails {
    pub(crate) fn from_vehicle(vehicle: &Vehicle, reservation: &Reservation) -> Self {
        Self {
            reservation_id: reservation.id,
            vin: vehicle.vin.clone(),
            store: vehicle.store,
            location: vehicle.location.clone(),
            car_type: vehicle.car_type,
            start: reservation.span.start,
            end: reservation.span.end,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn vin(raw: &str) -> Vin {
        Vin::parse(raw).unwrap()
    }

    #[test]
    fn touching_after_existing_end_conflicts() {
        // existing [10:00, 12:00), requested [12:00, 14:00)
        let existing = Span::new(10 * H, 12 * H);
        let requested = Span::new(12 * H, 14 * H);
        assert!(existing.conflicts_with(&requested));
    }

    #[test]
    fn touching_before_existing_start_conflicts() {
        let existing = Span::new(10, 20);
        let requested = Span::new(5, 10);
        assert!(existing.conflicts_with(&requested));
    }

    #[test]
    fn strictly_separated_does_not_conflict() {
        let existing = Span::new(10, 20);
        assert!(!existing.conflicts_with(&Span::new(21, 30)));
        assert!(!existing.conflicts_with(&Span::new(0, 9)));
    }

    #[test]
    fn overlap_and_containment_conflict() {
        let existing = Span::new(10, 20);
        assert!(existing.conflicts_with(&Span::new(15, 25)));
        assert!(existing.conflicts_with(&Span::new(5, 15)));
        assert!(existing.conflicts_with(&Span::new(12, 18)));
        assert!(existing.conflicts_with(&Span::new(0, 30)));
        assert!(existing.conflicts_with(&existing));
    }

    #[test]
    fn one_ms_gap_is_enough() {
        let existing = Span::new(10, 20);
        assert!(!existing.conflicts_with(&Span::new(21, 22)));
        assert!(existing.conflicts_with(&Span::new(20, 22)));
    }

    #[test]
    fn vin_validation() {
        assert_eq!(vin("1hgcm82633a004352").as_str(), "1HGCM82633A004352");
        assert!(Vin::parse("").is_err());
        assert!(Vin::parse("1HGCM82633A0043520").is_err()); // 18 chars
        assert!(Vin::parse("1HGCM-82633").is_err());
    }

    #[test]
    fn vin_orders_lexicographically() {
        assert!(vin("A1") < vin("A2"));
        assert!(vin("A2") < vin("B0"));
    }

    #[test]
    fn location_prefix_match() {
        let v = Vehicle::new(vin("V1"), StoreName::Downtown, "Downtown Seattle".into(), CarType::Sedan);
        assert!(v.is_at("Downtown"));
        assert!(v.is_at("downtown sea"));
        assert!(v.is_at("Downtown Seattle"));
        assert!(!v.is_at("Seattle"));
        assert!(!v.is_at("Downtown Seattle WA"));
    }

    #[test]
    fn unreserved_vehicle_is_free_for_any_window() {
        let v = Vehicle::new(vin("V1"), StoreName::Airport, "Airport".into(), CarType::Suv);
        assert!(v.is_free_for(&Span::new(0, 1)));
        assert!(v.is_free_for(&Span::new(-5 * H, 500 * H)));
    }

    #[test]
    fn matches_checks_every_filter() {
        let mut v = Vehicle::new(vin("V1"), StoreName::Airport, "Airport".into(), CarType::Suv);
        v.reservation = Some(Reservation {
            id: Ulid::new(),
            span: Span::new(10 * H, 12 * H),
        });
        assert!(v.matches("Air", CarType::Suv, &Span::new(13 * H, 14 * H)));
        assert!(!v.matches("Air", CarType::Van, &Span::new(13 * H, 14 * H)));
        assert!(!v.matches("Harbor", CarType::Suv, &Span::new(13 * H, 14 * H)));
        assert!(!v.matches("Air", CarType::Suv, &Span::new(12 * H, 14 * H)));
    }

    #[test]
    fn request_rejects_inverted_or_empty_window() {
        const MON: Ms = 1_767_571_200_000; // 2026-01-05T00:00:00Z
        let malformed = |r: Result<ReservationRequest, ReserveError>| {
            matches!(r, Err(ReserveError::MalformedRequest(_)))
        };
        assert!(malformed(ReservationRequest::new("Downtown", CarType::Sedan, MON + H, MON)));
        assert!(malformed(ReservationRequest::new("Downtown", CarType::Sedan, MON, MON)));
        assert!(malformed(ReservationRequest::new("  ", CarType::Sedan, MON, MON + H)));
        assert!(malformed(ReservationRequest::new("Downtown", CarType::Sedan, 10, 20)));
        assert!(malformed(ReservationRequest::new(
            "Downtown",
            CarType::Sedan,
            MON,
            MON + MAX_SPAN_DURATION_MS + 1
        )));

        let req = ReservationRequest::new("Downtown", CarType::Sedan, MON, MON + H).unwrap();
        assert_eq!(req.span(), Span::new(MON, MON + H));
        assert_eq!(req.location(), "Downtown");
        assert_eq!(req.car_type(), CarType::Sedan);
    }

    #[test]
    fn response_invariants() {
        let id = Ulid::new();
        let ok = ReservationResponse::reserved(&vin("V1"), StoreName::Harbor, id);
        assert!(ok.is_success());
        assert_eq!(ok.vin(), "V1");
        assert_eq!(ok.store(), Some(StoreName::Harbor));
        assert_eq!(ok.reservation_id(), Some(id));

        let none = ReservationResponse::unavailable();
        assert!(!none.is_success());
        assert_eq!(none.vin(), "");
        assert_eq!(none.store(), None);
        assert_eq!(none.reservation_id(), None);
    }

    #[test]
    fn response_serializes_camel_case() {
        let json = serde_json::to_value(ReservationResponse::unavailable()).unwrap();
        assert_eq!(json["vin"], "");
        assert!(json["store"].is_null());
        assert!(json["reservationId"].is_null());
        assert_eq!(json["success"], false);

        let ok = ReservationResponse::reserved(&vin("V1"), StoreName::University, Ulid::new());
        let json = serde_json::to_value(ok).unwrap();
        assert_eq!(json["store"], "UNIVERSITY");
        assert_eq!(json["success"], true);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCommitted {
            vin: vin("1HGCM82633A004352"),
            reservation: Reservation {
                id: Ulid::new(),
                span: Span::new(1_700_000_000_123, 1_700_000_007_456),
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
