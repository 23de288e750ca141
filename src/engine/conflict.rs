use crate::model::*;

use super::StoreError;

pub(crate) fn validate_span(span: &Span) -> Result<(), StoreError> {
    use crate::limits::*;
    if span.start >= span.end {
        return Err(StoreError::LimitExceeded("span start must be before end"));
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(StoreError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(StoreError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Commit-time re-check. Returns the reservation that blocks `span`, if any.
pub(crate) fn blocking_reservation(vehicle: &Vehicle, span: &Span) -> Option<Reservation> {
    vehicle
        .reservation
        .filter(|existing| existing.span.conflicts_with(span))
}
