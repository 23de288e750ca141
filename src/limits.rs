use crate::model::Ms;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// One year.
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_VIN_LEN: usize = 17;
pub const MAX_LOCATION_LEN: usize = 64;
pub const MAX_VEHICLES: usize = 100_000;

/// Select + commit rounds per request: the first try plus one retry after a lost race.
pub const MAX_RESERVE_ATTEMPTS: usize = 2;
