use crate::model::Ms;

pub const MAX_VEHICLES: usize = 100_000;
pub const MAX_USERS: usize = 1_000_000;
pub const MAX_BOOKINGS_PER_VEHICLE: usize = 100_000;

pub const MAX_PLATE_LEN: usize = 16;
pub const MAX_MODEL_LEN: usize = 128;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 128;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 1024;

/// 2000-01-01T00:00:00Z
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
/// 2100-01-01T00:00:00Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;
/// A single rental may last at most a year.
pub const MAX_BOOKING_DURATION_MS: Ms = 366 * 24 * 3_600_000;

/// Upper bound on one encoded WAL record. Real events stay far below it; a
/// larger length prefix can only come from a corrupt tail.
pub const MAX_EVENT_LEN: usize = 1 << 20;
