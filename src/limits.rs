//! Hard input limits, checked before any mutation.

use crate::model::Ms;

pub const MAX_ROOMS: usize = 10_000;
pub const MAX_BOOKINGS_PER_ROOM: usize = 100_000;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_TITLE_LEN: usize = 300;
pub const MAX_ORGANIZER_LEN: usize = 100;
pub const MAX_EMAIL_LEN: usize = 100;
/// Description, notes, cancellation reason.
pub const MAX_TEXT_LEN: usize = 10_000;

/// Largest page a listing query will return.
pub const MAX_PAGE_LIMIT: usize = 1_000;

/// 1970-01-01 — bookings before the epoch are rejected.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// Year 10000.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_800_000;
/// A single booking may span at most 30 days.
pub const MAX_SPAN_DURATION_MS: Ms = 30 * 24 * 3_600_000;
