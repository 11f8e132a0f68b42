use chrono::NaiveDate;
use ulid::Ulid;

use super::availability::{RoomAvailability, Unavailability, check_room};
use super::{Engine, EngineError};
use crate::limits;
use crate::model::{Booking, RoomInfo, Span};
use crate::time::{DAY_MS, day_bounds, now_ms, today_utc};

/// Filter for the general booking listing. Defaults select everything live,
/// newest first, one page.
#[derive(Debug, Clone)]
pub struct BookingFilter {
    pub room_id: Option<Ulid>,
    pub organizer_email: Option<String>,
    /// Keep bookings starting at or after this instant.
    pub from: Option<i64>,
    /// Keep bookings starting at or before this instant.
    pub until: Option<i64>,
    pub include_cancelled: bool,
    pub offset: usize,
    pub limit: usize,
}

impl Default for BookingFilter {
    fn default() -> Self {
        Self {
            room_id: None,
            organizer_email: None,
            from: None,
            until: None,
            include_cancelled: false,
            offset: 0,
            limit: 100,
        }
    }
}

impl BookingFilter {
    fn matches(&self, booking: &Booking) -> bool {
        if let Some(room_id) = self.room_id
            && booking.room_id != room_id
        {
            return false;
        }
        if let Some(email) = &self.organizer_email {
            let Some(candidate) = &booking.organizer_email else {
                return false;
            };
            if !candidate.eq_ignore_ascii_case(email) {
                return false;
            }
        }
        if let Some(from) = self.from
            && booking.span.start < from
        {
            return false;
        }
        if let Some(until) = self.until
            && booking.span.start > until
        {
            return false;
        }
        self.include_cancelled || !booking.is_cancelled()
    }
}

/// A booking starting exactly now still counts as upcoming; both window
/// endpoints are inclusive.
pub(super) fn within_upcoming_window(start: i64, now: i64, horizon: i64) -> bool {
    start >= now && start <= horizon
}

fn page<T>(items: Vec<T>, offset: usize, limit: usize) -> Vec<T> {
    let limit = limit.min(limits::MAX_PAGE_LIMIT);
    items.into_iter().skip(offset).take(limit).collect()
}

// ── Room queries ──────────────────────────────────────────────────

impl Engine {
    pub async fn get_room(&self, id: &Ulid) -> Result<RoomInfo, EngineError> {
        let room = self.room(id).ok_or(EngineError::NotFound(*id))?;
        let guard = room.read().await;
        Ok(guard.info())
    }

    /// Rooms in creation order.
    pub async fn list_rooms(
        &self,
        active_only: bool,
        offset: usize,
        limit: usize,
    ) -> Vec<RoomInfo> {
        let mut rooms = Vec::new();
        for id in self.room_ids_ordered() {
            let Some(room) = self.room(&id) else { continue };
            let guard = room.read().await;
            if active_only && !guard.active {
                continue;
            }
            rooms.push(guard.info());
        }
        page(rooms, offset, limit)
    }

    /// Availability verdict for one room and range. A missing room is a
    /// verdict here, not an error — callers probe ids they don't control.
    pub async fn check_availability(
        &self,
        room_id: &Ulid,
        span: Span,
        exclude: Option<Ulid>,
    ) -> RoomAvailability {
        let Some(room) = self.room(room_id) else {
            return RoomAvailability::unavailable(*room_id, span, Unavailability::RoomNotFound);
        };
        let guard = room.read().await;
        match check_room(&guard, &span, exclude) {
            Ok(()) => RoomAvailability::available(*room_id, span),
            Err(reason) => RoomAvailability::unavailable(*room_id, span, reason),
        }
    }

    /// All rooms that could take a booking over `span`, optionally requiring a
    /// minimum capacity. Creation order.
    pub async fn find_available_rooms(
        &self,
        span: Span,
        min_capacity: Option<u32>,
    ) -> Vec<RoomInfo> {
        let mut available = Vec::new();
        for id in self.room_ids_ordered() {
            let Some(room) = self.room(&id) else { continue };
            let guard = room.read().await;
            if let Some(min) = min_capacity
                && guard.capacity < min
            {
                continue;
            }
            if check_room(&guard, &span, None).is_ok() {
                available.push(guard.info());
            }
        }
        available
    }

    /// The room's live bookings starting on the given UTC day, chronological.
    /// Unknown rooms yield an empty schedule.
    pub async fn room_schedule(&self, room_id: &Ulid, date: NaiveDate) -> Vec<Booking> {
        let Some(room) = self.room(room_id) else {
            return Vec::new();
        };
        let day = day_bounds(date);
        let guard = room.read().await;
        guard
            .bookings
            .iter()
            .filter(|b| !b.is_cancelled() && day.contains_instant(b.span.start))
            .cloned()
            .collect()
    }
}

// ── Booking queries ───────────────────────────────────────────────

impl Engine {
    pub async fn get_booking(&self, id: &Ulid) -> Result<Booking, EngineError> {
        let room_id = self
            .room_for_booking(id)
            .ok_or(EngineError::NotFound(*id))?;
        let room = self.room(&room_id).ok_or(EngineError::NotFound(*id))?;
        let guard = room.read().await;
        guard.booking(*id).cloned().ok_or(EngineError::NotFound(*id))
    }

    /// Filtered listing, newest start first.
    pub async fn list_bookings(&self, filter: &BookingFilter) -> Vec<Booking> {
        let mut bookings = self.collect_bookings(|b| filter.matches(b)).await;
        bookings.sort_by(|a, b| b.span.start.cmp(&a.span.start).then(a.id.cmp(&b.id)));
        page(bookings, filter.offset, filter.limit)
    }

    /// Live bookings starting within the next `days` days, chronological.
    pub async fn upcoming_bookings(&self, days: u32) -> Vec<Booking> {
        let now = now_ms();
        let horizon = now + i64::from(days) * DAY_MS;
        let mut bookings = self
            .collect_bookings(|b| {
                !b.is_cancelled() && within_upcoming_window(b.span.start, now, horizon)
            })
            .await;
        bookings.sort_by_key(|b| b.span.start);
        bookings
    }

    /// Live bookings starting today (UTC), chronological.
    pub async fn today_bookings(&self) -> Vec<Booking> {
        let day = day_bounds(today_utc());
        let mut bookings = self
            .collect_bookings(|b| !b.is_cancelled() && day.contains_instant(b.span.start))
            .await;
        bookings.sort_by_key(|b| b.span.start);
        bookings
    }

    /// Live bookings organized under the given email, newest start first.
    pub async fn my_bookings(&self, email: &str) -> Vec<Booking> {
        let mut bookings = self
            .collect_bookings(|b| {
                !b.is_cancelled()
                    && b.organizer_email
                        .as_deref()
                        .is_some_and(|e| e.eq_ignore_ascii_case(email))
            })
            .await;
        bookings.sort_by(|a, b| b.span.start.cmp(&a.span.start));
        bookings
    }

    /// Case-insensitive substring search over title, organizer name, and
    /// description. Cancelled bookings never match. Chronological.
    pub async fn search_bookings(&self, term: &str) -> Vec<Booking> {
        let needle = term.to_lowercase();
        if needle.is_empty() {
            return Vec::new();
        }
        let mut bookings = self
            .collect_bookings(|b| {
                !b.is_cancelled()
                    && (b.title.to_lowercase().contains(&needle)
                        || b.organizer_name.to_lowercase().contains(&needle)
                        || b.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(&needle)))
            })
            .await;
        bookings.sort_by_key(|b| b.span.start);
        bookings
    }

    async fn collect_bookings(&self, keep: impl Fn(&Booking) -> bool) -> Vec<Booking> {
        let mut bookings = Vec::new();
        for id in self.room_ids_ordered() {
            let Some(room) = self.room(&id) else { continue };
            let guard = room.read().await;
            bookings.extend(guard.bookings.iter().filter(|b| keep(b)).cloned());
        }
        bookings
    }
}
