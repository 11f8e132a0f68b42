use chrono::NaiveTime;
use ulid::Ulid;

use crate::model::{Booking, RoomState, Span};
use crate::time::time_of_day;

// ── Availability check ────────────────────────────────────────────

/// Why a room cannot take a proposed booking. Structured so the presentation
/// boundary decides the wording; `Display` gives the default text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailability {
    RoomNotFound,
    RoomInactive,
    OutsideOperatingHours {
        opens_at: NaiveTime,
        closes_at: NaiveTime,
    },
    Overlap {
        booking_id: Ulid,
        title: String,
        span: Span,
    },
}

impl std::fmt::Display for Unavailability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailability::RoomNotFound => write!(f, "room not found"),
            Unavailability::RoomInactive => write!(f, "room unavailable"),
            Unavailability::OutsideOperatingHours {
                opens_at,
                closes_at,
            } => {
                write!(
                    f,
                    "outside operating hours ({} - {})",
                    opens_at.format("%H:%M"),
                    closes_at.format("%H:%M")
                )
            }
            Unavailability::Overlap { title, span, .. } => {
                write!(
                    f,
                    "already booked: {title} ({}-{})",
                    time_of_day(span.start).format("%H:%M"),
                    time_of_day(span.end).format("%H:%M")
                )
            }
        }
    }
}

/// Availability verdict for one room and time range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomAvailability {
    pub room_id: Ulid,
    pub span: Span,
    pub available: bool,
    pub reason: Option<Unavailability>,
}

impl RoomAvailability {
    pub fn available(room_id: Ulid, span: Span) -> Self {
        Self {
            room_id,
            span,
            available: true,
            reason: None,
        }
    }

    pub fn unavailable(room_id: Ulid, span: Span, reason: Unavailability) -> Self {
        Self {
            room_id,
            span,
            available: false,
            reason: Some(reason),
        }
    }
}

/// Decide whether `span` can be booked on this room, short-circuiting on the
/// first failing rule. The order is fixed: inactive room, then operating
/// hours, then overlap — hours violations must be reported before conflicts
/// so callers get the most actionable reason. Room existence is the caller's
/// first step; by the time a `RoomState` is in hand the room exists.
pub fn check_room(
    room: &RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Result<(), Unavailability> {
    if !room.active {
        return Err(Unavailability::RoomInactive);
    }

    let starts = time_of_day(span.start);
    let ends = time_of_day(span.end);
    if starts < room.opens_at || ends > room.closes_at {
        return Err(Unavailability::OutsideOperatingHours {
            opens_at: room.opens_at,
            closes_at: room.closes_at,
        });
    }

    if let Some(existing) = conflicting_booking(room, span, exclude) {
        return Err(Unavailability::Overlap {
            booking_id: existing.id,
            title: existing.title.clone(),
            span: existing.span,
        });
    }

    Ok(())
}

/// First non-cancelled booking overlapping `span`, skipping `exclude` (the
/// booking being edited, when re-checking its own new range).
pub fn conflicting_booking<'a>(
    room: &'a RoomState,
    span: &Span,
    exclude: Option<Ulid>,
) -> Option<&'a Booking> {
    room.overlapping(span)
        .find(|b| !b.is_cancelled() && Some(b.id) != exclude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use proptest::prelude::*;

    use crate::model::{Cancellation, Ms, NewRoom};
    use crate::time::at;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 2).unwrap()
    }

    fn ts(h: u32, m: u32) -> Ms {
        at(day(), t(h, m))
    }

    fn make_room(opens: NaiveTime, closes: NaiveTime) -> RoomState {
        RoomState::new(
            Ulid::new(),
            NewRoom {
                name: "Boardroom".into(),
                capacity: 6,
                location: None,
                description: None,
                opens_at: opens,
                closes_at: closes,
            },
            0,
        )
    }

    fn booking(room: &RoomState, start: Ms, end: Ms) -> Booking {
        Booking {
            id: Ulid::new(),
            room_id: room.id,
            title: "sync".into(),
            organizer_name: "Alex".into(),
            organizer_email: None,
            participants: 2,
            span: Span::new(start, end),
            description: None,
            notes: None,
            cancellation: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn empty_room_inside_hours_is_available() {
        let room = make_room(t(8, 0), t(18, 0));
        let span = Span::new(ts(9, 0), ts(10, 0));
        assert_eq!(check_room(&room, &span, None), Ok(()));
    }

    #[test]
    fn inactive_room_reported_first() {
        // Inactive AND outside hours AND overlapping: inactive wins.
        let mut room = make_room(t(8, 0), t(18, 0));
        let b = booking(&room, ts(6, 0), ts(7, 30));
        room.insert_booking(b);
        room.active = false;
        let span = Span::new(ts(6, 0), ts(7, 0));
        assert_eq!(check_room(&room, &span, None), Err(Unavailability::RoomInactive));
    }

    #[test]
    fn hours_violation_reported_before_overlap() {
        let mut room = make_room(t(8, 0), t(18, 0));
        let b = booking(&room, ts(7, 0), ts(9, 0));
        room.insert_booking(b);
        // [07:00, 08:30) both starts too early and overlaps the existing booking
        let span = Span::new(ts(7, 0), ts(8, 30));
        assert!(matches!(
            check_room(&room, &span, None),
            Err(Unavailability::OutsideOperatingHours { .. })
        ));
    }

    #[test]
    fn start_before_opening_rejected() {
        let room = make_room(t(8, 0), t(18, 0));
        let span = Span::new(ts(7, 59), ts(9, 0));
        assert!(matches!(
            check_room(&room, &span, None),
            Err(Unavailability::OutsideOperatingHours { opens_at, .. }) if opens_at == t(8, 0)
        ));
    }

    #[test]
    fn end_after_closing_rejected() {
        let room = make_room(t(8, 0), t(18, 0));
        let span = Span::new(ts(17, 0), ts(18, 1));
        assert!(matches!(
            check_room(&room, &span, None),
            Err(Unavailability::OutsideOperatingHours { .. })
        ));
    }

    #[test]
    fn exact_operating_window_allowed() {
        let room = make_room(t(8, 0), t(18, 0));
        let span = Span::new(ts(8, 0), ts(18, 0));
        assert_eq!(check_room(&room, &span, None), Ok(()));
    }

    #[test]
    fn overlap_names_the_conflicting_booking() {
        let mut room = make_room(t(8, 0), t(18, 0));
        let b = booking(&room, ts(9, 0), ts(10, 0));
        let bid = b.id;
        room.insert_booking(b);
        let span = Span::new(ts(9, 30), ts(10, 30));
        match check_room(&room, &span, None) {
            Err(Unavailability::Overlap {
                booking_id, title, ..
            }) => {
                assert_eq!(booking_id, bid);
                assert_eq!(title, "sync");
            }
            other => panic!("expected overlap, got {other:?}"),
        }
    }

    #[test]
    fn touching_bookings_do_not_conflict() {
        let mut room = make_room(t(8, 0), t(18, 0));
        room.insert_booking(booking(&room, ts(9, 0), ts(10, 0)));
        let span = Span::new(ts(10, 0), ts(11, 0));
        assert_eq!(check_room(&room, &span, None), Ok(()));
    }

    #[test]
    fn cancelled_booking_never_blocks() {
        let mut room = make_room(t(8, 0), t(18, 0));
        let mut b = booking(&room, ts(9, 0), ts(10, 0));
        b.cancellation = Some(Cancellation {
            at: ts(8, 30),
            reason: Some("no longer needed".into()),
        });
        room.insert_booking(b);
        let span = Span::new(ts(9, 0), ts(10, 0));
        assert_eq!(check_room(&room, &span, None), Ok(()));
    }

    #[test]
    fn excluded_booking_skipped_when_rechecking() {
        let mut room = make_room(t(8, 0), t(18, 0));
        let b = booking(&room, ts(9, 0), ts(10, 0));
        let own_id = b.id;
        room.insert_booking(b);
        // Re-checking the booking's own (extended) range must skip itself...
        let span = Span::new(ts(9, 0), ts(10, 30));
        assert_eq!(check_room(&room, &span, Some(own_id)), Ok(()));
        // ...but still catch other bookings.
        room.insert_booking(booking(&room, ts(10, 15), ts(11, 0)));
        assert!(matches!(
            check_room(&room, &span, Some(own_id)),
            Err(Unavailability::Overlap { .. })
        ));
    }

    proptest! {
        #[test]
        fn overlap_is_symmetric(
            a_start in 0i64..1_000_000,
            a_len in 1i64..100_000,
            b_start in 0i64..1_000_000,
            b_len in 1i64..100_000,
        ) {
            let a = Span::new(a_start, a_start + a_len);
            let b = Span::new(b_start, b_start + b_len);
            prop_assert_eq!(a.overlaps(&b), b.overlaps(&a));
        }

        #[test]
        fn touching_spans_never_overlap(
            start in 0i64..1_000_000,
            left_len in 1i64..100_000,
            right_len in 1i64..100_000,
        ) {
            let left = Span::new(start, start + left_len);
            let right = Span::new(start + left_len, start + left_len + right_len);
            prop_assert!(!left.overlaps(&right));
            prop_assert!(!right.overlaps(&left));
        }

        #[test]
        fn disjoint_iff_no_overlap(
            a_start in 0i64..1_000_000,
            a_len in 1i64..100_000,
            b_start in 0i64..1_000_000,
            b_len in 1i64..100_000,
        ) {
            let a = Span::new(a_start, a_start + a_len);
            let b = Span::new(b_start, b_start + b_len);
            let disjoint = a.end <= b.start || b.end <= a.start;
            prop_assert_eq!(disjoint, !a.overlaps(&b));
        }
    }
}
