use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC — the only timestamp type.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
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

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }
}

/// Terminal cancellation record. Set exactly once, never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub at: Ms,
    pub reason: Option<String>,
}

/// A booking against a room. Cancelled bookings stay in the room state as
/// historical records; only `cancellation` distinguishes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Ulid,
    pub room_id: Ulid,
    pub title: String,
    pub organizer_name: String,
    pub organizer_email: Option<String>,
    pub participants: u32,
    pub span: Span,
    pub description: Option<String>,
    pub notes: Option<String>,
    pub cancellation: Option<Cancellation>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Booking {
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_some()
    }
}

/// Input for creating a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewRoom {
    pub name: String,
    pub capacity: u32,
    pub location: Option<String>,
    pub description: Option<String>,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
}

/// Input for creating a booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub room_id: Ulid,
    pub title: String,
    pub organizer_name: String,
    pub organizer_email: Option<String>,
    pub participants: u32,
    pub span: Span,
    pub description: Option<String>,
    pub notes: Option<String>,
}

/// Partial room update: a supplied field overwrites, an absent one is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomPatch {
    pub name: Option<String>,
    pub capacity: Option<u32>,
    pub location: Option<String>,
    pub description: Option<String>,
    pub opens_at: Option<NaiveTime>,
    pub closes_at: Option<NaiveTime>,
    pub active: Option<bool>,
}

impl RoomPatch {
    pub fn apply(&self, room: &mut RoomState) {
        if let Some(name) = &self.name {
            room.name = name.clone();
        }
        if let Some(capacity) = self.capacity {
            room.capacity = capacity;
        }
        if let Some(location) = &self.location {
            room.location = Some(location.clone());
        }
        if let Some(description) = &self.description {
            room.description = Some(description.clone());
        }
        if let Some(opens_at) = self.opens_at {
            room.opens_at = opens_at;
        }
        if let Some(closes_at) = self.closes_at {
            room.closes_at = closes_at;
        }
        if let Some(active) = self.active {
            room.active = active;
        }
    }
}

/// Partial booking update, same merge rules as `RoomPatch`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingPatch {
    pub title: Option<String>,
    pub organizer_name: Option<String>,
    pub organizer_email: Option<String>,
    pub participants: Option<u32>,
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    pub description: Option<String>,
    pub notes: Option<String>,
}

impl BookingPatch {
    pub fn changes_span(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Effective time range after the patch: changed side or existing value.
    pub fn merged_span(&self, current: &Span) -> Span {
        Span {
            start: self.start.unwrap_or(current.start),
            end: self.end.unwrap_or(current.end),
        }
    }

    pub fn apply(&self, booking: &mut Booking) {
        if let Some(title) = &self.title {
            booking.title = title.clone();
        }
        if let Some(organizer_name) = &self.organizer_name {
            booking.organizer_name = organizer_name.clone();
        }
        if let Some(organizer_email) = &self.organizer_email {
            booking.organizer_email = Some(organizer_email.clone());
        }
        if let Some(participants) = self.participants {
            booking.participants = participants;
        }
        if self.changes_span() {
            booking.span = self.merged_span(&booking.span);
        }
        if let Some(description) = &self.description {
            booking.description = Some(description.clone());
        }
        if let Some(notes) = &self.notes {
            booking.notes = Some(notes.clone());
        }
    }
}

/// A room plus its bookings, sorted by `span.start`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub name: String,
    /// Max participant count, not max concurrent bookings.
    pub capacity: u32,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Operating window: a booking's start and end times of day must fall
    /// within [opens_at, closes_at].
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub active: bool,
    pub created_at: Ms,
    pub bookings: Vec<Booking>,
}

impl RoomState {
    pub fn new(id: Ulid, room: NewRoom, created_at: Ms) -> Self {
        Self {
            id,
            name: room.name,
            capacity: room.capacity,
            location: room.location,
            description: room.description,
            opens_at: room.opens_at,
            closes_at: room.closes_at,
            active: true,
            created_at,
            bookings: Vec::new(),
        }
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            name: self.name.clone(),
            capacity: self.capacity,
            location: self.location.clone(),
            description: self.description.clone(),
            opens_at: self.opens_at,
            closes_at: self.closes_at,
            active: self.active,
            created_at: self.created_at,
        }
    }

    /// Insert maintaining sort order by span.start.
    pub fn insert_booking(&mut self, booking: Booking) {
        let pos = self
            .bookings
            .binary_search_by_key(&booking.span.start, |b| b.span.start)
            .unwrap_or_else(|e| e);
        self.bookings.insert(pos, booking);
    }

    /// Remove by id, returning the booking so it can be patched and re-inserted.
    pub fn remove_booking(&mut self, id: Ulid) -> Option<Booking> {
        if let Some(pos) = self.bookings.iter().position(|b| b.id == id) {
            Some(self.bookings.remove(pos))
        } else {
            None
        }
    }

    pub fn booking(&self, id: Ulid) -> Option<&Booking> {
        self.bookings.iter().find(|b| b.id == id)
    }

    pub fn booking_mut(&mut self, id: Ulid) -> Option<&mut Booking> {
        self.bookings.iter_mut().find(|b| b.id == id)
    }

    /// Bookings whose span overlaps the query window, cancelled included.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &Span) -> impl Iterator<Item = &Booking> {
        let right_bound = self.bookings.partition_point(|b| b.span.start < query.end);
        self.bookings[..right_bound]
            .iter()
            .filter(move |b| b.span.end > query.start)
    }
}

/// Room snapshot without the booking list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub name: String,
    pub capacity: u32,
    pub location: Option<String>,
    pub description: Option<String>,
    pub opens_at: NaiveTime,
    pub closes_at: NaiveTime,
    pub active: bool,
    pub created_at: Ms,
}

/// The WAL record format. Variant order is part of the on-disk format:
/// bincode encodes the variant index, so new variants go at the end only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    RoomCreated {
        id: Ulid,
        name: String,
        capacity: u32,
        location: Option<String>,
        description: Option<String>,
        opens_at: NaiveTime,
        closes_at: NaiveTime,
        created_at: Ms,
    },
    RoomUpdated {
        id: Ulid,
        patch: RoomPatch,
    },
    RoomDeactivated {
        id: Ulid,
    },
    BookingCreated {
        booking: Booking,
    },
    BookingUpdated {
        id: Ulid,
        room_id: Ulid,
        patch: BookingPatch,
        updated_at: Ms,
    },
    /// Legacy cancellation record from logs written before cancellation
    /// reasons existed. Replay still accepts it; nothing writes it anymore.
    BookingCancelled {
        id: Ulid,
        room_id: Ulid,
        cancelled_at: Ms,
    },
    /// Current cancellation record. Appended after `BookingCancelled` so
    /// older logs keep decoding.
    BookingCancelledWithReason {
        id: Ulid,
        room_id: Ulid,
        cancelled_at: Ms,
        reason: Option<String>,
    },
}
