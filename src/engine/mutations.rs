use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use ulid::Ulid;

use super::availability::check_room;
use super::{Engine, EngineError};
use crate::limits;
use crate::model::*;
use crate::observability;
use crate::time::now_ms;

// ── Input validation ──────────────────────────────────────────────

fn validate_new_room(room: &NewRoom) -> Result<(), EngineError> {
    if room.name.trim().is_empty() {
        return Err(EngineError::Validation("room name must not be empty"));
    }
    if room.name.len() > limits::MAX_NAME_LEN {
        return Err(EngineError::Validation("room name too long"));
    }
    if room.capacity == 0 {
        return Err(EngineError::Validation("capacity must be positive"));
    }
    validate_text(&room.location)?;
    validate_text(&room.description)?;
    if room.closes_at <= room.opens_at {
        return Err(EngineError::InvalidSchedule(
            "closing time must be after opening time",
        ));
    }
    Ok(())
}

fn validate_text(text: &Option<String>) -> Result<(), EngineError> {
    if let Some(t) = text
        && t.len() > limits::MAX_TEXT_LEN
    {
        return Err(EngineError::Validation("text field too long"));
    }
    Ok(())
}

fn validate_email(email: &str) -> Result<(), EngineError> {
    if email.len() > limits::MAX_EMAIL_LEN {
        return Err(EngineError::Validation("organizer email too long"));
    }
    if !email.contains('@') {
        return Err(EngineError::Validation("organizer email is not an address"));
    }
    Ok(())
}

fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::InvalidSchedule("end must be after start"));
    }
    if span.start < limits::MIN_VALID_TIMESTAMP_MS || span.end > limits::MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::InvalidSchedule("timestamp out of range"));
    }
    if span.duration_ms() > limits::MAX_SPAN_DURATION_MS {
        return Err(EngineError::InvalidSchedule("booking is too long"));
    }
    Ok(())
}

fn validate_new_booking(booking: &NewBooking) -> Result<(), EngineError> {
    if booking.title.trim().is_empty() {
        return Err(EngineError::Validation("title must not be empty"));
    }
    if booking.title.len() > limits::MAX_TITLE_LEN {
        return Err(EngineError::Validation("title too long"));
    }
    if booking.organizer_name.trim().is_empty() {
        return Err(EngineError::Validation("organizer name must not be empty"));
    }
    if booking.organizer_name.len() > limits::MAX_ORGANIZER_LEN {
        return Err(EngineError::Validation("organizer name too long"));
    }
    if let Some(email) = &booking.organizer_email {
        validate_email(email)?;
    }
    if booking.participants == 0 {
        return Err(EngineError::Validation("participants must be positive"));
    }
    validate_text(&booking.description)?;
    validate_text(&booking.notes)?;
    validate_span(&booking.span)
}

fn validate_booking_patch(patch: &BookingPatch) -> Result<(), EngineError> {
    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(EngineError::Validation("title must not be empty"));
        }
        if title.len() > limits::MAX_TITLE_LEN {
            return Err(EngineError::Validation("title too long"));
        }
    }
    if let Some(name) = &patch.organizer_name {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("organizer name must not be empty"));
        }
        if name.len() > limits::MAX_ORGANIZER_LEN {
            return Err(EngineError::Validation("organizer name too long"));
        }
    }
    if let Some(email) = &patch.organizer_email {
        validate_email(email)?;
    }
    if patch.participants == Some(0) {
        return Err(EngineError::Validation("participants must be positive"));
    }
    validate_text(&patch.description)?;
    validate_text(&patch.notes)
}

// ── Room mutations ────────────────────────────────────────────────

impl Engine {
    pub async fn create_room(&self, id: Ulid, room: NewRoom) -> Result<RoomInfo, EngineError> {
        validate_new_room(&room)?;
        if self.rooms.len() >= limits::MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }
        if self.rooms.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        // Reserve the name before the WAL round-trip; the Entry guard must not
        // be held across an await.
        match self.names.entry(room.name.clone()) {
            Entry::Occupied(_) => return Err(EngineError::DuplicateName(room.name)),
            Entry::Vacant(vacant) => {
                vacant.insert(id);
            }
        }

        let created_at = now_ms();
        let event = Event::RoomCreated {
            id,
            name: room.name.clone(),
            capacity: room.capacity,
            location: room.location.clone(),
            description: room.description.clone(),
            opens_at: room.opens_at,
            closes_at: room.closes_at,
            created_at,
        };
        if let Err(e) = self.wal_append(&event).await {
            self.names.remove(&room.name);
            return Err(e);
        }

        let state = RoomState::new(id, room, created_at);
        let info = state.info();
        self.rooms.insert(id, Arc::new(RwLock::new(state)));
        metrics::gauge!(observability::ROOMS_ACTIVE).increment(1.0);
        tracing::info!(room = %id, name = %info.name, "room created");
        Ok(info)
    }

    pub async fn update_room(&self, id: Ulid, patch: RoomPatch) -> Result<RoomInfo, EngineError> {
        let room = self.room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = room.write().await;

        if let Some(name) = &patch.name {
            if name.trim().is_empty() {
                return Err(EngineError::Validation("room name must not be empty"));
            }
            if name.len() > limits::MAX_NAME_LEN {
                return Err(EngineError::Validation("room name too long"));
            }
        }
        if patch.capacity == Some(0) {
            return Err(EngineError::Validation("capacity must be positive"));
        }
        validate_text(&patch.location)?;
        validate_text(&patch.description)?;

        // The schedule that results from the merge must still be well-formed.
        let opens = patch.opens_at.unwrap_or(guard.opens_at);
        let closes = patch.closes_at.unwrap_or(guard.closes_at);
        if closes <= opens {
            return Err(EngineError::InvalidSchedule(
                "closing time must be after opening time",
            ));
        }

        // Deactivating through a patch gets the same guard as deactivate_room.
        if patch.active == Some(false) && guard.active {
            let upcoming = count_future_bookings(&guard);
            if upcoming > 0 {
                return Err(EngineError::FutureBookings {
                    room_id: id,
                    count: upcoming,
                });
            }
        }

        let renaming = patch
            .name
            .as_ref()
            .is_some_and(|name| *name != guard.name);
        if renaming {
            let new_name = patch.name.clone().unwrap_or_default();
            match self.names.entry(new_name) {
                Entry::Occupied(occupied) if *occupied.get() != id => {
                    return Err(EngineError::DuplicateName(occupied.key().clone()));
                }
                Entry::Occupied(_) => {}
                Entry::Vacant(vacant) => {
                    vacant.insert(id);
                }
            }
        }
        let old_name = guard.name.clone();
        let was_active = guard.active;

        let event = Event::RoomUpdated {
            id,
            patch: patch.clone(),
        };
        if let Err(e) = self.persist_and_apply(&mut guard, &event).await {
            if renaming && let Some(name) = &patch.name {
                self.names.remove(name);
            }
            return Err(e);
        }
        if renaming {
            self.names.remove(&old_name);
        }
        if was_active != guard.active {
            let delta = if guard.active { 1.0 } else { -1.0 };
            metrics::gauge!(observability::ROOMS_ACTIVE).increment(delta);
        }
        tracing::info!(room = %id, "room updated");
        Ok(guard.info())
    }

    /// Soft delete: the room stops accepting bookings but keeps its history.
    /// Already-inactive rooms are left untouched.
    pub async fn deactivate_room(&self, id: Ulid) -> Result<RoomInfo, EngineError> {
        let room = self.room(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = room.write().await;
        if !guard.active {
            return Ok(guard.info());
        }

        let upcoming = count_future_bookings(&guard);
        if upcoming > 0 {
            return Err(EngineError::FutureBookings {
                room_id: id,
                count: upcoming,
            });
        }

        self.persist_and_apply(&mut guard, &Event::RoomDeactivated { id })
            .await?;
        metrics::gauge!(observability::ROOMS_ACTIVE).decrement(1.0);
        tracing::info!(room = %id, "room deactivated");
        Ok(guard.info())
    }
}

fn count_future_bookings(room: &RoomState) -> usize {
    let now = now_ms();
    room.bookings
        .iter()
        .filter(|b| !b.is_cancelled() && b.span.start > now)
        .count()
}

// ── Booking mutations ─────────────────────────────────────────────

impl Engine {
    pub async fn create_booking(
        &self,
        id: Ulid,
        booking: NewBooking,
    ) -> Result<Booking, EngineError> {
        validate_new_booking(&booking)?;
        if self.booking_index.contains_key(&id) {
            return Err(EngineError::AlreadyExists(id));
        }

        let room = self
            .room(&booking.room_id)
            .ok_or(EngineError::NotFound(booking.room_id))?;
        let mut guard = room.write().await;

        if !guard.active {
            return Err(EngineError::RoomInactive(guard.id));
        }
        if guard.bookings.len() >= limits::MAX_BOOKINGS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many bookings in room"));
        }
        if booking.participants > guard.capacity {
            return Err(EngineError::CapacityExceeded {
                participants: booking.participants,
                capacity: guard.capacity,
            });
        }
        if let Err(reason) = check_room(&guard, &booking.span, None) {
            metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
            return Err(EngineError::Unavailable(reason));
        }

        let now = now_ms();
        let record = Booking {
            id,
            room_id: booking.room_id,
            title: booking.title,
            organizer_name: booking.organizer_name,
            organizer_email: booking.organizer_email,
            participants: booking.participants,
            span: booking.span,
            description: booking.description,
            notes: booking.notes,
            cancellation: None,
            created_at: now,
            updated_at: now,
        };
        let event = Event::BookingCreated {
            booking: record.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::BOOKINGS_CREATED_TOTAL).increment(1);
        tracing::info!(
            booking = %id,
            room = %record.room_id,
            start = record.span.start,
            end = record.span.end,
            "booking created"
        );
        Ok(record)
    }

    pub async fn update_booking(
        &self,
        id: Ulid,
        patch: BookingPatch,
    ) -> Result<Booking, EngineError> {
        validate_booking_patch(&patch)?;
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;

        let current = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if current.is_cancelled() {
            return Err(EngineError::AlreadyCancelled(id));
        }

        if patch.changes_span() {
            let new_span = patch.merged_span(&current.span);
            validate_span(&new_span)?;
            // Re-run the full availability check, skipping this booking's own
            // current slot.
            if let Err(reason) = check_room(&guard, &new_span, Some(id)) {
                metrics::counter!(observability::BOOKING_CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::Unavailable(reason));
            }
        }

        // Capacity is re-checked only when the participant count itself
        // changes: a booking grandfathered in by a later capacity shrink can
        // still be edited, it just can't grow.
        if let Some(participants) = patch.participants
            && participants > guard.capacity
        {
            return Err(EngineError::CapacityExceeded {
                participants,
                capacity: guard.capacity,
            });
        }

        let event = Event::BookingUpdated {
            id,
            room_id,
            patch,
            updated_at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await?;

        tracing::info!(booking = %id, room = %room_id, "booking updated");
        guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Cancel keeps the record: it stays readable, frees its slot, and can
    /// never be modified or cancelled again.
    pub async fn cancel_booking(
        &self,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<Booking, EngineError> {
        validate_text(&reason)?;
        let (room_id, mut guard) = self.resolve_booking_write(&id).await?;

        let current = guard.booking(id).ok_or(EngineError::NotFound(id))?;
        if current.is_cancelled() {
            return Err(EngineError::AlreadyCancelled(id));
        }

        let event = Event::BookingCancelledWithReason {
            id,
            room_id,
            cancelled_at: now_ms(),
            reason,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        metrics::counter!(observability::BOOKINGS_CANCELLED_TOTAL).increment(1);
        tracing::info!(booking = %id, room = %room_id, "booking cancelled");
        guard
            .booking(id)
            .cloned()
            .ok_or(EngineError::NotFound(id))
    }

    /// Rewrite the WAL as the minimal event stream that reproduces current
    /// state: one creation per room, one per booking (cancellations travel
    /// inside the booking record), one deactivation per inactive room.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for id in self.room_ids_ordered() {
            let Some(room) = self.room(&id) else { continue };
            let guard = room.read().await;
            events.push(Event::RoomCreated {
                id: guard.id,
                name: guard.name.clone(),
                capacity: guard.capacity,
                location: guard.location.clone(),
                description: guard.description.clone(),
                opens_at: guard.opens_at,
                closes_at: guard.closes_at,
                created_at: guard.created_at,
            });
            for booking in &guard.bookings {
                events.push(Event::BookingCreated {
                    booking: booking.clone(),
                });
            }
            if !guard.active {
                events.push(Event::RoomDeactivated { id: guard.id });
            }
        }

        let (tx, rx) = tokio::sync::oneshot::channel();
        self.wal_tx
            .send(super::WalCommand::Compact {
                events,
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }
}
