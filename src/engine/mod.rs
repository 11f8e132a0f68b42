mod availability;
mod error;
mod mutations;
mod queries;

pub use availability::{RoomAvailability, Unavailability, check_room, conflicting_booking};
pub use error::{EngineError, ErrorKind};
pub use queries::BookingFilter;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::config::Config;
use crate::model::*;
use crate::wal::Wal;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush the batch first, then the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty — flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush — even on append error — so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The scheduling engine: every room behind its own lock, so check-then-book
/// runs as one unit per room while distinct rooms never contend.
pub struct Engine {
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Name uniqueness index over active and inactive rooms.
    names: DashMap<String, Ulid>,
    /// Reverse lookup: booking id → room id. Cancelled bookings stay mapped.
    booking_index: DashMap<Ulid, Ulid>,
    wal_tx: mpsc::Sender<WalCommand>,
}

/// Apply an event directly to a RoomState (no locking — caller holds the lock).
/// Room creation/deactivation of the map entry itself is handled by the engine.
fn apply_to_room(room: &mut RoomState, event: &Event, booking_index: &DashMap<Ulid, Ulid>) {
    match event {
        Event::RoomUpdated { patch, .. } => {
            patch.apply(room);
        }
        Event::RoomDeactivated { .. } => {
            room.active = false;
        }
        Event::BookingCreated { booking } => {
            booking_index.insert(booking.id, booking.room_id);
            room.insert_booking(booking.clone());
        }
        Event::BookingUpdated {
            id,
            patch,
            updated_at,
            ..
        } => {
            // Remove + re-insert keeps the vec sorted when the span moves.
            if let Some(mut booking) = room.remove_booking(*id) {
                patch.apply(&mut booking);
                booking.updated_at = *updated_at;
                room.insert_booking(booking);
            }
        }
        Event::BookingCancelled {
            id, cancelled_at, ..
        } => {
            if let Some(booking) = room.booking_mut(*id) {
                booking.cancellation = Some(Cancellation {
                    at: *cancelled_at,
                    reason: None,
                });
                booking.updated_at = *cancelled_at;
            }
        }
        Event::BookingCancelledWithReason {
            id,
            cancelled_at,
            reason,
            ..
        } => {
            if let Some(booking) = room.booking_mut(*id) {
                booking.cancellation = Some(Cancellation {
                    at: *cancelled_at,
                    reason: reason.clone(),
                });
                booking.updated_at = *cancelled_at;
            }
        }
        // Handled at the DashMap level, not here
        Event::RoomCreated { .. } => {}
    }
}

impl Engine {
    pub fn new(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            rooms: DashMap::new(),
            names: DashMap::new(),
            booking_index: DashMap::new(),
            wal_tx,
        };

        // Replay — we're the sole owner of these Arcs, so try_write always
        // succeeds instantly. Never blocking_write here: this may run inside
        // an async context.
        for event in &events {
            match event {
                Event::RoomCreated {
                    id,
                    name,
                    capacity,
                    location,
                    description,
                    opens_at,
                    closes_at,
                    created_at,
                } => {
                    let room = RoomState::new(
                        *id,
                        NewRoom {
                            name: name.clone(),
                            capacity: *capacity,
                            location: location.clone(),
                            description: description.clone(),
                            opens_at: *opens_at,
                            closes_at: *closes_at,
                        },
                        *created_at,
                    );
                    engine.names.insert(name.clone(), *id);
                    engine.rooms.insert(*id, Arc::new(RwLock::new(room)));
                }
                Event::RoomUpdated { id, patch } => {
                    if let Some(entry) = engine.rooms.get(id) {
                        let room_arc = entry.clone();
                        drop(entry);
                        let mut guard =
                            room_arc.try_write().expect("replay: uncontended write");
                        if let Some(new_name) = &patch.name
                            && *new_name != guard.name
                        {
                            engine.names.remove(&guard.name);
                            engine.names.insert(new_name.clone(), *id);
                        }
                        apply_to_room(&mut guard, event, &engine.booking_index);
                    }
                }
                other => {
                    let room_id = event_room_id(other);
                    if let Some(entry) = engine.rooms.get(&room_id) {
                        let room_arc = entry.clone();
                        drop(entry);
                        let mut guard =
                            room_arc.try_write().expect("replay: uncontended write");
                        apply_to_room(&mut guard, other, &engine.booking_index);
                    }
                }
            }
        }

        Ok(engine)
    }

    /// Open the engine from configuration: ensure the data dir exists, replay
    /// the WAL, and spawn the background compactor.
    pub fn open(config: &Config) -> io::Result<Arc<Self>> {
        std::fs::create_dir_all(&config.data_dir)?;
        let engine = Arc::new(Self::new(config.data_dir.join("bookings.wal"))?);
        let compactor = engine.clone();
        let threshold = config.compact_threshold;
        tokio::spawn(async move {
            crate::compactor::run_compactor(compactor, threshold).await;
        });
        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub fn room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn room_for_booking(&self, booking_id: &Ulid) -> Option<Ulid> {
        self.booking_index.get(booking_id).map(|e| *e.value())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// Registry iteration order: id order, which for ULIDs is creation order.
    pub(super) fn room_ids_ordered(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// WAL-append then apply, in that order: a change visible in memory is
    /// already durable.
    pub(super) async fn persist_and_apply(
        &self,
        room: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        apply_to_room(room, event, &self.booking_index);
        Ok(())
    }

    /// Lookup booking → room, get room, acquire write lock.
    pub(super) async fn resolve_booking_write(
        &self,
        booking_id: &Ulid,
    ) -> Result<(Ulid, tokio::sync::OwnedRwLockWriteGuard<RoomState>), EngineError> {
        let room_id = self
            .room_for_booking(booking_id)
            .ok_or(EngineError::NotFound(*booking_id))?;
        let room = self.room(&room_id).ok_or(EngineError::NotFound(room_id))?;
        let guard = room.write_owned().await;
        Ok((room_id, guard))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

/// Extract the owning room id from an event (not RoomCreated — that one is
/// handled at the map level before any routing).
fn event_room_id(event: &Event) -> Ulid {
    match event {
        Event::RoomCreated { id, .. }
        | Event::RoomUpdated { id, .. }
        | Event::RoomDeactivated { id } => *id,
        Event::BookingCreated { booking } => booking.room_id,
        Event::BookingUpdated { room_id, .. }
        | Event::BookingCancelled { room_id, .. }
        | Event::BookingCancelledWithReason { room_id, .. } => *room_id,
    }
}
