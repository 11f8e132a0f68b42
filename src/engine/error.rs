use ulid::Ulid;

use super::availability::Unavailability;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    DuplicateName(String),
    Validation(&'static str),
    InvalidSchedule(&'static str),
    LimitExceeded(&'static str),
    CapacityExceeded { participants: u32, capacity: u32 },
    RoomInactive(Ulid),
    Unavailable(Unavailability),
    AlreadyCancelled(Ulid),
    FutureBookings { room_id: Ulid, count: usize },
    WalError(String),
}

/// Coarse classification for the presentation boundary: which transport-level
/// response class a failure belongs to. The engine never builds transport
/// semantics itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Conflict,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::Validation(_)
            | EngineError::InvalidSchedule(_)
            | EngineError::LimitExceeded(_)
            | EngineError::CapacityExceeded { .. }
            | EngineError::RoomInactive(_) => ErrorKind::Invalid,
            EngineError::AlreadyExists(_)
            | EngineError::DuplicateName(_)
            | EngineError::Unavailable(_)
            | EngineError::AlreadyCancelled(_)
            | EngineError::FutureBookings { .. } => ErrorKind::Conflict,
            EngineError::WalError(_) => ErrorKind::Internal,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::DuplicateName(name) => {
                write!(f, "a room named '{name}' already exists")
            }
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::InvalidSchedule(msg) => write!(f, "invalid schedule: {msg}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::CapacityExceeded {
                participants,
                capacity,
            } => {
                write!(
                    f,
                    "participant count ({participants}) exceeds room capacity ({capacity})"
                )
            }
            EngineError::RoomInactive(id) => write!(f, "room {id} is not available"),
            EngineError::Unavailable(reason) => write!(f, "room is not free: {reason}"),
            EngineError::AlreadyCancelled(id) => {
                write!(f, "booking {id} is cancelled and can no longer change")
            }
            EngineError::FutureBookings { room_id, count } => {
                write!(
                    f,
                    "cannot deactivate room {room_id}: {count} upcoming booking(s)"
                )
            }
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_response_classes() {
        assert_eq!(EngineError::NotFound(Ulid::new()).kind(), ErrorKind::NotFound);
        assert_eq!(
            EngineError::Validation("end must be after start").kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            EngineError::CapacityExceeded {
                participants: 9,
                capacity: 6
            }
            .kind(),
            ErrorKind::Invalid
        );
        assert_eq!(
            EngineError::DuplicateName("Boardroom".into()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::AlreadyCancelled(Ulid::new()).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            EngineError::WalError("disk full".into()).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn capacity_message_carries_both_numbers() {
        let msg = EngineError::CapacityExceeded {
            participants: 9,
            capacity: 6,
        }
        .to_string();
        assert!(msg.contains('9'));
        assert!(msg.contains('6'));
    }
}
