pub mod compactor;
pub mod config;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod time;
mod wal;

pub use config::Config;
pub use engine::{
    BookingFilter, Engine, EngineError, ErrorKind, RoomAvailability, Unavailability,
};
pub use model::{
    Booking, BookingPatch, Cancellation, Ms, NewBooking, NewRoom, RoomInfo, RoomPatch, Span,
};
