use thiserror::Error;
use ulid::Ulid;

/// Faults and registry refusals. Booking rejections are not errors; they
/// travel as [`Rejection`](super::Rejection) inside a `BookingOutcome`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("room number {room_number:?} already exists in guest house {guest_house_id}")]
    DuplicateRoomNumber {
        guest_house_id: Ulid,
        room_number: String,
    },
    #[error("guest house {0} is inactive")]
    GuestHouseInactive(Ulid),
    #[error("capacity {capacity} is below current peak occupancy {peak}")]
    CapacityBelowOccupancy { capacity: u32, peak: u32 },
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    /// The room's lock was not acquired within the configured timeout.
    #[error("busy: {0} is locked by concurrent requests, retry later")]
    Busy(Ulid),
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Busy(_))
    }
}
