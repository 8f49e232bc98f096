use thiserror::Error;

use crate::model::*;

/// Why a booking was refused. These are expected answers, not faults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("check-out date must be after check-in date")]
    InvalidDateRange,
    #[error("room is not active")]
    RoomInactive,
    #[error("room has no free place for the requested dates")]
    RoomFull,
    #[error("shared room is occupied by guests of a different gender on the requested dates")]
    GenderConflict,
}

impl Rejection {
    /// Stable machine-readable code used on the wire and in metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Rejection::InvalidDateRange => "INVALID_DATE_RANGE",
            Rejection::RoomInactive => "ROOM_INACTIVE",
            Rejection::RoomFull => "ROOM_FULL",
            Rejection::GenderConflict => "GENDER_CONFLICT",
        }
    }
}

/// Admission check for one candidate against one room.
///
/// `overlapping` must be the room's active allocations intersecting the
/// candidate's stay. Checks run in a fixed order: dates, active flag,
/// capacity, gender. On acceptance the validated stay is returned.
pub fn validate(
    candidate: &BookingCandidate,
    room: &RoomState,
    overlapping: &[&Allocation],
) -> Result<Stay, Rejection> {
    let stay = candidate.stay().ok_or(Rejection::InvalidDateRange)?;
    if !room.active {
        return Err(Rejection::RoomInactive);
    }
    if overlapping.len() as u64 + 1 > u64::from(room.capacity) {
        return Err(Rejection::RoomFull);
    }
    // One gender per shared room per night; `Unspecified` matches anything.
    if room.is_shared()
        && overlapping
            .iter()
            .any(|a| !a.guest.gender.is_compatible_with(candidate.guest.gender))
    {
        return Err(Rejection::GenderConflict);
    }
    Ok(stay)
}
