use std::collections::BTreeSet;

use chrono::NaiveDate;

use crate::model::*;

// ── Occupancy Index ───────────────────────────────────────────────
//
// Everything here is derived from the room's allocation list at call time.
// Callers hold the room lock (read for advisory queries, write inside `book`).

/// Active allocations on `room` whose stay intersects `stay`.
pub fn overlapping<'a>(room: &'a RoomState, stay: &Stay) -> Vec<&'a Allocation> {
    room.overlapping(stay).collect()
}

/// One capacity unit per overlapping active allocation.
pub fn occupant_count(room: &RoomState, stay: &Stay) -> u32 {
    room.overlapping(stay).count() as u32
}

pub fn occupant_genders(room: &RoomState, stay: &Stay) -> BTreeSet<Gender> {
    room.overlapping(stay).map(|a| a.guest.gender).collect()
}

pub fn snapshot(room: &RoomState, stay: &Stay) -> OccupancySnapshot {
    let mut occupant_count = 0;
    let mut occupant_genders = BTreeSet::new();
    for a in room.overlapping(stay) {
        occupant_count += 1;
        occupant_genders.insert(a.guest.gender);
    }
    OccupancySnapshot {
        room_id: room.id,
        stay: *stay,
        capacity: room.capacity,
        active: room.active,
        occupant_count,
        occupant_genders,
    }
}

/// Highest number of stays covering a single night.
///
/// Sweep line over check-in (+1) and check-out (-1) dates. Check-outs sort
/// before check-ins on the same date, so same-day turnover never counts twice.
pub fn peak_occupancy<'a>(stays: impl IntoIterator<Item = &'a Stay>) -> u32 {
    let mut events: Vec<(NaiveDate, i32)> = Vec::new();
    for s in stays {
        events.push((s.check_in, 1));
        events.push((s.check_out, -1));
    }
    events.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));

    let mut current: i32 = 0;
    let mut peak: i32 = 0;
    for (_, delta) in events {
        current += delta;
        peak = peak.max(current);
    }
    peak as u32
}

/// Peak over the room's active allocations.
pub fn room_peak_occupancy(room: &RoomState) -> u32 {
    peak_occupancy(room.allocations.iter().filter(|a| a.is_active()).map(|a| &a.stay))
}
