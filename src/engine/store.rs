use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

pub type SharedRoomState = Arc<RwLock<RoomState>>;
pub type SharedGuestHouseState = Arc<RwLock<GuestHouseState>>;

/// In-memory side of the Allocation Store: every guest house and room behind
/// its own lock, plus reverse indexes. The WAL is the durable side; this is
/// always exactly the replay of it.
pub struct Store {
    guest_houses: DashMap<Ulid, SharedGuestHouseState>,
    rooms: DashMap<Ulid, SharedRoomState>,
    room_to_guest_house: DashMap<Ulid, Ulid>,
    allocation_to_room: DashMap<Ulid, Ulid>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            guest_houses: DashMap::new(),
            rooms: DashMap::new(),
            room_to_guest_house: DashMap::new(),
            allocation_to_room: DashMap::new(),
        }
    }

    /// Rebuild state from a replayed log. Events referring to unknown ids
    /// are skipped.
    pub fn restore(events: &[Event]) -> Self {
        let mut houses: HashMap<Ulid, GuestHouseState> = HashMap::new();
        let mut rooms: HashMap<Ulid, RoomState> = HashMap::new();

        for event in events {
            match event {
                Event::GuestHouseCreated { id, details, active, created_at } => {
                    houses.insert(
                        *id,
                        GuestHouseState::new(*id, details.clone(), *active, *created_at),
                    );
                }
                Event::RoomCreated {
                    id,
                    guest_house_id,
                    room_number,
                    details,
                    capacity,
                    active,
                    created_at,
                } => {
                    let Some(house) = houses.get_mut(guest_house_id) else {
                        continue;
                    };
                    house.add_room(*id, room_number);
                    rooms.insert(
                        *id,
                        RoomState::new(
                            *id,
                            *guest_house_id,
                            room_number.clone(),
                            details.clone(),
                            *capacity,
                            *active,
                            *created_at,
                        ),
                    );
                }
                Event::GuestHouseUpdated { id, .. } | Event::GuestHouseActiveSet { id, .. } => {
                    if let Some(house) = houses.get_mut(id) {
                        apply_to_guest_house(house, event);
                    }
                }
                other => {
                    if let Some(room_id) = event_room_id(other)
                        && let Some(room) = rooms.get_mut(&room_id)
                    {
                        apply_to_room(room, other);
                    }
                }
            }
        }

        let store = Self::new();
        for (id, house) in houses {
            store.guest_houses.insert(id, Arc::new(RwLock::new(house)));
        }
        for (id, room) in rooms {
            store.room_to_guest_house.insert(id, room.guest_house_id);
            for a in &room.allocations {
                store.allocation_to_room.insert(a.id, id);
            }
            store.rooms.insert(id, Arc::new(RwLock::new(room)));
        }
        store
    }

    // ── Guest houses ─────────────────────────────────────────

    pub fn guest_house_count(&self) -> usize {
        self.guest_houses.len()
    }

    pub fn get_guest_house(&self, id: &Ulid) -> Option<SharedGuestHouseState> {
        self.guest_houses.get(id).map(|e| e.value().clone())
    }

    pub fn insert_guest_house(&self, house: GuestHouseState) {
        self.guest_houses
            .insert(house.id, Arc::new(RwLock::new(house)));
    }

    /// Ids in creation order (ULIDs sort by time).
    pub fn guest_house_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.guest_houses.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Rooms ────────────────────────────────────────────────

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    pub fn guest_house_of_room(&self, room_id: &Ulid) -> Option<Ulid> {
        self.room_to_guest_house.get(room_id).map(|e| *e.value())
    }

    pub fn insert_room(&self, room: RoomState) {
        self.room_to_guest_house.insert(room.id, room.guest_house_id);
        self.rooms.insert(room.id, Arc::new(RwLock::new(room)));
    }

    pub fn room_ids(&self) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self.rooms.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    // ── Allocation index ─────────────────────────────────────

    pub fn room_for_allocation(&self, allocation_id: &Ulid) -> Option<Ulid> {
        self.allocation_to_room.get(allocation_id).map(|e| *e.value())
    }

    pub(super) fn index_event(&self, event: &Event) {
        if let Event::AllocationBooked { allocation } = event {
            self.allocation_to_room
                .insert(allocation.id, allocation.room_id);
        }
    }

    /// Minimal event sequence that recreates the current state, cancelled
    /// allocations and inactive rooms included. Caller must keep writers out.
    pub async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for house_id in self.guest_house_ids() {
            let Some(house) = self.get_guest_house(&house_id) else {
                continue;
            };
            let house = house.read().await;
            events.push(Event::GuestHouseCreated {
                id: house.id,
                details: house.details.clone(),
                active: house.active,
                created_at: house.created_at,
            });
            for room_id in &house.rooms {
                let Some(room) = self.get_room(room_id) else {
                    continue;
                };
                let room = room.read().await;
                events.push(Event::RoomCreated {
                    id: room.id,
                    guest_house_id: room.guest_house_id,
                    room_number: room.room_number.clone(),
                    details: room.details.clone(),
                    capacity: room.capacity,
                    active: room.active,
                    created_at: room.created_at,
                });
                events.extend(room.allocations.iter().map(|a| Event::AllocationBooked {
                    allocation: a.clone(),
                }));
            }
        }
        events
    }
}

/// Apply a room-scoped event. Caller holds the room's write lock.
pub(super) fn apply_to_room(room: &mut RoomState, event: &Event) {
    match event {
        Event::RoomUpdated { details, capacity, .. } => {
            room.details = details.clone();
            room.capacity = *capacity;
        }
        Event::RoomActiveSet { active, .. } => room.active = *active,
        Event::AllocationBooked { allocation } => room.insert_allocation(allocation.clone()),
        Event::AllocationCancelled { id, cancelled_at, .. } => {
            if let Some(a) = room.allocation_mut(id) {
                a.status = AllocationStatus::Cancelled;
                a.cancelled_at = Some(*cancelled_at);
            }
        }
        Event::GuestHouseCreated { .. }
        | Event::GuestHouseUpdated { .. }
        | Event::GuestHouseActiveSet { .. }
        | Event::RoomCreated { .. } => {}
    }
}

/// Apply a guest-house-scoped event. Caller holds the guest house's write lock.
pub(super) fn apply_to_guest_house(house: &mut GuestHouseState, event: &Event) {
    match event {
        Event::GuestHouseUpdated { details, .. } => house.details = details.clone(),
        Event::GuestHouseActiveSet { active, .. } => house.active = *active,
        _ => {}
    }
}

/// Room an event belongs to, for everything but creation events.
fn event_room_id(event: &Event) -> Option<Ulid> {
    match event {
        Event::RoomUpdated { id, .. } | Event::RoomActiveSet { id, .. } => Some(*id),
        Event::AllocationBooked { allocation } => Some(allocation.room_id),
        Event::AllocationCancelled { room_id, .. } => Some(*room_id),
        Event::GuestHouseCreated { .. }
        | Event::GuestHouseUpdated { .. }
        | Event::GuestHouseActiveSet { .. }
        | Event::RoomCreated { .. } => None,
    }
}
