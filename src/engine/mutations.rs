use std::collections::BTreeSet;

use chrono::Utc;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::occupancy;
use super::store;
use super::validator::{self, Rejection};
use super::{Engine, EngineError};

/// Result of a `book` call that reached a decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookingOutcome {
    Booked(Allocation),
    Rejected(Rejection),
}

impl BookingOutcome {
    pub fn allocation(&self) -> Option<&Allocation> {
        match self {
            BookingOutcome::Booked(a) => Some(a),
            BookingOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            BookingOutcome::Booked(_) => None,
            BookingOutcome::Rejected(r) => Some(*r),
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            BookingOutcome::Booked(_) => "booked",
            BookingOutcome::Rejected(Rejection::InvalidDateRange) => "invalid_date_range",
            BookingOutcome::Rejected(Rejection::RoomInactive) => "room_inactive",
            BookingOutcome::Rejected(Rejection::RoomFull) => "room_full",
            BookingOutcome::Rejected(Rejection::GenderConflict) => "gender_conflict",
        }
    }
}

/// Partial room update; `None` leaves a field unchanged. An empty name or
/// description clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<u32>,
    pub facilities: Option<BTreeSet<String>>,
    pub active: Option<bool>,
}

/// Partial guest-house update, merged over the stored details under the
/// house's write lock. Name and location are trimmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuestHouseUpdate {
    pub name: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub active: Option<bool>,
}

impl GuestHouseUpdate {
    pub fn active(active: bool) -> Self {
        Self {
            active: Some(active),
            ..Self::default()
        }
    }

    fn merged_over(&self, current: &GuestHouseDetails) -> GuestHouseDetails {
        let pick = |new: &Option<String>, old: &Option<String>| new.clone().or_else(|| old.clone());
        GuestHouseDetails {
            name: self
                .name
                .as_ref()
                .map_or_else(|| current.name.clone(), |n| n.trim().to_string()),
            location: self
                .location
                .as_ref()
                .map_or_else(|| current.location.clone(), |l| l.trim().to_string()),
            address: pick(&self.address, &current.address),
            description: pick(&self.description, &current.description),
            contact_person: pick(&self.contact_person, &current.contact_person),
            phone: pick(&self.phone, &current.phone),
            email: pick(&self.email, &current.email),
        }
    }
}

fn check_len(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn check_opt_len(value: &Option<String>, max: usize, what: &'static str) -> Result<(), EngineError> {
    match value {
        Some(v) => check_len(v, max, what),
        None => Ok(()),
    }
}

fn check_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 {
        return Err(EngineError::InvalidInput("capacity must be at least 1"));
    }
    if capacity > MAX_ROOM_CAPACITY {
        return Err(EngineError::LimitExceeded("room capacity too large"));
    }
    Ok(())
}

fn check_facilities(facilities: &BTreeSet<String>) -> Result<(), EngineError> {
    if facilities.len() > MAX_FACILITIES {
        return Err(EngineError::LimitExceeded("too many facilities"));
    }
    for f in facilities {
        check_len(f, MAX_NAME_LEN, "facility name too long")?;
    }
    Ok(())
}

fn check_guest_house_details(details: &GuestHouseDetails) -> Result<(), EngineError> {
    if details.name.trim().is_empty() {
        return Err(EngineError::InvalidInput("guest house name is required"));
    }
    check_len(&details.name, MAX_NAME_LEN, "guest house name too long")?;
    check_len(&details.location, MAX_NAME_LEN, "location too long")?;
    check_opt_len(&details.address, MAX_TEXT_LEN, "address too long")?;
    check_opt_len(&details.description, MAX_TEXT_LEN, "description too long")?;
    check_opt_len(&details.contact_person, MAX_NAME_LEN, "contact person too long")?;
    check_opt_len(&details.phone, MAX_NAME_LEN, "phone too long")?;
    check_opt_len(&details.email, MAX_NAME_LEN, "email too long")
}

fn check_guest(guest: &Guest) -> Result<(), EngineError> {
    check_len(&guest.name, MAX_NAME_LEN, "guest name too long")?;
    check_len(&guest.email, MAX_NAME_LEN, "guest email too long")?;
    check_len(&guest.phone, MAX_NAME_LEN, "guest phone too long")
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Engine {
    // ── Room Registry ────────────────────────────────────────

    pub async fn create_guest_house(
        &self,
        details: GuestHouseDetails,
    ) -> Result<GuestHouseInfo, EngineError> {
        check_guest_house_details(&details)?;
        if self.store.guest_house_count() >= MAX_GUEST_HOUSES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many guest houses"));
        }

        let id = Ulid::new();
        let _gate = self.bounded(id, self.enter_commit()).await?;
        let created_at = Utc::now();
        let event = Event::GuestHouseCreated {
            id,
            details: details.clone(),
            active: true,
            created_at,
        };
        self.persist(&event).await?;
        self.store
            .insert_guest_house(GuestHouseState::new(id, details.clone(), true, created_at));
        tracing::info!(guest_house = %id, name = %details.name, "guest house created");

        Ok(GuestHouseInfo {
            id,
            details,
            active: true,
            created_at,
            rooms: Vec::new(),
        })
    }

    /// Apply a partial update. Deactivation also disables every room of
    /// the house: all room locks are taken first and the whole change is
    /// logged as one unit, so it lands completely or not at all.
    pub async fn update_guest_house(
        &self,
        id: Ulid,
        update: GuestHouseUpdate,
    ) -> Result<GuestHouseInfo, EngineError> {
        let shared = self
            .store
            .get_guest_house(&id)
            .ok_or(EngineError::NotFound(id))?;
        let (_gate, mut house) = self
            .bounded(id, async {
                let gate = self.enter_commit().await;
                (gate, shared.write_owned().await)
            })
            .await?;

        let details = update.merged_over(&house.details);
        check_guest_house_details(&details)?;
        let active = update.active.filter(|a| *a != house.active);

        let mut rooms = Vec::new();
        if active == Some(false) {
            let shared_rooms: Vec<_> = house
                .rooms
                .iter()
                .filter_map(|room_id| self.store.get_room(room_id))
                .collect();
            rooms = self
                .bounded(id, async {
                    let mut guards = Vec::with_capacity(shared_rooms.len());
                    for room in shared_rooms {
                        guards.push(room.write_owned().await);
                    }
                    guards
                })
                .await?;
        }

        let mut house_events = Vec::new();
        if details != house.details {
            house_events.push(Event::GuestHouseUpdated { id, details });
        }
        let room_events: Vec<Event> = rooms
            .iter()
            .filter(|room| room.active)
            .map(|room| Event::RoomActiveSet { id: room.id, active: false })
            .collect();
        if let Some(active) = active {
            house_events.push(Event::GuestHouseActiveSet { id, active });
        }
        if house_events.is_empty() {
            return self.guest_house_info(&house).await;
        }

        let mut events = room_events.clone();
        events.extend(house_events.iter().cloned());
        self.persist_all(events).await?;

        for (room, event) in rooms.iter_mut().filter(|r| r.active).zip(&room_events) {
            store::apply_to_room(room, event);
        }
        for event in &house_events {
            store::apply_to_guest_house(&mut house, event);
        }
        if let Some(active) = active {
            tracing::info!(guest_house = %id, active, rooms = room_events.len(), "guest house active flag changed");
        }
        drop(rooms);

        self.guest_house_info(&house).await
    }

    pub async fn create_room(
        &self,
        guest_house_id: Ulid,
        room_number: &str,
        capacity: u32,
        details: RoomDetails,
    ) -> Result<RoomInfo, EngineError> {
        let room_number = room_number.trim().to_string();
        if room_number.is_empty() {
            return Err(EngineError::InvalidInput("room number is required"));
        }
        check_len(&room_number, MAX_ROOM_NUMBER_LEN, "room number too long")?;
        check_capacity(capacity)?;
        check_facilities(&details.facilities)?;
        check_opt_len(&details.name, MAX_NAME_LEN, "room name too long")?;
        check_opt_len(&details.description, MAX_TEXT_LEN, "room description too long")?;
        let details = RoomDetails {
            name: non_empty(details.name),
            description: non_empty(details.description),
            facilities: details.facilities,
        };

        let shared = self
            .store
            .get_guest_house(&guest_house_id)
            .ok_or(EngineError::NotFound(guest_house_id))?;
        let (_gate, mut house) = self
            .bounded(guest_house_id, async {
                let gate = self.enter_commit().await;
                (gate, shared.write_owned().await)
            })
            .await?;

        if !house.active {
            return Err(EngineError::GuestHouseInactive(guest_house_id));
        }
        if house.rooms.len() >= MAX_ROOMS_PER_GUEST_HOUSE {
            return Err(EngineError::LimitExceeded("too many rooms in guest house"));
        }
        if house.room_numbers.contains_key(&room_number) {
            return Err(EngineError::DuplicateRoomNumber {
                guest_house_id,
                room_number,
            });
        }

        let id = Ulid::new();
        let created_at = Utc::now();
        let event = Event::RoomCreated {
            id,
            guest_house_id,
            room_number: room_number.clone(),
            details: details.clone(),
            capacity,
            active: true,
            created_at,
        };
        self.persist(&event).await?;
        let room = RoomState::new(id, guest_house_id, room_number, details, capacity, true, created_at);
        let info = room.info();
        house.add_room(id, &info.room_number);
        self.store.insert_room(room);
        tracing::info!(room = %id, guest_house = %guest_house_id, number = %info.room_number, capacity, "room created");
        Ok(info)
    }

    /// Change room details, capacity and/or active flag.
    ///
    /// Capacity may only shrink down to the room's current peak occupancy;
    /// existing allocations never become invalid. Re-activating a room in an
    /// inactive guest house is refused.
    pub async fn update_room(&self, room_id: Ulid, update: RoomUpdate) -> Result<RoomInfo, EngineError> {
        if let Some(capacity) = update.capacity {
            check_capacity(capacity)?;
        }
        if let Some(facilities) = &update.facilities {
            check_facilities(facilities)?;
        }
        check_opt_len(&update.name, MAX_NAME_LEN, "room name too long")?;
        check_opt_len(&update.description, MAX_TEXT_LEN, "room description too long")?;

        let house_id = self
            .store
            .guest_house_of_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let house = self
            .store
            .get_guest_house(&house_id)
            .ok_or(EngineError::NotFound(house_id))?;
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;

        // Lock order everywhere: commit gate, guest house, room.
        let (_gate, house, mut room) = self
            .bounded(room_id, async {
                let gate = self.enter_commit().await;
                let house = house.read_owned().await;
                (gate, house, room.write_owned().await)
            })
            .await?;

        let mut details = room.details.clone();
        if let Some(name) = update.name {
            details.name = non_empty(Some(name));
        }
        if let Some(description) = update.description {
            details.description = non_empty(Some(description));
        }
        if let Some(facilities) = update.facilities {
            details.facilities = facilities;
        }
        let capacity = update.capacity.unwrap_or(room.capacity);

        if capacity < room.capacity {
            let peak = occupancy::room_peak_occupancy(&room);
            if peak > capacity {
                return Err(EngineError::CapacityBelowOccupancy { capacity, peak });
            }
        }
        if update.active == Some(true) && !room.active && !house.active {
            return Err(EngineError::GuestHouseInactive(house_id));
        }

        if details != room.details || capacity != room.capacity {
            let event = Event::RoomUpdated { id: room_id, details, capacity };
            self.persist_and_apply_room(&mut room, &event).await?;
        }
        if let Some(active) = update.active
            && active != room.active
        {
            let event = Event::RoomActiveSet { id: room_id, active };
            self.persist_and_apply_room(&mut room, &event).await?;
            tracing::info!(room = %room_id, active, "room active flag changed");
        }
        Ok(room.info())
    }

    /// Idempotent. Existing allocations are untouched either way.
    pub async fn set_room_active(&self, room_id: Ulid, active: bool) -> Result<RoomInfo, EngineError> {
        self.update_room(
            room_id,
            RoomUpdate {
                active: Some(active),
                ..RoomUpdate::default()
            },
        )
        .await
    }

    // ── Allocation Service ───────────────────────────────────

    /// The only way an allocation comes into existence.
    ///
    /// Holds the room's write lock across the occupancy read, validation,
    /// WAL append and in-memory apply. A lock not acquired within the
    /// engine's timeout yields `EngineError::Busy`.
    pub async fn book(&self, candidate: BookingCandidate) -> Result<BookingOutcome, EngineError> {
        check_guest(&candidate.guest)?;
        if let Some(stay) = candidate.stay()
            && stay.nights() > MAX_STAY_NIGHTS
        {
            return Err(EngineError::LimitExceeded("stay too long"));
        }

        let room_id = candidate.room_id;
        let shared = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let (_gate, mut room) = self
            .bounded(room_id, async {
                let gate = self.enter_commit().await;
                (gate, shared.write_owned().await)
            })
            .await?;

        let decision = match candidate.stay() {
            None => Err(Rejection::InvalidDateRange),
            Some(stay) => {
                let overlap = occupancy::overlapping(&room, &stay);
                validator::validate(&candidate, &room, &overlap)
            }
        };

        let outcome = match decision {
            Err(rejection) => {
                tracing::debug!(
                    room = %room_id,
                    check_in = %candidate.check_in,
                    check_out = %candidate.check_out,
                    reason = rejection.code(),
                    "booking rejected"
                );
                BookingOutcome::Rejected(rejection)
            }
            Ok(stay) => {
                let active = room.allocations.iter().filter(|a| a.is_active()).count();
                if active >= MAX_ALLOCATIONS_PER_ROOM {
                    return Err(EngineError::LimitExceeded("too many allocations on room"));
                }
                let allocation = Allocation {
                    id: Ulid::new(),
                    room_id,
                    guest_house_id: room.guest_house_id,
                    guest: candidate.guest,
                    event_id: candidate.event_id,
                    stay,
                    status: AllocationStatus::Active,
                    created_at: Utc::now(),
                    cancelled_at: None,
                };
                let event = Event::AllocationBooked {
                    allocation: allocation.clone(),
                };
                self.persist_and_apply_room(&mut room, &event).await?;
                tracing::info!(allocation = %allocation.id, room = %room_id, stay = %stay, "allocation booked");
                BookingOutcome::Booked(allocation)
            }
        };

        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => outcome.label())
            .increment(1);
        Ok(outcome)
    }

    /// Release an allocation. Cancelling an already-cancelled allocation is
    /// a successful no-op that returns the stored record.
    pub async fn cancel(&self, allocation_id: Ulid) -> Result<Allocation, EngineError> {
        let room_id = self
            .store
            .room_for_allocation(&allocation_id)
            .ok_or(EngineError::NotFound(allocation_id))?;
        let shared = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let (_gate, mut room) = self
            .bounded(room_id, async {
                let gate = self.enter_commit().await;
                (gate, shared.write_owned().await)
            })
            .await?;

        let current = room
            .allocation(&allocation_id)
            .ok_or(EngineError::NotFound(allocation_id))?;
        if !current.is_active() {
            metrics::counter!(crate::observability::CANCELLATIONS_TOTAL, "result" => "noop")
                .increment(1);
            return Ok(current.clone());
        }

        let event = Event::AllocationCancelled {
            id: allocation_id,
            room_id,
            cancelled_at: Utc::now(),
        };
        self.persist_and_apply_room(&mut room, &event).await?;
        metrics::counter!(crate::observability::CANCELLATIONS_TOTAL, "result" => "cancelled")
            .increment(1);
        tracing::info!(allocation = %allocation_id, room = %room_id, "allocation cancelled");

        room.allocation(&allocation_id)
            .cloned()
            .ok_or(EngineError::NotFound(allocation_id))
    }
}
