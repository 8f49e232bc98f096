use std::collections::BTreeSet;

use ulid::Ulid;

use crate::model::*;

use super::occupancy;
use super::{Engine, EngineError};

impl Engine {
    // ── Room Registry reads ──────────────────────────────────

    /// Assemble a guest house view. Rooms are listed in creation order.
    pub(super) async fn guest_house_info(
        &self,
        house: &GuestHouseState,
    ) -> Result<GuestHouseInfo, EngineError> {
        let mut rooms = Vec::with_capacity(house.rooms.len());
        for room_id in &house.rooms {
            let Some(room) = self.store.get_room(room_id) else {
                continue;
            };
            let guard = self.bounded(*room_id, room.read_owned()).await?;
            rooms.push(guard.info());
        }
        Ok(GuestHouseInfo {
            id: house.id,
            details: house.details.clone(),
            active: house.active,
            created_at: house.created_at,
            rooms,
        })
    }

    pub async fn get_guest_house(&self, id: Ulid) -> Result<GuestHouseInfo, EngineError> {
        let shared = self
            .store
            .get_guest_house(&id)
            .ok_or(EngineError::NotFound(id))?;
        let house = self.bounded(id, shared.read_owned()).await?;
        self.guest_house_info(&house).await
    }

    pub async fn list_guest_houses(&self) -> Result<Vec<GuestHouseInfo>, EngineError> {
        let mut out = Vec::new();
        for id in self.store.guest_house_ids() {
            let Some(shared) = self.store.get_guest_house(&id) else {
                continue;
            };
            let house = self.bounded(id, shared.read_owned()).await?;
            out.push(self.guest_house_info(&house).await?);
        }
        Ok(out)
    }

    pub async fn list_rooms(
        &self,
        guest_house_id: Ulid,
        active_only: bool,
    ) -> Result<Vec<RoomInfo>, EngineError> {
        let info = self.get_guest_house(guest_house_id).await?;
        Ok(info
            .rooms
            .into_iter()
            .filter(|r| !active_only || r.active)
            .collect())
    }

    /// Rooms of a guest house that may currently receive bookings.
    pub async fn list_active_rooms(&self, guest_house_id: Ulid) -> Result<Vec<RoomInfo>, EngineError> {
        self.list_rooms(guest_house_id, true).await
    }

    pub async fn get_room(&self, room_id: Ulid) -> Result<RoomInfo, EngineError> {
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = self.bounded(room_id, room.read_owned()).await?;
        Ok(guard.info())
    }

    // ── Occupancy Index ──────────────────────────────────────
    //
    // Advisory: the answer may be stale by the time the caller acts on it.
    // `book` recomputes under the room's write lock.

    pub async fn overlapping(&self, room_id: Ulid, stay: Stay) -> Result<Vec<Allocation>, EngineError> {
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = self.bounded(room_id, room.read_owned()).await?;
        Ok(occupancy::overlapping(&guard, &stay)
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn occupant_count(&self, room_id: Ulid, stay: Stay) -> Result<u32, EngineError> {
        Ok(self.occupancy(room_id, stay).await?.occupant_count)
    }

    pub async fn occupant_genders(
        &self,
        room_id: Ulid,
        stay: Stay,
    ) -> Result<BTreeSet<Gender>, EngineError> {
        Ok(self.occupancy(room_id, stay).await?.occupant_genders)
    }

    pub async fn occupancy(&self, room_id: Ulid, stay: Stay) -> Result<OccupancySnapshot, EngineError> {
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = self.bounded(room_id, room.read_owned()).await?;
        Ok(occupancy::snapshot(&guard, &stay))
    }

    /// Largest number of active allocations sharing a night in this room.
    pub async fn peak_occupancy(&self, room_id: Ulid) -> Result<u32, EngineError> {
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = self.bounded(room_id, room.read_owned()).await?;
        Ok(occupancy::room_peak_occupancy(&guard))
    }

    // ── Allocations ──────────────────────────────────────────

    pub async fn get_allocation(&self, allocation_id: Ulid) -> Result<Allocation, EngineError> {
        let room_id = self
            .store
            .room_for_allocation(&allocation_id)
            .ok_or(EngineError::NotFound(allocation_id))?;
        let room = self
            .store
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = self.bounded(room_id, room.read_owned()).await?;
        guard
            .allocation(&allocation_id)
            .cloned()
            .ok_or(EngineError::NotFound(allocation_id))
    }

    /// Allocations matching `filter`, ordered by check-in then creation.
    pub async fn list_allocations(
        &self,
        filter: &AllocationFilter,
    ) -> Result<Vec<Allocation>, EngineError> {
        let room_ids = match filter.room_id {
            Some(id) => vec![id],
            None => self.store.room_ids(),
        };

        let mut out = Vec::new();
        for room_id in room_ids {
            if let Some(gh) = filter.guest_house_id
                && self.store.guest_house_of_room(&room_id) != Some(gh)
            {
                continue;
            }
            let Some(room) = self.store.get_room(&room_id) else {
                continue;
            };
            let guard = self.bounded(room_id, room.read_owned()).await?;
            out.extend(guard.allocations.iter().filter(|a| filter.matches(a)).cloned());
        }
        out.sort_by(|a, b| {
            a.stay
                .check_in
                .cmp(&b.stay.check_in)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(out)
    }
}
