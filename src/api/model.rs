use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::directory::ConfirmedGuest;
use crate::engine::{GuestHouseUpdate, RoomUpdate};
use crate::model::*;

// ── Guest houses ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateGuestHouseRequest {
    pub name: String,
    #[serde(default)]
    pub location: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl CreateGuestHouseRequest {
    pub fn details(&self) -> GuestHouseDetails {
        GuestHouseDetails {
            name: self.name.trim().to_string(),
            location: self.location.trim().to_string(),
            address: self.address.clone(),
            description: self.description.clone(),
            contact_person: self.contact_person.clone(),
            phone: self.phone.clone(),
            email: self.email.clone(),
        }
    }
}

/// Partial update; absent fields keep their value.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateGuestHouseRequest {
    pub name: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
}

impl From<UpdateGuestHouseRequest> for GuestHouseUpdate {
    fn from(req: UpdateGuestHouseRequest) -> Self {
        GuestHouseUpdate {
            name: req.name,
            location: req.location,
            address: req.address,
            description: req.description,
            contact_person: req.contact_person,
            phone: req.phone,
            email: req.email,
            active: req.is_active,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GuestHouseResponse {
    pub id: Ulid,
    pub name: String,
    pub location: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub rooms: Vec<RoomResponse>,
}

impl From<GuestHouseInfo> for GuestHouseResponse {
    fn from(value: GuestHouseInfo) -> Self {
        let GuestHouseInfo {
            id,
            details,
            active,
            created_at,
            rooms,
        } = value;
        Self {
            id,
            name: details.name,
            location: details.location,
            address: details.address,
            description: details.description,
            contact_person: details.contact_person,
            phone: details.phone,
            email: details.email,
            is_active: active,
            created_at,
            rooms: rooms.into_iter().map(RoomResponse::from).collect(),
        }
    }
}

// ── Rooms ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateRoomRequest {
    pub room_number: String,
    pub capacity: u32,
    pub room_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub facilities: Vec<String>,
}

impl CreateRoomRequest {
    pub fn details(&self) -> RoomDetails {
        RoomDetails {
            name: self.room_name.clone(),
            description: self.description.clone(),
            facilities: facility_set(&self.facilities),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateRoomRequest {
    pub room_name: Option<String>,
    pub description: Option<String>,
    pub capacity: Option<u32>,
    pub facilities: Option<Vec<String>>,
    pub is_active: Option<bool>,
}

impl From<UpdateRoomRequest> for RoomUpdate {
    fn from(value: UpdateRoomRequest) -> Self {
        RoomUpdate {
            name: value.room_name,
            description: value.description,
            capacity: value.capacity,
            facilities: value.facilities.as_deref().map(facility_set),
            active: value.is_active,
        }
    }
}

fn facility_set(raw: &[String]) -> BTreeSet<String> {
    raw.iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Default, Deserialize)]
pub struct RoomsQuery {
    #[serde(default)]
    pub active_only: bool,
}

#[derive(Debug, Serialize)]
pub struct RoomResponse {
    pub id: Ulid,
    pub guest_house_id: Ulid,
    pub room_number: String,
    pub room_name: Option<String>,
    pub description: Option<String>,
    pub facilities: Vec<String>,
    pub capacity: u32,
    pub room_type: RoomType,
    pub is_active: bool,
    pub created_at: Timestamp,
}

impl From<RoomInfo> for RoomResponse {
    fn from(value: RoomInfo) -> Self {
        Self {
            id: value.id,
            guest_house_id: value.guest_house_id,
            room_number: value.room_number,
            room_name: value.name,
            description: value.description,
            facilities: value.facilities.into_iter().collect(),
            capacity: value.capacity,
            room_type: value.room_type,
            is_active: value.active,
            created_at: value.created_at,
        }
    }
}

// ── Allocations ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct BookingRequest {
    pub room_id: Ulid,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    #[serde(default)]
    pub guest_name: String,
    #[serde(default)]
    pub guest_email: String,
    #[serde(default)]
    pub guest_phone: String,
    pub gender: Option<String>,
    pub participant_id: Option<i64>,
    pub event_id: Option<i64>,
}

impl BookingRequest {
    /// Guest as given by the caller, before directory lookup.
    pub fn guest(&self) -> Guest {
        Guest {
            name: self.guest_name.trim().to_string(),
            email: self.guest_email.trim().to_string(),
            phone: self.guest_phone.trim().to_string(),
            gender: Gender::from(self.gender.clone()),
            participant_id: self.participant_id,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AllocationQuery {
    pub event_id: Option<i64>,
    pub room_id: Option<Ulid>,
    pub guest_house_id: Option<Ulid>,
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AllocationResponse {
    pub id: Ulid,
    pub room_id: Ulid,
    pub guest_house_id: Ulid,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: String,
    pub gender: Gender,
    pub participant_id: Option<i64>,
    pub event_id: Option<i64>,
    pub check_in_date: NaiveDate,
    pub check_out_date: NaiveDate,
    pub nights: i64,
    pub status: AllocationStatus,
    pub created_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
}

impl From<Allocation> for AllocationResponse {
    fn from(value: Allocation) -> Self {
        let nights = value.stay.nights();
        Self {
            id: value.id,
            room_id: value.room_id,
            guest_house_id: value.guest_house_id,
            guest_name: value.guest.name,
            guest_email: value.guest.email,
            guest_phone: value.guest.phone,
            gender: value.guest.gender,
            participant_id: value.guest.participant_id,
            event_id: value.event_id,
            check_in_date: value.stay.check_in,
            check_out_date: value.stay.check_out,
            nights,
            status: value.status,
            created_at: value.created_at,
            cancelled_at: value.cancelled_at,
        }
    }
}

// ── Occupancy ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct OccupantsQuery {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct OccupancyResponse {
    pub room_id: Ulid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub capacity: u32,
    pub is_active: bool,
    pub current_occupants: u32,
    pub remaining: u32,
    pub occupant_genders: Vec<Gender>,
}

impl From<OccupancySnapshot> for OccupancyResponse {
    fn from(value: OccupancySnapshot) -> Self {
        let remaining = value.remaining();
        Self {
            room_id: value.room_id,
            check_in: value.stay.check_in,
            check_out: value.stay.check_out,
            capacity: value.capacity,
            is_active: value.active,
            current_occupants: value.occupant_count,
            remaining,
            occupant_genders: value.occupant_genders.into_iter().collect(),
        }
    }
}

// ── Confirmed guests ─────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UpsertConfirmedGuestRequest {
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub gender: Option<String>,
    pub event_id: Option<i64>,
}

impl UpsertConfirmedGuestRequest {
    pub fn into_guest(self, participant_id: i64) -> ConfirmedGuest {
        ConfirmedGuest {
            participant_id,
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            gender: Gender::from(self.gender),
            event_id: self.event_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmedGuestResponse {
    pub participant_id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: Gender,
    pub event_id: Option<i64>,
    pub display_text: String,
}

impl From<ConfirmedGuest> for ConfirmedGuestResponse {
    fn from(value: ConfirmedGuest) -> Self {
        let display_text = if value.email.is_empty() {
            value.name.clone()
        } else {
            format!("{} ({})", value.name, value.email)
        };
        Self {
            participant_id: value.participant_id,
            name: value.name,
            email: value.email,
            phone: value.phone,
            gender: value.gender,
            event_id: value.event_id,
            display_text,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ConfirmedGuestsResponse {
    pub guests: Vec<ConfirmedGuestResponse>,
}
