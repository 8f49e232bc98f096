use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

pub type Timestamp = DateTime<Utc>;

/// Half-open stay `[check_in, check_out)`: the guest sleeps the nights from
/// `check_in` up to, but not including, `check_out`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stay {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl Stay {
    /// `None` unless `check_out` is strictly after `check_in`.
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Option<Self> {
        (check_out > check_in).then_some(Self { check_in, check_out })
    }

    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days()
    }

    pub fn overlaps(&self, other: &Stay) -> bool {
        self.check_in < other.check_out && other.check_in < self.check_out
    }

    pub fn contains_night(&self, night: NaiveDate) -> bool {
        self.check_in <= night && night < self.check_out
    }
}

impl fmt::Display for Stay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.check_in, self.check_out)
    }
}

/// Guest gender as far as room sharing is concerned.
///
/// `Unspecified` covers both "not recorded" and anything we do not
/// recognize; it is compatible with every other value.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(from = "String", into = "String")]
pub enum Gender {
    Male,
    Female,
    Other,
    #[default]
    Unspecified,
}

impl Gender {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "male" | "m" | "man" => Gender::Male,
            "female" | "f" | "woman" => Gender::Female,
            "other" => Gender::Other,
            _ => Gender::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::Unspecified => "unspecified",
        }
    }

    pub fn is_compatible_with(self, other: Gender) -> bool {
        self == Gender::Unspecified || other == Gender::Unspecified || self == other
    }
}

impl From<String> for Gender {
    fn from(raw: String) -> Self {
        Gender::parse(&raw)
    }
}

impl From<Option<String>> for Gender {
    fn from(raw: Option<String>) -> Self {
        raw.as_deref().map(Gender::parse).unwrap_or_default()
    }
}

impl From<Gender> for String {
    fn from(g: Gender) -> Self {
        g.as_str().to_string()
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomType {
    Single,
    Double,
    Shared,
}

impl RoomType {
    pub fn from_capacity(capacity: u32) -> Self {
        match capacity {
            0 | 1 => RoomType::Single,
            2 => RoomType::Double,
            _ => RoomType::Shared,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AllocationStatus {
    Active,
    Cancelled,
}

impl AllocationStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => Some(AllocationStatus::Active),
            "cancelled" | "canceled" => Some(AllocationStatus::Cancelled),
            _ => None,
        }
    }
}

/// Who sleeps in the bed. Not an entity of its own: each allocation carries a copy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub gender: Gender,
    /// Link to the participant record this guest was confirmed from, if any.
    pub participant_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub guest_house_id: Ulid,
    pub guest: Guest,
    pub event_id: Option<i64>,
    pub stay: Stay,
    pub status: AllocationStatus,
    pub created_at: Timestamp,
    pub cancelled_at: Option<Timestamp>,
}

impl Allocation {
    pub fn is_active(&self) -> bool {
        self.status == AllocationStatus::Active
    }
}

/// A booking request after guest resolution, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingCandidate {
    pub room_id: Ulid,
    pub guest: Guest,
    pub event_id: Option<i64>,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl BookingCandidate {
    pub fn stay(&self) -> Option<Stay> {
        Stay::new(self.check_in, self.check_out)
    }
}

// ── Registry state ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuestHouseDetails {
    pub name: String,
    pub location: String,
    pub address: Option<String>,
    pub description: Option<String>,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomDetails {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Informational only; never consulted by allocation logic.
    pub facilities: BTreeSet<String>,
}

#[derive(Debug, Clone)]
pub struct GuestHouseState {
    pub id: Ulid,
    pub details: GuestHouseDetails,
    pub active: bool,
    pub created_at: Timestamp,
    /// Room ids in creation order.
    pub rooms: Vec<Ulid>,
    /// Trimmed room number → room id, covering inactive rooms too.
    pub room_numbers: HashMap<String, Ulid>,
}

impl GuestHouseState {
    pub fn new(id: Ulid, details: GuestHouseDetails, active: bool, created_at: Timestamp) -> Self {
        Self {
            id,
            details,
            active,
            created_at,
            rooms: Vec::new(),
            room_numbers: HashMap::new(),
        }
    }

    pub fn add_room(&mut self, room_id: Ulid, room_number: &str) {
        self.rooms.push(room_id);
        self.room_numbers.insert(room_number.to_string(), room_id);
    }
}

#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub guest_house_id: Ulid,
    pub room_number: String,
    pub details: RoomDetails,
    pub capacity: u32,
    pub active: bool,
    pub created_at: Timestamp,
    /// Every allocation ever made for this room, active and cancelled,
    /// sorted by `stay.check_in`.
    pub allocations: Vec<Allocation>,
}

impl RoomState {
    pub fn new(
        id: Ulid,
        guest_house_id: Ulid,
        room_number: String,
        details: RoomDetails,
        capacity: u32,
        active: bool,
        created_at: Timestamp,
    ) -> Self {
        Self {
            id,
            guest_house_id,
            room_number,
            details,
            capacity,
            active,
            created_at,
            allocations: Vec::new(),
        }
    }

    pub fn room_type(&self) -> RoomType {
        RoomType::from_capacity(self.capacity)
    }

    pub fn is_shared(&self) -> bool {
        self.capacity > 1
    }

    /// Insert allocation maintaining sort order by check-in.
    pub fn insert_allocation(&mut self, allocation: Allocation) {
        let pos = self
            .allocations
            .partition_point(|a| a.stay.check_in <= allocation.stay.check_in);
        self.allocations.insert(pos, allocation);
    }

    pub fn allocation(&self, id: &Ulid) -> Option<&Allocation> {
        self.allocations.iter().find(|a| a.id == *id)
    }

    pub fn allocation_mut(&mut self, id: &Ulid) -> Option<&mut Allocation> {
        self.allocations.iter_mut().find(|a| a.id == *id)
    }

    /// Active allocations whose stay intersects `query`.
    /// Binary search skips everything checking in on or after `query.check_out`.
    pub fn overlapping(&self, query: &Stay) -> impl Iterator<Item = &Allocation> {
        let right_bound = self
            .allocations
            .partition_point(|a| a.stay.check_in < query.check_out);
        self.allocations[..right_bound]
            .iter()
            .filter(move |a| a.is_active() && a.stay.check_out > query.check_in)
    }

    pub fn info(&self) -> RoomInfo {
        RoomInfo {
            id: self.id,
            guest_house_id: self.guest_house_id,
            room_number: self.room_number.clone(),
            name: self.details.name.clone(),
            description: self.details.description.clone(),
            facilities: self.details.facilities.clone(),
            capacity: self.capacity,
            room_type: self.room_type(),
            active: self.active,
            created_at: self.created_at,
        }
    }
}

/// The WAL record format. One event per committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    GuestHouseCreated {
        id: Ulid,
        details: GuestHouseDetails,
        active: bool,
        created_at: Timestamp,
    },
    GuestHouseUpdated {
        id: Ulid,
        details: GuestHouseDetails,
    },
    GuestHouseActiveSet {
        id: Ulid,
        active: bool,
    },
    RoomCreated {
        id: Ulid,
        guest_house_id: Ulid,
        room_number: String,
        details: RoomDetails,
        capacity: u32,
        active: bool,
        created_at: Timestamp,
    },
    RoomUpdated {
        id: Ulid,
        details: RoomDetails,
        capacity: u32,
    },
    RoomActiveSet {
        id: Ulid,
        active: bool,
    },
    /// Carries the whole record; compaction re-emits cancelled allocations
    /// through this event with their final status.
    AllocationBooked {
        allocation: Allocation,
    },
    AllocationCancelled {
        id: Ulid,
        room_id: Ulid,
        cancelled_at: Timestamp,
    },
}

// ── Query result types ───────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomInfo {
    pub id: Ulid,
    pub guest_house_id: Ulid,
    pub room_number: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub facilities: BTreeSet<String>,
    pub capacity: u32,
    pub room_type: RoomType,
    pub active: bool,
    pub created_at: Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuestHouseInfo {
    pub id: Ulid,
    pub details: GuestHouseDetails,
    pub active: bool,
    pub created_at: Timestamp,
    pub rooms: Vec<RoomInfo>,
}

/// Advisory view of a room over a date range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancySnapshot {
    pub room_id: Ulid,
    pub stay: Stay,
    pub capacity: u32,
    pub active: bool,
    pub occupant_count: u32,
    pub occupant_genders: BTreeSet<Gender>,
}

impl OccupancySnapshot {
    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.occupant_count)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocationFilter {
    pub event_id: Option<i64>,
    pub room_id: Option<Ulid>,
    pub guest_house_id: Option<Ulid>,
    pub status: Option<AllocationStatus>,
}

impl AllocationFilter {
    pub fn matches(&self, a: &Allocation) -> bool {
        self.event_id.is_none_or(|e| a.event_id == Some(e))
            && self.room_id.is_none_or(|r| a.room_id == r)
            && self.guest_house_id.is_none_or(|g| a.guest_house_id == g)
            && self.status.is_none_or(|s| a.status == s)
    }
}
