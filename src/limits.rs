//! Hard caps on tenant-controlled input. Every limit here surfaces as
//! `EngineError::LimitExceeded` or a tenant-manager error, never a panic.

pub const MAX_TENANTS: usize = 1024;
pub const MAX_TENANT_NAME_LEN: usize = 128;

pub const MAX_GUEST_HOUSES_PER_TENANT: usize = 1_000;
pub const MAX_ROOMS_PER_GUEST_HOUSE: usize = 500;
pub const MAX_ALLOCATIONS_PER_ROOM: usize = 50_000;

pub const MAX_NAME_LEN: usize = 200;
pub const MAX_ROOM_NUMBER_LEN: usize = 32;
pub const MAX_TEXT_LEN: usize = 2_000;
pub const MAX_FACILITIES: usize = 64;

pub const MAX_ROOM_CAPACITY: u32 = 64;

/// Longest single stay, in nights.
pub const MAX_STAY_NIGHTS: i64 = 366;
