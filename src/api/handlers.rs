use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;
use ulid::Ulid;

use crate::directory::resolve_guest;
use crate::engine::{BookingOutcome, GuestHouseUpdate, Rejection};
use crate::model::{AllocationFilter, AllocationStatus, BookingCandidate, Stay};

use super::model::*;
use super::{ApiError, ApiJson, ApiPath, ApiQuery, AppState, TenantEngine};

pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

// ── Guest houses ─────────────────────────────────────────

pub async fn create_guest_house(
    tenant: TenantEngine,
    ApiJson(req): ApiJson<CreateGuestHouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let engine = &tenant.engine;
    let mut house = engine.create_guest_house(req.details()).await?;
    if req.is_active == Some(false) {
        house = engine
            .update_guest_house(house.id, GuestHouseUpdate::active(false))
            .await?;
    }
    Ok((StatusCode::CREATED, Json(GuestHouseResponse::from(house))))
}

pub async fn list_guest_houses(tenant: TenantEngine) -> Result<impl IntoResponse, ApiError> {
    let houses = tenant.engine.list_guest_houses().await?;
    Ok(Json(
        houses
            .into_iter()
            .map(GuestHouseResponse::from)
            .collect::<Vec<_>>(),
    ))
}

pub async fn get_guest_house(
    tenant: TenantEngine,
    ApiPath(id): ApiPath<Ulid>,
) -> Result<impl IntoResponse, ApiError> {
    let house = tenant.engine.get_guest_house(id).await?;
    Ok(Json(GuestHouseResponse::from(house)))
}

pub async fn update_guest_house(
    tenant: TenantEngine,
    ApiPath(id): ApiPath<Ulid>,
    ApiJson(req): ApiJson<UpdateGuestHouseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let house = tenant.engine.update_guest_house(id, req.into()).await?;
    Ok(Json(GuestHouseResponse::from(house)))
}

// ── Rooms ────────────────────────────────────────────────

pub async fn list_rooms(
    tenant: TenantEngine,
    ApiPath(guest_house_id): ApiPath<Ulid>,
    ApiQuery(query): ApiQuery<RoomsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let rooms = tenant
        .engine
        .list_rooms(guest_house_id, query.active_only)
        .await?;
    Ok(Json(
        rooms.into_iter().map(RoomResponse::from).collect::<Vec<_>>(),
    ))
}

pub async fn create_room(
    tenant: TenantEngine,
    ApiPath(guest_house_id): ApiPath<Ulid>,
    ApiJson(req): ApiJson<CreateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room = tenant
        .engine
        .create_room(guest_house_id, &req.room_number, req.capacity, req.details())
        .await?;
    Ok((StatusCode::CREATED, Json(RoomResponse::from(room))))
}

pub async fn get_room(
    tenant: TenantEngine,
    ApiPath(room_id): ApiPath<Ulid>,
) -> Result<impl IntoResponse, ApiError> {
    let room = tenant.engine.get_room(room_id).await?;
    Ok(Json(RoomResponse::from(room)))
}

/// Also serves as soft delete: `{"is_active": false}`.
pub async fn update_room(
    tenant: TenantEngine,
    ApiPath(room_id): ApiPath<Ulid>,
    ApiJson(req): ApiJson<UpdateRoomRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let room = tenant.engine.update_room(room_id, req.into()).await?;
    Ok(Json(RoomResponse::from(room)))
}

// ── Allocations ──────────────────────────────────────────

pub async fn book(
    State(state): State<AppState>,
    tenant: TenantEngine,
    ApiJson(req): ApiJson<BookingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let guest = resolve_guest(state.directory.as_ref(), &tenant.name, req.guest()).await?;
    if guest.name.is_empty() {
        return Err(ApiError::BadRequest("guest name is required".into()));
    }

    let candidate = BookingCandidate {
        room_id: req.room_id,
        guest,
        event_id: req.event_id,
        check_in: req.check_in_date,
        check_out: req.check_out_date,
    };
    match tenant.engine.book(candidate).await? {
        BookingOutcome::Booked(allocation) => Ok((
            StatusCode::CREATED,
            Json(AllocationResponse::from(allocation)),
        )),
        BookingOutcome::Rejected(rejection) => Err(rejection.into()),
    }
}

pub async fn list_allocations(
    tenant: TenantEngine,
    ApiQuery(query): ApiQuery<AllocationQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(
            AllocationStatus::parse(raw)
                .ok_or_else(|| ApiError::BadRequest(format!("unknown status {raw:?}")))?,
        ),
    };
    let filter = AllocationFilter {
        event_id: query.event_id,
        room_id: query.room_id,
        guest_house_id: query.guest_house_id,
        status,
    };
    let allocations = tenant.engine.list_allocations(&filter).await?;
    Ok(Json(
        allocations
            .into_iter()
            .map(AllocationResponse::from)
            .collect::<Vec<_>>(),
    ))
}

pub async fn get_allocation(
    tenant: TenantEngine,
    ApiPath(id): ApiPath<Ulid>,
) -> Result<impl IntoResponse, ApiError> {
    let allocation = tenant.engine.get_allocation(id).await?;
    Ok(Json(AllocationResponse::from(allocation)))
}

pub async fn cancel_allocation(
    tenant: TenantEngine,
    ApiPath(id): ApiPath<Ulid>,
) -> Result<impl IntoResponse, ApiError> {
    let allocation = tenant.engine.cancel(id).await?;
    Ok(Json(AllocationResponse::from(allocation)))
}

pub async fn room_occupants(
    tenant: TenantEngine,
    ApiPath(room_id): ApiPath<Ulid>,
    ApiQuery(query): ApiQuery<OccupantsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let stay = Stay::new(query.check_in, query.check_out).ok_or(Rejection::InvalidDateRange)?;
    let snapshot = tenant.engine.occupancy(room_id, stay).await?;
    Ok(Json(OccupancyResponse::from(snapshot)))
}

// ── Confirmed guests ─────────────────────────────────────

pub async fn list_confirmed_guests(
    State(state): State<AppState>,
    tenant: TenantEngine,
) -> Result<impl IntoResponse, ApiError> {
    let guests = state.directory.list(&tenant.name).await?;
    Ok(Json(ConfirmedGuestsResponse {
        guests: guests.into_iter().map(ConfirmedGuestResponse::from).collect(),
    }))
}

pub async fn upsert_confirmed_guest(
    State(state): State<AppState>,
    tenant: TenantEngine,
    ApiPath(participant_id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpsertConfirmedGuestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::BadRequest("guest name is required".into()));
    }
    let guest = req.into_guest(participant_id);
    state.directory.upsert(&tenant.name, guest.clone()).await?;
    Ok(Json(ConfirmedGuestResponse::from(guest)))
}
