//! JSON-over-HTTP surface, mounted under `/api/v1`.

mod error;
mod handlers;
pub mod model;

pub use error::{ApiError, ErrorBody};

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{FromRequest, FromRequestParts, MatchedPath, Query, Request};
use axum::http::request::Parts;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::directory::GuestDirectory;
use crate::engine::Engine;
use crate::tenant::TenantManager;

/// Tenant used when a request names none.
pub const DEFAULT_TENANT: &str = "default";

/// Header naming the tenant; wins over the `tenant_context` query parameter.
pub const TENANT_HEADER: &str = "x-tenant-id";

#[derive(Clone)]
pub struct AppState {
    pub tenants: Arc<TenantManager>,
    pub directory: Arc<dyn GuestDirectory>,
}

impl AppState {
    pub fn new(tenants: Arc<TenantManager>, directory: Arc<dyn GuestDirectory>) -> Self {
        Self { tenants, directory }
    }
}

/// The engine of the tenant a request is addressed to, with the tenant's
/// reduced name.
pub struct TenantEngine {
    pub name: String,
    pub engine: Arc<Engine>,
}

#[derive(Deserialize)]
struct TenantQuery {
    tenant_context: Option<String>,
}

fn tenant_name(parts: &Parts) -> String {
    let from_header = parts
        .headers
        .get(TENANT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    if let Some(name) = from_header {
        return name.to_string();
    }
    Query::<TenantQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.tenant_context)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TENANT.to_string())
}

impl FromRequestParts<AppState> for TenantEngine {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let (name, engine) = state
            .tenants
            .get_or_create(&tenant_name(parts))
            .map_err(ApiError::Tenant)?;
        Ok(Self { name, engine })
    }
}

/// `axum::Json` with failures rendered as [`ApiError`].
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

async fn track_metrics(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let method = req.method().to_string();

    let response = next.run(req).await;

    let status = crate::observability::status_class(response.status().as_u16());
    metrics::counter!(
        crate::observability::HTTP_REQUESTS_TOTAL,
        "method" => method.clone(),
        "route" => route.clone(),
        "status" => status
    )
    .increment(1);
    metrics::histogram!(
        crate::observability::HTTP_REQUEST_DURATION_SECONDS,
        "method" => method,
        "route" => route
    )
    .record(started.elapsed().as_secs_f64());
    response
}

fn guest_house_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/guest-houses",
            post(handlers::create_guest_house).get(handlers::list_guest_houses),
        )
        .route(
            "/guest-houses/{id}",
            get(handlers::get_guest_house).put(handlers::update_guest_house),
        )
        .route(
            "/guest-houses/{id}/rooms",
            get(handlers::list_rooms).post(handlers::create_room),
        )
        .route(
            "/guest-houses/rooms/{room_id}",
            get(handlers::get_room).put(handlers::update_room),
        )
}

fn accommodation_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/accommodation/allocations",
            post(handlers::book).get(handlers::list_allocations),
        )
        .route("/accommodation/allocations/{id}", get(handlers::get_allocation))
        .route(
            "/accommodation/allocations/{id}/cancel",
            post(handlers::cancel_allocation),
        )
        .route(
            "/accommodation/rooms/{room_id}/occupants",
            get(handlers::room_occupants),
        )
        .route(
            "/accommodation/confirmed-guests",
            get(handlers::list_confirmed_guests),
        )
        .route(
            "/accommodation/confirmed-guests/{participant_id}",
            put(handlers::upsert_confirmed_guest),
        )
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .merge(guest_house_routes())
        .merge(accommodation_routes())
        .route("/health", get(handlers::health))
        .route_layer(middleware::from_fn(track_metrics));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
