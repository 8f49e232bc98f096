use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::directory::DirectoryError;
use crate::engine::{EngineError, Rejection};

/// Everything a handler can fail with, rendered as
/// `{"error": CODE, "message": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
    #[error("tenant: {0}")]
    Tenant(std::io::Error),
    #[error("{0}")]
    BadRequest(String),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Rejected(Rejection::InvalidDateRange) => {
                (StatusCode::UNPROCESSABLE_ENTITY, Rejection::InvalidDateRange.code())
            }
            ApiError::Rejected(r) => (StatusCode::CONFLICT, r.code()),
            ApiError::Engine(e) => match e {
                EngineError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
                EngineError::DuplicateRoomNumber { .. } => {
                    (StatusCode::CONFLICT, "DUPLICATE_ROOM_NUMBER")
                }
                EngineError::GuestHouseInactive(_) => (StatusCode::CONFLICT, "GUEST_HOUSE_INACTIVE"),
                EngineError::CapacityBelowOccupancy { .. } => {
                    (StatusCode::CONFLICT, "CAPACITY_BELOW_OCCUPANCY")
                }
                EngineError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
                EngineError::LimitExceeded(_) => (StatusCode::BAD_REQUEST, "LIMIT_EXCEEDED"),
                EngineError::Busy(_) => (StatusCode::SERVICE_UNAVAILABLE, "BUSY"),
                EngineError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
            },
            ApiError::Directory(DirectoryError::UnknownParticipant(_)) => {
                (StatusCode::NOT_FOUND, "UNKNOWN_PARTICIPANT")
            }
            ApiError::Directory(DirectoryError::Unavailable(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "DIRECTORY_UNAVAILABLE")
            }
            ApiError::Tenant(e) if e.kind() == std::io::ErrorKind::InvalidInput => {
                (StatusCode::BAD_REQUEST, "INVALID_TENANT")
            }
            ApiError::Tenant(_) => (StatusCode::SERVICE_UNAVAILABLE, "TENANT_UNAVAILABLE"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal error".to_string()
        } else {
            if status == StatusCode::SERVICE_UNAVAILABLE {
                tracing::warn!(error = %self, "request refused");
            }
            self.to_string()
        };

        let mut response = (status, Json(ErrorBody { error: code, message })).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

impl From<JsonRejection> for ApiError {
    fn from(r: JsonRejection) -> Self {
        ApiError::BadRequest(r.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(r: PathRejection) -> Self {
        ApiError::BadRequest(r.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(r: QueryRejection) -> Self {
        ApiError::BadRequest(r.body_text())
    }
}
