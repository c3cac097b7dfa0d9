use axum::response::{IntoResponse, Response};
use axum::Json;
use http::StatusCode;
use serde_json::json;

/// Error taxonomy for the scheduling API. Every rejected request tells the
/// caller whether it failed on validation, authorization, a missing entity,
/// or a booking conflict, so a komting can pick a different slot instead of
/// guessing.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("room is already booked by {conflicting_course}")]
    RoomConflict { conflicting_course: String },

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{error}")]
    Duplicate { error: &'static str, details: String },

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("database error")]
    Database(#[from] sqlx::Error),
}

impl ApiError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Validation error", "details": message, "field": field }),
            ),
            ApiError::RoomConflict { conflicting_course } => (
                StatusCode::CONFLICT,
                json!({
                    "error": "Room conflict",
                    "details": format!("Room is already booked by {conflicting_course}"),
                    "conflicting_course": conflicting_course,
                }),
            ),
            ApiError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                json!({
                    "error": format!("{what} not found"),
                    "details": format!("{what} does not exist or is inactive"),
                }),
            ),
            ApiError::Duplicate { error, details } => (
                StatusCode::CONFLICT,
                json!({ "error": error, "details": details }),
            ),
            ApiError::Unauthorized(details) => (
                StatusCode::UNAUTHORIZED,
                json!({ "error": "Unauthorized", "details": details }),
            ),
            ApiError::Forbidden(details) => (
                StatusCode::FORBIDDEN,
                json!({ "error": "Access denied", "details": details }),
            ),
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "error": "Internal error", "details": "database error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}
