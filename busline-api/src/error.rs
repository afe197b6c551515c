use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use busline_booking::BookingError;
use busline_core::{CoreError, ErrorKind};
use busline_inventory::SeatNumber;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    ValidationError(String),
    NotFoundError(String),
    /// Carries the seats the client should re-render as taken.
    ConflictError(String, Vec<SeatNumber>),
    InvalidStateError(String),
    TooManyRequests,
    InternalServerError(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message, seats) = match self {
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg, None),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg, None),
            AppError::ConflictError(msg, seats) => (StatusCode::CONFLICT, msg, Some(seats)),
            AppError::InvalidStateError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg, None),
            AppError::TooManyRequests => (StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded".to_string(), None),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string(), None)
            }
        };

        let body = match seats {
            Some(seats) => Json(json!({ "error": error_message, "seats": seats })),
            None => Json(json!({ "error": error_message })),
        };

        (status, body).into_response()
    }
}

impl From<BookingError> for AppError {
    fn from(err: BookingError) -> Self {
        let seats = err.conflicting_seats();
        let msg = err.to_string();
        match err.kind() {
            ErrorKind::NotFound => AppError::NotFoundError(msg),
            ErrorKind::Conflict => AppError::ConflictError(msg, seats),
            ErrorKind::InvalidState => AppError::InvalidStateError(msg),
            ErrorKind::Validation => AppError::ValidationError(msg),
            ErrorKind::Internal => AppError::InternalServerError(msg),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        BookingError::from(err).into()
    }
}
