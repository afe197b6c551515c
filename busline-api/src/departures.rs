use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use busline_booking::{BookingReceipt, DepartureEdit, NewDeparture};
use busline_core::search::ListDeparturesQuery;
use busline_core::{DepartureFilter, DepartureStatus};
use busline_inventory::{Departure, SeatNumber};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: DepartureStatus,
}

#[derive(Debug, Deserialize)]
pub struct BookSeatsRequest {
    pub rider_id: Uuid,
    pub seat_numbers: Vec<SeatNumber>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseSeatResponse {
    pub departure_id: Uuid,
    pub seat_number: SeatNumber,
    pub released: bool,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/departures", post(create_departure).get(list_departures))
        .route("/v1/departures/search", post(search_departures))
        .route("/v1/departures/{id}", get(get_departure).put(edit_departure))
        .route("/v1/departures/{id}/status", put(update_status))
        .route("/v1/departures/{id}/bookings", post(book_seats))
        .route("/v1/departures/{id}/seats/{seat_number}", delete(release_seat))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/departures
async fn create_departure(
    State(state): State<AppState>,
    Json(req): Json<NewDeparture>,
) -> Result<(StatusCode, Json<Departure>), AppError> {
    let departure = state.departures.create(req).await?;
    Ok((StatusCode::CREATED, Json(departure)))
}

/// GET /v1/departures?upcomingOnly=true&operatorId=...
async fn list_departures(
    State(state): State<AppState>,
    Query(query): Query<ListDeparturesQuery>,
) -> Result<Json<Vec<Departure>>, AppError> {
    Ok(Json(state.departures.list(&query).await?))
}

/// POST /v1/departures/search
async fn search_departures(
    State(state): State<AppState>,
    Json(filter): Json<DepartureFilter>,
) -> Result<Json<Vec<Departure>>, AppError> {
    Ok(Json(state.departures.search(&filter).await?))
}

async fn get_departure(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Departure>, AppError> {
    Ok(Json(state.departures.get(id).await?))
}

/// PUT /v1/departures/:id
/// Times and fare only. Tickets already issued keep what they were sold at.
async fn edit_departure(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DepartureEdit>,
) -> Result<Json<Departure>, AppError> {
    Ok(Json(state.departures.edit(id, &req).await?))
}

/// PUT /v1/departures/:id/status
async fn update_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Departure>, AppError> {
    Ok(Json(state.departures.update_status(id, req.status).await?))
}

/// POST /v1/departures/:id/bookings
/// A replayed retry answers 200 with the original tickets instead of 201.
async fn book_seats(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<BookSeatsRequest>,
) -> Result<(StatusCode, Json<BookingReceipt>), AppError> {
    let receipt = state.bookings.book_seats(req.rider_id, id, &req.seat_numbers).await?;
    let status = if receipt.replayed { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(receipt)))
}

/// DELETE /v1/departures/:id/seats/:seat_number
async fn release_seat(
    State(state): State<AppState>,
    Path((id, seat_number)): Path<(Uuid, String)>,
) -> Result<Json<ReleaseSeatResponse>, AppError> {
    let seat_number = SeatNumber::parse(&seat_number)?;
    let released = state.bookings.release_seat(id, seat_number).await?;
    Ok(Json(ReleaseSeatResponse { departure_id: id, seat_number, released }))
}
