use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use busline_booking::{Ticket, TicketInformation};
use busline_core::RiderIdentifier;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub rider: RiderIdentifier,
    pub departure_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct TicketInformationRequest {
    pub rider: RiderIdentifier,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/tickets/{id}", get(get_ticket))
        .route("/v1/tickets/{id}/cancel", put(cancel_ticket))
        .route("/v1/tickets/scan", post(scan_tickets))
        .route("/v1/tickets/information", post(ticket_information))
        .route("/v1/riders/{id}/tickets", get(rider_tickets))
}

async fn get_ticket(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.bookings.get_ticket(id).await?))
}

/// PUT /v1/tickets/:id/cancel
/// The seat is released together with the cancellation.
async fn cancel_ticket(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Ticket>, AppError> {
    Ok(Json(state.bookings.cancel(id).await?))
}

/// POST /v1/tickets/scan
async fn scan_tickets(
    State(state): State<AppState>,
    Json(req): Json<ScanRequest>,
) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(state.bookings.scan_at_boarding(&req.rider, req.departure_id).await?))
}

async fn rider_tickets(State(state): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Vec<Ticket>>, AppError> {
    Ok(Json(state.bookings.tickets_for_rider(id).await?))
}

/// POST /v1/tickets/information
async fn ticket_information(
    State(state): State<AppState>,
    Json(req): Json<TicketInformationRequest>,
) -> Result<Json<Vec<TicketInformation>>, AppError> {
    Ok(Json(state.bookings.ticket_information(&req.rider).await?))
}
