//! Seat allocation engine.
//!
//! Pure state transitions on a departure's seat array. Callers are expected
//! to hold the departure's critical section (a per-departure mutex or a
//! locked database row) for the whole `allocate` call; this module only
//! guarantees all-or-nothing semantics inside that section.

use busline_core::Gender;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::departure::Departure;
use crate::seat::{neighbor_of, Seat, SeatNumber};

/// One seat requested for one occupant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SeatClaim {
    pub seat_number: SeatNumber,
    pub email: String,
    pub gender: Option<Gender>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    #[error("Departure not found: {0}")]
    DepartureNotFound(Uuid),

    #[error("Seat not found: {0}")]
    SeatNotFound(SeatNumber),

    #[error("Seat already booked: {}", join_seats(.0))]
    SeatAlreadyBooked(Vec<SeatNumber>),

    #[error("Departure {departure_id} is not accepting bookings: {reason}")]
    DepartureClosed { departure_id: Uuid, reason: String },

    #[error("Invalid seat request: {0}")]
    InvalidRequest(String),
}

fn join_seats(seats: &[SeatNumber]) -> String {
    seats.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

/// Book every claimed seat or none of them.
///
/// Claims are checked and applied in ascending seat order. Neighbor genders
/// are propagated only after every seat in the batch is booked, so a pair
/// booked together sees a consistent result regardless of request order.
pub fn allocate(
    departure: &mut Departure,
    claims: &[SeatClaim],
    now: DateTime<Utc>,
) -> Result<Vec<Seat>, AllocationError> {
    if claims.is_empty() {
        return Err(AllocationError::InvalidRequest("no seats requested".to_string()));
    }

    if !departure.status.accepts_bookings() {
        return Err(AllocationError::DepartureClosed {
            departure_id: departure.id,
            reason: format!("status is {}", departure.status),
        });
    }
    if !departure.is_upcoming(now) {
        return Err(AllocationError::DepartureClosed {
            departure_id: departure.id,
            reason: "already departed".to_string(),
        });
    }

    let mut ordered: Vec<&SeatClaim> = claims.iter().collect();
    ordered.sort_by_key(|c| c.seat_number);

    if let Some(pair) = ordered.windows(2).find(|w| w[0].seat_number == w[1].seat_number) {
        return Err(AllocationError::InvalidRequest(format!(
            "seat {} requested twice",
            pair[0].seat_number
        )));
    }

    let mut targets = Vec::with_capacity(ordered.len());
    for claim in &ordered {
        let index = departure
            .seat_index(claim.seat_number)
            .ok_or(AllocationError::SeatNotFound(claim.seat_number))?;
        targets.push((index, *claim));
    }

    let conflicts: Vec<SeatNumber> = targets
        .iter()
        .filter(|(index, _)| departure.seats[*index].booked)
        .map(|(_, claim)| claim.seat_number)
        .collect();
    if !conflicts.is_empty() {
        return Err(AllocationError::SeatAlreadyBooked(conflicts));
    }

    // Phase 1: occupy.
    for (index, claim) in &targets {
        departure.seats[*index].occupy(&claim.email, claim.gender);
    }

    // Phase 2: mirror genders onto neighbors.
    let capacity = departure.capacity();
    for (_, claim) in &targets {
        if let Some(neighbor) = neighbor_of(claim.seat_number, capacity) {
            departure.seats[neighbor.index()].neighbor_gender = claim.gender;
        }
    }

    departure.updated_at = now;

    tracing::debug!(
        "Allocated seats [{}] on departure {}",
        join_seats(&targets.iter().map(|(_, c)| c.seat_number).collect::<Vec<_>>()),
        departure.id
    );

    Ok(targets.iter().map(|(index, _)| departure.seats[*index].clone()).collect())
}

/// Return a seat to the free pool. Returns whether anything changed; a seat
/// that is already free is left alone.
pub fn release(
    departure: &mut Departure,
    seat_number: SeatNumber,
    now: DateTime<Utc>,
) -> Result<bool, AllocationError> {
    let index = departure
        .seat_index(seat_number)
        .ok_or(AllocationError::SeatNotFound(seat_number))?;

    if departure.seats[index].is_free() {
        return Ok(false);
    }

    departure.seats[index].vacate();
    if let Some(neighbor) = neighbor_of(seat_number, departure.capacity()) {
        departure.seats[neighbor.index()].neighbor_gender = None;
    }
    departure.updated_at = now;

    Ok(true)
}
