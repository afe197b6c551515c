use async_trait::async_trait;
use busline_core::DepartureStatus;
use busline_inventory::{Departure, SeatClaim, SeatNumber};
use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::departures::DepartureEdit;
use crate::idempotency::BookingKey;
use crate::models::{BookingReceipt, Ticket};
use crate::BookingResult;

/// Everything one booking transaction needs.
#[derive(Debug, Clone)]
pub struct AllocationRequest {
    pub departure_id: Uuid,
    pub rider_id: Uuid,
    pub claims: Vec<SeatClaim>,
    pub key: BookingKey,
}

/// Durable home of departures (with their seats) and tickets.
///
/// Implementations must run each mutating call as one unit against the
/// departure it touches: seat state and ticket rows commit together or not
/// at all, and two calls on the same departure never interleave.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_departure(&self, departure: &Departure) -> BookingResult<()>;

    async fn get_departure(&self, id: Uuid) -> BookingResult<Option<Departure>>;

    async fn list_departures(&self, operator_id: Option<Uuid>) -> BookingResult<Vec<Departure>>;

    async fn update_departure_status(
        &self,
        id: Uuid,
        status: DepartureStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Departure>;

    /// Apply an operator edit of times or fare while holding the departure.
    /// `tz` is the zone the edit's wall-clock times are given in.
    async fn edit_departure(
        &self,
        id: Uuid,
        edit: &DepartureEdit,
        tz: FixedOffset,
        now: DateTime<Utc>,
    ) -> BookingResult<Departure>;

    /// Allocate the requested seats and issue their tickets atomically.
    /// A request whose key matches an already committed booking returns
    /// that booking with `replayed = true`.
    async fn allocate_and_issue(
        &self,
        request: &AllocationRequest,
        now: DateTime<Utc>,
    ) -> BookingResult<BookingReceipt>;

    /// Cancel a ticket and free its seat in the same unit. Returns the
    /// updated ticket and whether the seat changed state.
    async fn cancel_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> BookingResult<(Ticket, bool)>;

    /// Mark every booked ticket of the rider on the departure as scanned.
    async fn scan_tickets(
        &self,
        rider_id: Uuid,
        departure_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<Ticket>>;

    /// Manual seat release by an operator. Refused while an active ticket
    /// holds the seat.
    async fn release_seat(
        &self,
        departure_id: Uuid,
        seat_number: SeatNumber,
        now: DateTime<Utc>,
    ) -> BookingResult<bool>;

    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>>;

    async fn tickets_for_rider(&self, rider_id: Uuid) -> BookingResult<Vec<Ticket>>;
}
