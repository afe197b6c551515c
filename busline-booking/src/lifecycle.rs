//! Transaction bodies shared by every `BookingStore` implementation.
//!
//! Each function runs inside the caller's critical section and mutates the
//! departure and tickets it is handed. Stores persist the results only when
//! the function returns `Ok`.

use busline_core::{CoreError, DepartureStatus, Schedule};
use busline_inventory::{allocate, release, Departure, SeatNumber};
use chrono::{DateTime, FixedOffset, Utc};
use uuid::Uuid;

use crate::departures::DepartureEdit;
use crate::models::{BookingReceipt, Ticket, TicketStatus};
use crate::store::AllocationRequest;
use crate::{BookingError, BookingResult};

/// Replay a committed booking with the same key, or allocate and issue.
/// `prior` holds the tickets already stored under `request.key`.
pub fn book(
    departure: &mut Departure,
    request: &AllocationRequest,
    prior: &[Ticket],
    now: DateTime<Utc>,
) -> BookingResult<BookingReceipt> {
    let mut active: Vec<Ticket> = prior
        .iter()
        .filter(|t| t.status.is_active() && t.booking_key == request.key.as_str())
        .cloned()
        .collect();
    active.sort_by_key(|t| t.seat_number);

    let mut requested: Vec<SeatNumber> = request.claims.iter().map(|c| c.seat_number).collect();
    requested.sort();

    if !active.is_empty() && active.iter().map(|t| t.seat_number).eq(requested.iter().copied()) {
        tracing::info!("Replaying booking {} for rider {}", request.key, request.rider_id);
        return Ok(BookingReceipt {
            departure_id: departure.id,
            rider_id: request.rider_id,
            tickets: active,
            replayed: true,
        });
    }

    let seats = allocate(departure, &request.claims, now)?;
    let tickets = seats
        .iter()
        .map(|seat| Ticket::issue(departure, request.rider_id, seat, request.key.as_str(), now))
        .collect();

    Ok(BookingReceipt {
        departure_id: departure.id,
        rider_id: request.rider_id,
        tickets,
        replayed: false,
    })
}

/// Scheduled and not yet left. Cancelling, editing and taking payment need both.
pub(crate) fn require_open(departure: &Departure, action: &'static str, now: DateTime<Utc>) -> BookingResult<()> {
    let reason = if departure.status != DepartureStatus::Scheduled {
        format!("departure is {}", departure.status)
    } else if !departure.is_upcoming(now) {
        "departure has already left".to_string()
    } else {
        return Ok(());
    };

    Err(BookingError::DepartureNotOpen {
        departure_id: departure.id,
        action,
        reason,
    })
}

/// Cancelled tickets give their seat back; rebooking issues a new ticket.
pub fn cancel(departure: &mut Departure, ticket: &mut Ticket, now: DateTime<Utc>) -> BookingResult<bool> {
    require_open(departure, "cancel", now)?;
    ticket.cancel(now)?;
    Ok(release(departure, ticket.seat_number, now)?)
}

/// Operator release. `holder` is the active ticket on the seat, if any.
pub fn manual_release(
    departure: &mut Departure,
    seat_number: SeatNumber,
    holder: Option<&Ticket>,
    now: DateTime<Utc>,
) -> BookingResult<bool> {
    if let Some(ticket) = holder {
        return Err(BookingError::SeatHeldByTicket {
            departure_id: departure.id,
            seat_number,
            ticket_id: ticket.id,
        });
    }
    Ok(release(departure, seat_number, now)?)
}

/// Scan every booked ticket in `tickets`. Fails when none is booked.
/// Boarding stays open while the bus is running.
pub fn scan(
    departure: &Departure,
    tickets: &mut [Ticket],
    rider_id: Uuid,
    now: DateTime<Utc>,
) -> BookingResult<Vec<Ticket>> {
    if matches!(departure.status, DepartureStatus::Cancelled | DepartureStatus::Completed) {
        return Err(BookingError::DepartureNotOpen {
            departure_id: departure.id,
            action: "scan",
            reason: format!("departure is {}", departure.status),
        });
    }

    let departure_id = departure.id;
    let mut scanned = Vec::new();
    for ticket in tickets.iter_mut().filter(|t| t.status == TicketStatus::Booked) {
        ticket.scan(now)?;
        scanned.push(ticket.clone());
    }

    if scanned.is_empty() {
        return Err(BookingError::NoActiveTicket { rider_id, departure_id });
    }
    Ok(scanned)
}

/// Operator edit of times and fare. Seats and capacity never change here,
/// and tickets already issued keep their own fare and travel instant.
pub fn edit(
    departure: &mut Departure,
    edit: &DepartureEdit,
    tz: FixedOffset,
    now: DateTime<Utc>,
) -> BookingResult<()> {
    if edit.is_empty() {
        return Err(CoreError::ValidationError("nothing to update".to_string()).into());
    }
    require_open(departure, "edit", now)?;

    if let Some(fare) = &edit.fare {
        fare.validate()?;
    }

    let reschedule = edit.date.is_some() || edit.departure_time.is_some() || edit.arrival_time.is_some();
    if reschedule {
        let current = &departure.schedule;
        let schedule = Schedule::compute(
            edit.date.unwrap_or(current.service_date),
            edit.departure_time.as_deref().unwrap_or(&current.departure_time),
            edit.arrival_time.as_deref().unwrap_or(&current.arrival_time),
            tz,
        )?;
        if !schedule.is_upcoming(now) {
            return Err(CoreError::ValidationError("departure must be in the future".to_string()).into());
        }
        departure.schedule = schedule;
    }

    if let Some(fare) = &edit.fare {
        departure.fare = fare.clone();
    }
    departure.updated_at = now;
    Ok(())
}
