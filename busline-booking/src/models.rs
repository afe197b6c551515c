use busline_core::{CoreError, RouteSnapshot, VehicleSnapshot};
use busline_inventory::{Departure, Seat, SeatNumber};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::{BookingError, BookingResult};

/// Ticket status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Booked,
    Cancelled,
    Scanned,
}

impl TicketStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TicketStatus::Booked => "booked",
            TicketStatus::Cancelled => "cancelled",
            TicketStatus::Scanned => "scanned",
        }
    }

    /// Booked and scanned tickets both hold their seat.
    pub fn is_active(&self) -> bool {
        matches!(self, TicketStatus::Booked | TicketStatus::Scanned)
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "booked" => Ok(TicketStatus::Booked),
            "cancelled" => Ok(TicketStatus::Cancelled),
            "scanned" => Ok(TicketStatus::Scanned),
            other => Err(CoreError::ValidationError(format!("unknown ticket status '{}'", other))),
        }
    }
}

/// An issued, fare-bearing seat for one rider on one departure. References
/// the departure by id only; later departure edits never touch it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ticket {
    pub id: Uuid,
    pub ticket_code: String,
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    pub operator_id: Uuid,
    pub seat_number: SeatNumber,
    pub fare: i64,
    pub issued_at: DateTime<Utc>,
    pub travel_at: DateTime<Utc>,
    pub status: TicketStatus,
    pub booking_key: String,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub scanned_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Issue a ticket for a freshly allocated seat, copying fare and travel
    /// instant from the departure as they are right now.
    pub fn issue(departure: &Departure, rider_id: Uuid, seat: &Seat, booking_key: &str, now: DateTime<Utc>) -> Self {
        let id = Uuid::new_v4();
        Self {
            id,
            ticket_code: generate_ticket_code(&id, now),
            rider_id,
            departure_id: departure.id,
            operator_id: departure.operator_id,
            seat_number: seat.seat_number,
            fare: departure.fare.payable(),
            issued_at: now,
            travel_at: departure.departs_at(),
            status: TicketStatus::Booked,
            booking_key: booking_key.to_string(),
            cancelled_at: None,
            scanned_at: None,
        }
    }

    /// Transition: Booked → Cancelled
    pub fn cancel(&mut self, now: DateTime<Utc>) -> BookingResult<()> {
        self.require_booked("cancel")?;
        self.status = TicketStatus::Cancelled;
        self.cancelled_at = Some(now);
        Ok(())
    }

    /// Transition: Booked → Scanned (rider boarded)
    pub fn scan(&mut self, now: DateTime<Utc>) -> BookingResult<()> {
        self.require_booked("scan")?;
        self.status = TicketStatus::Scanned;
        self.scanned_at = Some(now);
        Ok(())
    }

    fn require_booked(&self, action: &'static str) -> BookingResult<()> {
        if self.status != TicketStatus::Booked {
            return Err(BookingError::InvalidTicketState {
                ticket_id: self.id,
                status: self.status,
                action,
            });
        }
        Ok(())
    }
}

/// Format: TICKET-{millis}-{5 chars of the ticket id}
fn generate_ticket_code(ticket_id: &Uuid, now: DateTime<Utc>) -> String {
    let short_id = &ticket_id.simple().to_string()[..5];
    format!("TICKET-{}-{}", now.timestamp_millis(), short_id.to_uppercase())
}

/// Result of a booking call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingReceipt {
    pub departure_id: Uuid,
    pub rider_id: Uuid,
    pub tickets: Vec<Ticket>,
    /// True when a retry matched a booking that had already committed.
    pub replayed: bool,
}

impl BookingReceipt {
    pub fn seat_numbers(&self) -> Vec<SeatNumber> {
        self.tickets.iter().map(|t| t.seat_number).collect()
    }
}

/// Ticket joined with the departure facts a conductor or rider needs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TicketInformation {
    pub ticket_id: Uuid,
    pub ticket_code: String,
    pub rider_id: Uuid,
    pub rider_name: String,
    pub departure_id: Uuid,
    pub operator_id: Uuid,
    pub route: RouteSnapshot,
    pub vehicle: VehicleSnapshot,
    pub departure_time: String,
    pub arrival_time: String,
    pub travel_at: DateTime<Utc>,
    pub seat_number: SeatNumber,
    pub fare: i64,
    pub status: TicketStatus,
}

impl TicketInformation {
    pub fn new(ticket: &Ticket, rider_name: &str, departure: &Departure) -> Self {
        Self {
            ticket_id: ticket.id,
            ticket_code: ticket.ticket_code.clone(),
            rider_id: ticket.rider_id,
            rider_name: rider_name.to_string(),
            departure_id: departure.id,
            operator_id: ticket.operator_id,
            route: departure.route.clone(),
            vehicle: departure.vehicle.clone(),
            departure_time: departure.schedule.departure_time.clone(),
            arrival_time: departure.schedule.arrival_time.clone(),
            travel_at: ticket.travel_at,
            seat_number: ticket.seat_number,
            fare: ticket.fare,
            status: ticket.status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        let now = Utc::now();
        Ticket {
            id: Uuid::new_v4(),
            ticket_code: "TICKET-1-ABCDE".to_string(),
            rider_id: Uuid::new_v4(),
            departure_id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            seat_number: SeatNumber::parse("3").unwrap(),
            fare: 2000,
            issued_at: now,
            travel_at: now,
            status: TicketStatus::Booked,
            booking_key: "k".to_string(),
            cancelled_at: None,
            scanned_at: None,
        }
    }

    #[test]
    fn test_ticket_lifecycle() {
        let mut cancelled = ticket();
        cancelled.cancel(Utc::now()).unwrap();
        assert_eq!(cancelled.status, TicketStatus::Cancelled);
        assert!(cancelled.cancelled_at.is_some());
        assert!(!cancelled.status.is_active());

        let mut scanned = ticket();
        scanned.scan(Utc::now()).unwrap();
        assert_eq!(scanned.status, TicketStatus::Scanned);
        assert!(scanned.status.is_active());
    }

    #[test]
    fn test_terminal_states_reject_transitions() {
        let mut cancelled = ticket();
        cancelled.cancel(Utc::now()).unwrap();
        assert!(matches!(
            cancelled.cancel(Utc::now()),
            Err(BookingError::InvalidTicketState { action: "cancel", .. })
        ));
        assert!(cancelled.scan(Utc::now()).is_err());

        let mut scanned = ticket();
        scanned.scan(Utc::now()).unwrap();
        assert!(scanned.cancel(Utc::now()).is_err());
    }

    #[test]
    fn test_ticket_code_format() {
        let id = Uuid::new_v4();
        let code = generate_ticket_code(&id, Utc::now());
        let parts: Vec<&str> = code.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "TICKET");
        assert_eq!(parts[2].len(), 5);
    }
}
