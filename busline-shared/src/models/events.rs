use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod topics {
    pub const BOOKING_CONFIRMED: &str = "booking.confirmed";
    pub const REMINDER_DUE: &str = "departure.reminder_due";
    pub const TICKET_CANCELLED: &str = "ticket.cancelled";
    pub const TICKET_SCANNED: &str = "ticket.scanned";
    pub const SEAT_MAP_CHANGED: &str = "departure.seat_map";
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingConfirmedEvent {
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub ticket_ids: Vec<Uuid>,
    pub departs_at: DateTime<Utc>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct DepartureReminderDueEvent {
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    pub departs_at: DateTime<Utc>,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TicketCancelledEvent {
    pub ticket_id: Uuid,
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    pub seat_number: String,
    pub seat_released: bool,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct TicketScannedEvent {
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    pub ticket_ids: Vec<Uuid>,
    pub timestamp: i64,
}

/// Pushed to live seat-map subscribers whenever seats flip state.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatMapChangedEvent {
    pub departure_id: Uuid,
    pub seat_numbers: Vec<String>,
    pub booked: bool,
    pub timestamp: i64,
}

/// Envelope for everything the booking core emits at its boundary.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BusEvent {
    BookingConfirmed(BookingConfirmedEvent),
    DepartureReminderDue(DepartureReminderDueEvent),
    TicketCancelled(TicketCancelledEvent),
    TicketScanned(TicketScannedEvent),
    SeatMapChanged(SeatMapChangedEvent),
}

impl BusEvent {
    pub fn topic(&self) -> &'static str {
        match self {
            BusEvent::BookingConfirmed(_) => topics::BOOKING_CONFIRMED,
            BusEvent::DepartureReminderDue(_) => topics::REMINDER_DUE,
            BusEvent::TicketCancelled(_) => topics::TICKET_CANCELLED,
            BusEvent::TicketScanned(_) => topics::TICKET_SCANNED,
            BusEvent::SeatMapChanged(_) => topics::SEAT_MAP_CHANGED,
        }
    }

    /// Partition key. Everything about one departure lands on one partition.
    pub fn departure_id(&self) -> Uuid {
        match self {
            BusEvent::BookingConfirmed(e) => e.departure_id,
            BusEvent::DepartureReminderDue(e) => e.departure_id,
            BusEvent::TicketCancelled(e) => e.departure_id,
            BusEvent::TicketScanned(e) => e.departure_id,
            BusEvent::SeatMapChanged(e) => e.departure_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_tagged() {
        let event = BusEvent::SeatMapChanged(SeatMapChangedEvent {
            departure_id: Uuid::nil(),
            seat_numbers: vec!["3".to_string()],
            booked: true,
            timestamp: 0,
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "seat_map_changed");
        assert_eq!(json["data"]["seat_numbers"][0], "3");
        assert_eq!(event.topic(), topics::SEAT_MAP_CHANGED);
    }
}
