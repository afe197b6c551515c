pub mod departures;
pub mod events;
pub mod idempotency;
pub mod lifecycle;
pub mod manager;
pub mod memory;
pub mod models;
pub mod payments;
pub mod reminders;
pub mod store;

pub use departures::{DepartureEdit, DepartureService, NewDeparture};
pub use events::{EventPublisher, FanoutPublisher, LogPublisher, MemoryPublisher};
pub use idempotency::BookingKey;
pub use manager::BookingService;
pub use memory::MemoryBookingStore;
pub use models::{BookingReceipt, Ticket, TicketInformation, TicketStatus};
pub use payments::{NewPayment, OperatorPayments, PaymentService};
pub use reminders::{MemoryReminderStore, ReminderJob, ReminderStore};
pub use store::{AllocationRequest, BookingStore};

use busline_core::{CoreError, ErrorKind};
use busline_inventory::{AllocationError, SeatNumber};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Ticket not found: {0}")]
    TicketNotFound(Uuid),

    #[error("Rider not found: {0}")]
    RiderNotFound(String),

    #[error("No active ticket for rider {rider_id} on departure {departure_id}")]
    NoActiveTicket { rider_id: Uuid, departure_id: Uuid },

    #[error("Ticket {ticket_id} is {status}, cannot {action}")]
    InvalidTicketState {
        ticket_id: Uuid,
        status: TicketStatus,
        action: &'static str,
    },

    #[error("Cannot {action} on departure {departure_id}: {reason}")]
    DepartureNotOpen {
        departure_id: Uuid,
        action: &'static str,
        reason: String,
    },

    #[error("Seat {seat_number} on departure {departure_id} is held by ticket {ticket_id}")]
    SeatHeldByTicket {
        departure_id: Uuid,
        seat_number: SeatNumber,
        ticket_id: Uuid,
    },

    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Allocation(e) => match e {
                AllocationError::DepartureNotFound(_) | AllocationError::SeatNotFound(_) => ErrorKind::NotFound,
                AllocationError::SeatAlreadyBooked(_) => ErrorKind::Conflict,
                AllocationError::DepartureClosed { .. } => ErrorKind::InvalidState,
                AllocationError::InvalidRequest(_) => ErrorKind::Validation,
            },
            BookingError::Core(e) => e.kind(),
            BookingError::TicketNotFound(_)
            | BookingError::RiderNotFound(_)
            | BookingError::NoActiveTicket { .. } => ErrorKind::NotFound,
            BookingError::InvalidTicketState { .. } | BookingError::DepartureNotOpen { .. } => {
                ErrorKind::InvalidState
            }
            BookingError::SeatHeldByTicket { .. } => ErrorKind::Conflict,
            BookingError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Seats a client should re-render as taken.
    pub fn conflicting_seats(&self) -> Vec<SeatNumber> {
        match self {
            BookingError::Allocation(AllocationError::SeatAlreadyBooked(seats)) => seats.clone(),
            BookingError::SeatHeldByTicket { seat_number, .. } => vec![*seat_number],
            _ => Vec::new(),
        }
    }

    pub fn storage(err: impl std::fmt::Display) -> Self {
        BookingError::Storage(err.to_string())
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
