pub mod models;
pub mod pii;

pub use models::events::{
    BookingConfirmedEvent, BusEvent, DepartureReminderDueEvent, SeatMapChangedEvent,
    TicketCancelledEvent, TicketScannedEvent,
};
pub use pii::Masked;
