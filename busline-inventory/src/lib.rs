pub mod allocation;
pub mod departure;
pub mod layout;
pub mod seat;

pub use allocation::{allocate, release, AllocationError, SeatClaim};
pub use departure::{Departure, Fare};
pub use layout::create_seat_layout;
pub use seat::{neighbor_of, Seat, SeatNumber};
