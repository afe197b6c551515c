use busline_core::CoreError;

use crate::seat::{Seat, SeatNumber};

/// Build the fixed seat array of a new departure.
pub fn create_seat_layout(capacity: u32) -> Result<Vec<Seat>, CoreError> {
    if capacity == 0 {
        return Err(CoreError::ValidationError(
            "InvalidCapacity: a departure needs at least one seat".to_string(),
        ));
    }

    let seats = (0..capacity)
        .map(|index| {
            let forward = (index % 2 == 0 && index + 1 < capacity).then(|| SeatNumber::from_index(index + 1));
            Seat::new(SeatNumber::from_index(index), forward)
        })
        .collect();

    Ok(seats)
}
