use busline_inventory::SeatNumber;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Retry key of a booking request: departure, rider, and the seat set in
/// ascending order. A client that times out and retries the same request
/// lands on the same key and gets the original tickets back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingKey(String);

impl BookingKey {
    pub fn new(departure_id: Uuid, rider_id: Uuid, seats: &[SeatNumber]) -> Self {
        let mut ordered = seats.to_vec();
        ordered.sort();
        ordered.dedup();
        let seats = ordered.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");
        BookingKey(format!("{}:{}:{}", departure_id.simple(), rider_id.simple(), seats))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seats(list: &[&str]) -> Vec<SeatNumber> {
        list.iter().map(|s| SeatNumber::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_key_ignores_seat_order() {
        let departure = Uuid::new_v4();
        let rider = Uuid::new_v4();

        let a = BookingKey::new(departure, rider, &seats(&["10", "2", "3"]));
        let b = BookingKey::new(departure, rider, &seats(&["3", "10", "2"]));
        assert_eq!(a, b);
        assert!(a.as_str().ends_with(":2,3,10"));

        let other_rider = BookingKey::new(departure, Uuid::new_v4(), &seats(&["2", "3", "10"]));
        assert_ne!(a, other_rider);
    }
}
