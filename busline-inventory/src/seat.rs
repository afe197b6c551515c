use busline_core::{CoreError, Gender};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Seat identifier. On the wire it is an opaque string ("1", "2", ...);
/// internally it keeps the 1-based ordinal so neighbors can be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeatNumber(u32);

impl SeatNumber {
    pub fn from_index(index: u32) -> Self {
        SeatNumber(index + 1)
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        let trimmed = value.trim();
        match trimmed.parse::<u32>() {
            Ok(ordinal) if ordinal > 0 && !trimmed.starts_with('0') => Ok(SeatNumber(ordinal)),
            _ => Err(CoreError::ValidationError(format!("invalid seat number '{}'", value))),
        }
    }

    pub fn ordinal(&self) -> u32 {
        self.0
    }

    pub fn index(&self) -> usize {
        (self.0 - 1) as usize
    }
}

impl fmt::Display for SeatNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeatNumber {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SeatNumber::parse(s)
    }
}

impl Serialize for SeatNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SeatNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u32),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => SeatNumber::parse(&text).map_err(serde::de::Error::custom),
            Raw::Number(n) => SeatNumber::parse(&n.to_string()).map_err(serde::de::Error::custom),
        }
    }
}

/// Twin-row pairing: index 0<->1, 2<->3, ... The last seat of an odd layout
/// sits alone. Derived from the ordinal, never stored as a back-reference.
pub fn neighbor_of(seat: SeatNumber, capacity: u32) -> Option<SeatNumber> {
    let index = seat.ordinal() - 1;
    if index >= capacity {
        return None;
    }
    let partner = if index % 2 == 0 { index + 1 } else { index - 1 };
    (partner < capacity).then(|| SeatNumber::from_index(partner))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Seat {
    pub seat_number: SeatNumber,
    /// Forward link only, set on the even-indexed seat of a pair.
    pub neighbor_seat_number: Option<SeatNumber>,
    pub booked: bool,
    pub email: Option<String>,
    pub gender: Option<Gender>,
    pub neighbor_gender: Option<Gender>,
}

impl Seat {
    pub fn new(seat_number: SeatNumber, neighbor_seat_number: Option<SeatNumber>) -> Self {
        Self {
            seat_number,
            neighbor_seat_number,
            booked: false,
            email: None,
            gender: None,
            neighbor_gender: None,
        }
    }

    pub fn is_free(&self) -> bool {
        !self.booked
    }

    pub(crate) fn occupy(&mut self, email: &str, gender: Option<Gender>) {
        self.booked = true;
        self.email = Some(email.to_string());
        self.gender = gender;
    }

    pub(crate) fn vacate(&mut self) {
        self.booked = false;
        self.email = None;
        self.gender = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_non_ordinals() {
        assert_eq!(SeatNumber::parse(" 12 ").unwrap().ordinal(), 12);
        assert!(SeatNumber::parse("0").is_err());
        assert!(SeatNumber::parse("07").is_err());
        assert!(SeatNumber::parse("A1").is_err());
        assert!(SeatNumber::parse("-3").is_err());
    }

    #[test]
    fn test_wire_format_is_string() {
        let seat: SeatNumber = serde_json::from_str("\"4\"").unwrap();
        assert_eq!(serde_json::to_string(&seat).unwrap(), "\"4\"");
        let numeric: SeatNumber = serde_json::from_str("4").unwrap();
        assert_eq!(numeric, seat);
    }

    #[test]
    fn test_neighbor_is_symmetric() {
        let capacity = 5;
        for ordinal in 1..=capacity {
            let seat = SeatNumber::parse(&ordinal.to_string()).unwrap();
            if let Some(neighbor) = neighbor_of(seat, capacity) {
                assert_eq!(neighbor_of(neighbor, capacity), Some(seat));
            }
        }
        assert_eq!(neighbor_of(SeatNumber::parse("5").unwrap(), capacity), None);
        assert_eq!(neighbor_of(SeatNumber::parse("6").unwrap(), capacity), None);
    }
}
