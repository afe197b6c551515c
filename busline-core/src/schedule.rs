//! Departure time math and the departure status machine.
//!
//! Operators enter a service date plus wall-clock `HH:MM` strings in the
//! operator's local zone. Everything downstream (tickets, reminders, the
//! "upcoming" filter) works on absolute UTC instants computed here.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// Build a fixed zone from a signed minute offset east of UTC.
pub fn offset_from_minutes(minutes: i32) -> CoreResult<FixedOffset> {
    minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or_else(|| CoreError::ValidationError(format!("utc offset out of range: {} minutes", minutes)))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time_of_day(value: &str) -> CoreResult<NaiveTime> {
    let trimmed = value.trim();
    NaiveTime::parse_from_str(trimmed, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
        .map_err(|_| CoreError::ValidationError(format!("invalid time of day '{}', expected HH:MM", value)))
}

pub fn compute_departure_instant(
    date: NaiveDate,
    time_of_day: &str,
    tz: FixedOffset,
) -> CoreResult<DateTime<Utc>> {
    let time = parse_time_of_day(time_of_day)?;
    local_instant(date, time, tz)
}

/// Arrival on the same civil date, rolled forward one day when the trip
/// crosses midnight. Never earlier than the departure instant.
pub fn compute_arrival_instant(
    date: NaiveDate,
    departure_time: &str,
    arrival_time: &str,
    tz: FixedOffset,
) -> CoreResult<DateTime<Utc>> {
    let departs_at = compute_departure_instant(date, departure_time, tz)?;
    let arrival = local_instant(date, parse_time_of_day(arrival_time)?, tz)?;

    if arrival < departs_at {
        Ok(arrival + Duration::hours(24))
    } else {
        Ok(arrival)
    }
}

pub fn travel_duration(
    date: NaiveDate,
    departure_time: &str,
    arrival_time: &str,
    tz: FixedOffset,
) -> CoreResult<Duration> {
    let departs_at = compute_departure_instant(date, departure_time, tz)?;
    let arrives_at = compute_arrival_instant(date, departure_time, arrival_time, tz)?;
    Ok(arrives_at - departs_at)
}

fn local_instant(date: NaiveDate, time: NaiveTime, tz: FixedOffset) -> CoreResult<DateTime<Utc>> {
    tz.from_local_datetime(&date.and_time(time))
        .single()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| CoreError::ValidationError(format!("ambiguous local time {} {}", date, time)))
}

/// Computed timetable of one departure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schedule {
    pub service_date: NaiveDate,
    pub departure_time: String,
    pub arrival_time: String,
    pub departs_at: DateTime<Utc>,
    pub arrives_at: DateTime<Utc>,
}

impl Schedule {
    pub fn compute(
        service_date: NaiveDate,
        departure_time: &str,
        arrival_time: &str,
        tz: FixedOffset,
    ) -> CoreResult<Self> {
        let departs_at = compute_departure_instant(service_date, departure_time, tz)?;
        let arrives_at = compute_arrival_instant(service_date, departure_time, arrival_time, tz)?;

        Ok(Self {
            service_date,
            departure_time: parse_time_of_day(departure_time)?.format("%H:%M").to_string(),
            arrival_time: parse_time_of_day(arrival_time)?.format("%H:%M").to_string(),
            departs_at,
            arrives_at,
        })
    }

    pub fn travel_duration(&self) -> Duration {
        self.arrives_at - self.departs_at
    }

    /// Evaluated against the caller's clock every time; never cached.
    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.departs_at > now
    }
}

/// Lifecycle of a departure. Only explicit operator actions move it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DepartureStatus {
    #[default]
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl DepartureStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DepartureStatus::Scheduled => "scheduled",
            DepartureStatus::InProgress => "in-progress",
            DepartureStatus::Completed => "completed",
            DepartureStatus::Cancelled => "cancelled",
        }
    }

    pub fn can_transition_to(&self, next: DepartureStatus) -> bool {
        use DepartureStatus::*;
        matches!(
            (self, next),
            (Scheduled, InProgress) | (Scheduled, Cancelled) | (InProgress, Completed) | (InProgress, Cancelled)
        )
    }

    pub fn transition(self, next: DepartureStatus) -> CoreResult<DepartureStatus> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(CoreError::InvalidState(format!(
                "departure cannot move from {} to {}",
                self, next
            )))
        }
    }

    /// Seats can only be sold while the bus has not left.
    pub fn accepts_bookings(&self) -> bool {
        matches!(self, DepartureStatus::Scheduled)
    }
}

impl fmt::Display for DepartureStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DepartureStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(DepartureStatus::Scheduled),
            "in-progress" => Ok(DepartureStatus::InProgress),
            "completed" => Ok(DepartureStatus::Completed),
            "cancelled" => Ok(DepartureStatus::Cancelled),
            other => Err(CoreError::ValidationError(format!("unknown departure status '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ist() -> FixedOffset {
        offset_from_minutes(330).unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_overnight_arrival_rolls_to_next_day() {
        let arrives_at = compute_arrival_instant(date("2024-06-01"), "23:30", "01:15", ist()).unwrap();
        let local = arrives_at.with_timezone(&ist());

        assert_eq!(local.format("%Y-%m-%dT%H:%M").to_string(), "2024-06-02T01:15");
    }

    #[test]
    fn test_same_day_arrival() {
        let arrives_at = compute_arrival_instant(date("2024-06-01"), "08:00", "13:45", ist()).unwrap();
        let local = arrives_at.with_timezone(&ist());

        assert_eq!(local.format("%Y-%m-%dT%H:%M").to_string(), "2024-06-01T13:45");
    }

    #[test]
    fn test_arrival_minus_duration_is_departure() {
        for (dep, arr) in [("08:00", "13:45"), ("23:30", "01:15"), ("00:00", "23:59"), ("12:00", "12:00")] {
            let d = date("2024-06-01");
            let departs_at = compute_departure_instant(d, dep, ist()).unwrap();
            let arrives_at = compute_arrival_instant(d, dep, arr, ist()).unwrap();
            let duration = travel_duration(d, dep, arr, ist()).unwrap();

            assert!(arrives_at >= departs_at);
            assert_eq!(arrives_at - duration, departs_at, "{} -> {}", dep, arr);
        }
    }

    #[test]
    fn test_timezone_is_applied() {
        let departs_at = compute_departure_instant(date("2024-06-01"), "05:30", ist()).unwrap();
        assert_eq!(departs_at.to_rfc3339(), "2024-06-01T00:00:00+00:00");
    }

    #[test]
    fn test_rejects_malformed_time() {
        assert!(matches!(parse_time_of_day("25:00"), Err(CoreError::ValidationError(_))));
        assert!(matches!(parse_time_of_day("noon"), Err(CoreError::ValidationError(_))));
        assert!(parse_time_of_day("07:05:00").is_ok());
    }

    #[test]
    fn test_offset_out_of_range_is_an_error() {
        assert_eq!(offset_from_minutes(-300).unwrap().local_minus_utc(), -18_000);
        assert!(offset_from_minutes(1440).is_err());
        assert!(offset_from_minutes(i32::MAX).is_err());
    }

    #[test]
    fn test_schedule_upcoming_is_strict() {
        let schedule = Schedule::compute(date("2024-06-01"), "9:05", "10:00", ist()).unwrap();
        assert_eq!(schedule.departure_time, "09:05");
        assert!(!schedule.is_upcoming(schedule.departs_at));
        assert!(schedule.is_upcoming(schedule.departs_at - Duration::minutes(1)));
        assert_eq!(schedule.travel_duration(), Duration::minutes(55));
    }

    #[test]
    fn test_status_transitions() {
        use DepartureStatus::*;
        assert_eq!(Scheduled.transition(InProgress).unwrap(), InProgress);
        assert_eq!(InProgress.transition(Completed).unwrap(), Completed);
        assert!(Completed.transition(InProgress).is_err());
        assert!(Cancelled.transition(Scheduled).is_err());
        assert!(Scheduled.transition(Scheduled).is_err());
        assert_eq!("in-progress".parse::<DepartureStatus>().unwrap(), InProgress);
        assert_eq!(serde_json::to_string(&InProgress).unwrap(), "\"in-progress\"");
    }
}
