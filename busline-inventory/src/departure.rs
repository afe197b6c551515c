use busline_core::search::DepartureFilter;
use busline_core::{
    CoreError, DepartureStatus, DepartureTemplate, RouteSnapshot, Schedule, VehicleSnapshot,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::layout::create_seat_layout;
use crate::seat::{Seat, SeatNumber};

/// Price snapshot of a departure. Tickets copy the payable amount at booking
/// time and never look back here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Fare {
    pub actual_price: i64,
    #[serde(default)]
    pub discount: i64,
    pub promo_code: Option<String>,
}

impl Fare {
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.actual_price <= 0 {
            return Err(CoreError::ValidationError("actual price must be positive".to_string()));
        }
        if self.discount < 0 || self.discount > self.actual_price {
            return Err(CoreError::ValidationError(
                "discount must be between zero and the actual price".to_string(),
            ));
        }
        Ok(())
    }

    pub fn payable(&self) -> i64 {
        (self.actual_price - self.discount).max(0)
    }
}

/// One scheduled run of a vehicle along a route. Owns its seats.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Departure {
    pub id: Uuid,
    pub operator_id: Uuid,
    pub bus_entity_id: Uuid,
    pub route_id: Uuid,
    pub vehicle: VehicleSnapshot,
    pub route: RouteSnapshot,
    pub schedule: Schedule,
    pub fare: Fare,
    pub status: DepartureStatus,
    pub seats: Vec<Seat>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Departure {
    /// Freeze the registry template into a new departure and generate its
    /// seat layout. Fails for past departures, bad fares and empty buses.
    pub fn create(
        template: DepartureTemplate,
        bus_entity_id: Uuid,
        route_id: Uuid,
        schedule: Schedule,
        fare: Fare,
        now: DateTime<Utc>,
    ) -> Result<Self, CoreError> {
        fare.validate()?;

        if !schedule.is_upcoming(now) {
            return Err(CoreError::ValidationError("departure must be in the future".to_string()));
        }

        let seats = create_seat_layout(template.capacity)?;
        let mut vehicle = template.vehicle;
        vehicle.capacity = template.capacity;

        Ok(Self {
            id: Uuid::new_v4(),
            operator_id: template.operator_id,
            bus_entity_id,
            route_id,
            vehicle,
            route: template.route,
            schedule,
            fare,
            status: DepartureStatus::Scheduled,
            seats,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.seats.len() as u32
    }

    pub fn seat(&self, seat_number: SeatNumber) -> Option<&Seat> {
        self.seats.get(seat_number.index()).filter(|s| s.seat_number == seat_number)
    }

    pub(crate) fn seat_index(&self, seat_number: SeatNumber) -> Option<usize> {
        self.seat(seat_number).map(|_| seat_number.index())
    }

    pub fn free_seat_count(&self) -> usize {
        self.seats.iter().filter(|s| s.is_free()).count()
    }

    pub fn departs_at(&self) -> DateTime<Utc> {
        self.schedule.departs_at
    }

    pub fn is_upcoming(&self, now: DateTime<Utc>) -> bool {
        self.schedule.is_upcoming(now)
    }

    pub fn update_status(&mut self, next: DepartureStatus, now: DateTime<Utc>) -> Result<(), CoreError> {
        self.status = self.status.transition(next)?;
        self.updated_at = now;
        Ok(())
    }

    pub fn matches(&self, filter: &DepartureFilter, now: DateTime<Utc>) -> bool {
        DepartureFilter::city_matches(&filter.start_city, &self.route.start_city)
            && DepartureFilter::city_matches(&filter.end_city, &self.route.end_city)
            && filter.date.map_or(true, |d| d == self.schedule.service_date)
            && filter.operator_id.map_or(true, |id| id == self.operator_id)
            && filter.min_free_seats.map_or(true, |n| self.free_seat_count() >= n as usize)
            && (!filter.upcoming_only || self.is_upcoming(now))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use busline_core::registry::{FuelType, ServiceStandard};
    use chrono::Duration;

    pub(crate) fn template(capacity: u32) -> DepartureTemplate {
        DepartureTemplate {
            operator_id: Uuid::new_v4(),
            capacity,
            route: RouteSnapshot {
                start_city: "Lahore".to_string(),
                end_city: "Islamabad".to_string(),
                stops: vec![],
            },
            vehicle: VehicleSnapshot {
                bus_number: "LEB-1234".to_string(),
                capacity,
                wifi: true,
                ac: true,
                fuel_type: FuelType::Diesel,
                standard: ServiceStandard::Executive,
            },
        }
    }

    pub(crate) fn fare() -> Fare {
        Fare { actual_price: 2500, discount: 500, promo_code: None }
    }

    /// Departure leaving `offset` from now, as seen in UTC.
    pub(crate) fn departure_in(capacity: u32, offset: Duration) -> Departure {
        let departs = Utc::now() + offset;
        let schedule = Schedule {
            service_date: departs.date_naive(),
            departure_time: departs.format("%H:%M").to_string(),
            arrival_time: (departs + Duration::hours(4)).format("%H:%M").to_string(),
            departs_at: departs,
            arrives_at: departs + Duration::hours(4),
        };
        Departure::create(template(capacity), Uuid::new_v4(), Uuid::new_v4(), schedule, fare(), departs - Duration::days(1))
            .unwrap()
    }

    #[test]
    fn test_create_generates_layout_from_template() {
        let departure = departure_in(5, Duration::hours(2));
        assert_eq!(departure.capacity(), 5);
        assert_eq!(departure.vehicle.capacity, 5);
        assert_eq!(departure.status, DepartureStatus::Scheduled);
        assert_eq!(departure.free_seat_count(), 5);
        assert_eq!(departure.fare.payable(), 2000);
    }

    #[test]
    fn test_create_rejects_past_and_bad_fare() {
        let ok = departure_in(2, Duration::hours(2));
        let past = Departure::create(
            template(2),
            Uuid::new_v4(),
            Uuid::new_v4(),
            ok.schedule.clone(),
            fare(),
            ok.schedule.departs_at + Duration::minutes(1),
        );
        assert!(past.is_err());

        let bad_fare = Fare { actual_price: 100, discount: 200, promo_code: None };
        assert!(bad_fare.validate().is_err());
        assert!(Fare { actual_price: 0, discount: 0, promo_code: None }.validate().is_err());
    }

    #[test]
    fn test_filter_matching() {
        let departure = departure_in(4, Duration::hours(2));
        let now = Utc::now();

        let by_city = DepartureFilter { start_city: Some("lahore".to_string()), ..Default::default() };
        assert!(departure.matches(&by_city, now));

        let wrong_city = DepartureFilter { end_city: Some("Karachi".to_string()), ..Default::default() };
        assert!(!departure.matches(&wrong_city, now));

        let too_many = DepartureFilter { min_free_seats: Some(5), ..Default::default() };
        assert!(!departure.matches(&too_many, now));

        let upcoming = DepartureFilter { upcoming_only: true, ..Default::default() };
        assert!(departure.matches(&upcoming, now));
        assert!(!departure.matches(&upcoming, now + Duration::hours(3)));
    }
}
