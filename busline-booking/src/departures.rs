use busline_core::schedule::offset_from_minutes;
use busline_core::search::ListDeparturesQuery;
use busline_core::{CoreError, DepartureFilter, DepartureStatus, DepartureTemplateSource, Schedule};
use busline_inventory::{Departure, Fare};
use chrono::{FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::store::BookingStore;
use crate::{BookingError, BookingResult};

/// Operator input for a new departure. Times are wall-clock in the
/// operator's zone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDeparture {
    pub bus_entity_id: Uuid,
    pub route_id: Uuid,
    pub date: NaiveDate,
    pub departure_time: String,
    pub arrival_time: String,
    pub fare: Fare,
}

/// Operator changes to an existing departure. Absent fields keep their
/// current value; capacity and seats are not editable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DepartureEdit {
    pub date: Option<NaiveDate>,
    pub departure_time: Option<String>,
    pub arrival_time: Option<String>,
    pub fare: Option<Fare>,
}

impl DepartureEdit {
    pub fn is_empty(&self) -> bool {
        self.date.is_none() && self.departure_time.is_none() && self.arrival_time.is_none() && self.fare.is_none()
    }
}

/// Departure catalog: creation from the registry, listing and search.
#[derive(Clone)]
pub struct DepartureService {
    store: Arc<dyn BookingStore>,
    templates: Arc<dyn DepartureTemplateSource>,
    tz: FixedOffset,
}

impl DepartureService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        templates: Arc<dyn DepartureTemplateSource>,
        utc_offset_minutes: i32,
    ) -> BookingResult<Self> {
        Ok(Self {
            store,
            templates,
            tz: offset_from_minutes(utc_offset_minutes)?,
        })
    }

    pub async fn create(&self, input: NewDeparture) -> BookingResult<Departure> {
        let template = self
            .templates
            .get_departure_template(input.bus_entity_id, input.route_id)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "no vehicle {} or route {} in the registry",
                    input.bus_entity_id, input.route_id
                ))
            })?;

        let schedule = Schedule::compute(input.date, &input.departure_time, &input.arrival_time, self.tz)?;
        let departure = Departure::create(
            template,
            input.bus_entity_id,
            input.route_id,
            schedule,
            input.fare,
            Utc::now(),
        )?;

        self.store.insert_departure(&departure).await?;
        tracing::info!(
            "Created departure {} ({} -> {}) at {} with {} seats",
            departure.id,
            departure.route.start_city,
            departure.route.end_city,
            departure.departs_at(),
            departure.capacity()
        );
        Ok(departure)
    }

    pub async fn get(&self, id: Uuid) -> BookingResult<Departure> {
        self.store
            .get_departure(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("departure {}", id)).into())
    }

    /// Departures that have not left yet, judged against the clock right now.
    pub async fn list_upcoming(&self) -> BookingResult<Vec<Departure>> {
        self.search(&DepartureFilter { upcoming_only: true, ..Default::default() }).await
    }

    pub async fn list(&self, query: &ListDeparturesQuery) -> BookingResult<Vec<Departure>> {
        let now = Utc::now();
        let departures = self.store.list_departures(query.operator_id).await?;
        Ok(departures
            .into_iter()
            .filter(|d| !query.upcoming_only || d.is_upcoming(now))
            .collect())
    }

    pub async fn search(&self, filter: &DepartureFilter) -> BookingResult<Vec<Departure>> {
        filter.validate()?;
        let now = Utc::now();
        let departures = self.store.list_departures(filter.operator_id).await?;
        Ok(departures.into_iter().filter(|d| d.matches(filter, now)).collect())
    }

    /// Reschedule or reprice under the departure's lock.
    pub async fn edit(&self, id: Uuid, edit: &DepartureEdit) -> BookingResult<Departure> {
        let departure = self.store.edit_departure(id, edit, self.tz, Utc::now()).await?;
        tracing::info!(
            "Departure {} now leaves at {} for {}",
            id,
            departure.departs_at(),
            departure.fare.payable()
        );
        Ok(departure)
    }

    pub async fn update_status(&self, id: Uuid, status: DepartureStatus) -> BookingResult<Departure> {
        let departure = self.store.update_departure_status(id, status, Utc::now()).await?;
        tracing::info!("Departure {} is now {}", id, departure.status);
        Ok(departure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBookingStore;
    use busline_core::registry::{RouteSnapshot, StaticTemplateRegistry, VehicleSnapshot};
    use busline_core::ErrorKind;
    use chrono::Duration;

    struct Fixture {
        service: DepartureService,
        bus: Uuid,
        route: Uuid,
    }

    fn fixture() -> Fixture {
        let registry = Arc::new(StaticTemplateRegistry::new());
        let bus = Uuid::new_v4();
        let route = Uuid::new_v4();
        registry
            .register_vehicle(
                bus,
                Uuid::new_v4(),
                VehicleSnapshot {
                    bus_number: "LEA-1234".into(),
                    capacity: 6,
                    wifi: true,
                    ac: true,
                    fuel_type: Default::default(),
                    standard: Default::default(),
                },
            )
            .unwrap();
        registry
            .register_route(
                route,
                RouteSnapshot { start_city: "Lahore".into(), end_city: "Islamabad".into(), stops: vec![] },
            )
            .unwrap();

        let service = DepartureService::new(Arc::new(MemoryBookingStore::new()), registry, 0).unwrap();
        Fixture { service, bus, route }
    }

    fn input(f: &Fixture, date: NaiveDate) -> NewDeparture {
        NewDeparture {
            bus_entity_id: f.bus,
            route_id: f.route,
            date,
            departure_time: "23:30".into(),
            arrival_time: "04:00".into(),
            fare: Fare { actual_price: 2500, discount: 0, promo_code: None },
        }
    }

    #[tokio::test]
    async fn test_create_freezes_template_and_layout() {
        let f = fixture();
        let tomorrow = (Utc::now() + Duration::days(1)).date_naive();
        let departure = f.service.create(input(&f, tomorrow)).await.unwrap();

        assert_eq!(departure.capacity(), 6);
        assert_eq!(departure.route.end_city, "Islamabad");
        assert_eq!(departure.status, DepartureStatus::Scheduled);
        assert_eq!(departure.schedule.travel_duration(), Duration::minutes(270));
        assert_eq!(f.service.get(departure.id).await.unwrap(), departure);
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_template_and_past_date() {
        let f = fixture();
        let yesterday = (Utc::now() - Duration::days(1)).date_naive();
        let err = f.service.create(input(&f, yesterday)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut unknown = input(&f, (Utc::now() + Duration::days(1)).date_naive());
        unknown.route_id = Uuid::new_v4();
        assert_eq!(f.service.create(unknown).await.unwrap_err().kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_search_by_city_and_status_flow() {
        let f = fixture();
        let date = (Utc::now() + Duration::days(2)).date_naive();
        let departure = f.service.create(input(&f, date)).await.unwrap();

        let hits = f
            .service
            .search(&DepartureFilter {
                start_city: Some("lahore".into()),
                date: Some(date),
                min_free_seats: Some(6),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let misses = f
            .service
            .search(&DepartureFilter { end_city: Some("Karachi".into()), ..Default::default() })
            .await
            .unwrap();
        assert!(misses.is_empty());

        assert_eq!(f.service.list_upcoming().await.unwrap().len(), 1);

        let moved = f
            .service
            .edit(departure.id, &DepartureEdit { arrival_time: Some("05:15".into()), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(moved.schedule.travel_duration(), Duration::minutes(345));
        assert_eq!(f.service.get(departure.id).await.unwrap(), moved);

        let cancelled = f.service.update_status(departure.id, DepartureStatus::Cancelled).await.unwrap();
        assert_eq!(cancelled.status, DepartureStatus::Cancelled);
        let err = f.service.update_status(departure.id, DepartureStatus::InProgress).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }
}
