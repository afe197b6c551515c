use std::sync::Arc;

use busline_booking::{
    BookingError, BookingService, BookingStore, DepartureEdit, DepartureService, MemoryBookingStore, MemoryPublisher,
    TicketStatus,
};
use busline_core::identity::StaticRiderDirectory;
use busline_core::registry::{FuelType, RouteSnapshot, ServiceStandard, StaticTemplateRegistry, VehicleSnapshot};
use busline_core::{DepartureStatus, DepartureTemplate, ErrorKind, Gender, RiderIdentifier, RiderProfile, Schedule};
use busline_inventory::{AllocationError, Departure, Fare, SeatNumber};
use busline_shared::Masked;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

struct Harness {
    store: Arc<MemoryBookingStore>,
    riders: Arc<StaticRiderDirectory>,
    bookings: BookingService,
}

fn harness() -> Harness {
    let store = Arc::new(MemoryBookingStore::new());
    let riders = Arc::new(StaticRiderDirectory::new());
    let bookings = BookingService::new(store.clone(), riders.clone(), Arc::new(MemoryPublisher::new()));
    Harness { store, riders, bookings }
}

fn add_rider(h: &Harness, gender: Gender) -> Uuid {
    let id = Uuid::new_v4();
    h.riders
        .insert(
            RiderProfile {
                id,
                display_name: format!("rider-{}", &id.simple().to_string()[..6]),
                contact_email: Masked(format!("{}@example.com", id.simple())),
                gender: Some(gender),
            },
            None,
        )
        .unwrap();
    id
}

fn departure_at(capacity: u32, departs_at: DateTime<Utc>) -> Departure {
    let template = DepartureTemplate {
        operator_id: Uuid::new_v4(),
        capacity,
        route: RouteSnapshot { start_city: "Karachi".into(), end_city: "Hyderabad".into(), stops: vec![] },
        vehicle: VehicleSnapshot {
            bus_number: "KHI-4410".into(),
            capacity,
            wifi: true,
            ac: false,
            fuel_type: FuelType::Diesel,
            standard: ServiceStandard::Economy,
        },
    };
    let schedule = Schedule {
        service_date: departs_at.date_naive(),
        departure_time: departs_at.format("%H:%M").to_string(),
        arrival_time: (departs_at + Duration::hours(3)).format("%H:%M").to_string(),
        departs_at,
        arrives_at: departs_at + Duration::hours(3),
    };
    let fare = Fare { actual_price: 900, discount: 0, promo_code: None };
    Departure::create(template, Uuid::new_v4(), Uuid::new_v4(), schedule, fare, departs_at - Duration::days(1)).unwrap()
}

fn seat(n: &str) -> SeatNumber {
    SeatNumber::parse(n).unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_for_one_seat_have_one_winner() {
    let h = Arc::new(harness());
    let departure = departure_at(10, Utc::now() + Duration::hours(3));
    h.store.insert_departure(&departure).await.unwrap();
    let departure_id = departure.id;

    let mut handles = Vec::new();
    for i in 0..16 {
        let h = h.clone();
        let rider = add_rider(&h, if i % 2 == 0 { Gender::Male } else { Gender::Female });
        // Every party wants seat 5 plus one seat of its own choosing.
        let extra = seat(["1", "3", "7", "9"][i % 4]);
        handles.push(tokio::spawn(async move {
            h.bookings.book_seats(rider, departure_id, &[seat("5"), extra]).await
        }));
    }

    let mut winners = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(receipt) => {
                winners += 1;
                assert_eq!(receipt.tickets.len(), 2);
            }
            Err(e) => assert_eq!(e.kind(), ErrorKind::Conflict, "{}", e),
        }
    }
    assert_eq!(winners, 1);

    let stored = h.store.get_departure(departure_id).await.unwrap().unwrap();
    assert_eq!(stored.free_seat_count(), 8);
}

#[tokio::test]
async fn partial_conflict_books_nothing() {
    let h = harness();
    let departure = departure_at(4, Utc::now() + Duration::hours(3));
    h.store.insert_departure(&departure).await.unwrap();

    let x = add_rider(&h, Gender::Female);
    let y = add_rider(&h, Gender::Male);
    h.bookings.book_seats(x, departure.id, &[seat("1"), seat("2")]).await.unwrap();

    let err = h.bookings.book_seats(y, departure.id, &[seat("2"), seat("3")]).await.unwrap_err();
    assert!(matches!(&err, BookingError::Allocation(AllocationError::SeatAlreadyBooked(s)) if s == &vec![seat("2")]));

    let stored = h.store.get_departure(departure.id).await.unwrap().unwrap();
    assert!(stored.seat(seat("3")).unwrap().is_free());
    assert!(h.bookings.tickets_for_rider(y).await.unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_seat_can_be_rebooked() {
    let h = harness();
    let departure = departure_at(4, Utc::now() + Duration::hours(3));
    h.store.insert_departure(&departure).await.unwrap();

    let x = add_rider(&h, Gender::Female);
    let y = add_rider(&h, Gender::Male);
    let receipt = h.bookings.book_seats(x, departure.id, &[seat("3")]).await.unwrap();
    let ticket = h.bookings.cancel(receipt.tickets[0].id).await.unwrap();
    assert_eq!(ticket.status, TicketStatus::Cancelled);

    let stored = h.store.get_departure(departure.id).await.unwrap().unwrap();
    assert!(stored.seat(seat("3")).unwrap().is_free());

    let rebooked = h.bookings.book_seats(y, departure.id, &[seat("3")]).await.unwrap();
    assert_eq!(rebooked.tickets[0].status, TicketStatus::Booked);

    // A retry of the cancelled booking is a new booking, not a replay.
    let retry = h.bookings.book_seats(x, departure.id, &[seat("3")]).await.unwrap_err();
    assert_eq!(retry.kind(), ErrorKind::Conflict);
}

#[tokio::test]
async fn departed_bus_refuses_bookings() {
    let h = harness();
    let departure = departure_at(4, Utc::now() - Duration::minutes(1));
    h.store.insert_departure(&departure).await.unwrap();

    let x = add_rider(&h, Gender::Other);
    let err = h.bookings.book_seats(x, departure.id, &[seat("1")]).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn completed_departure_refuses_cancel_and_scan() {
    let h = harness();
    let departure = departure_at(4, Utc::now() + Duration::hours(3));
    h.store.insert_departure(&departure).await.unwrap();

    let x = add_rider(&h, Gender::Female);
    let receipt = h.bookings.book_seats(x, departure.id, &[seat("1")]).await.unwrap();
    let ticket_id = receipt.tickets[0].id;

    let now = Utc::now();
    h.store.update_departure_status(departure.id, DepartureStatus::InProgress, now).await.unwrap();
    h.store.update_departure_status(departure.id, DepartureStatus::Completed, now).await.unwrap();

    let err = h.bookings.cancel(ticket_id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(h.bookings.get_ticket(ticket_id).await.unwrap().status, TicketStatus::Booked);
    let stored = h.store.get_departure(departure.id).await.unwrap().unwrap();
    assert!(stored.seat(seat("1")).unwrap().booked);

    let err = h.bookings.scan_at_boarding(&RiderIdentifier::Id(x), departure.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[tokio::test]
async fn cancelled_departure_refuses_boarding() {
    let h = harness();
    let departure = departure_at(4, Utc::now() + Duration::hours(3));
    h.store.insert_departure(&departure).await.unwrap();

    let x = add_rider(&h, Gender::Male);
    h.bookings.book_seats(x, departure.id, &[seat("2")]).await.unwrap();
    h.store
        .update_departure_status(departure.id, DepartureStatus::Cancelled, Utc::now())
        .await
        .unwrap();

    let err = h.bookings.scan_at_boarding(&RiderIdentifier::Id(x), departure.id).await.unwrap_err();
    assert!(matches!(err, BookingError::DepartureNotOpen { action: "scan", .. }));
    assert!(h.bookings.tickets_for_rider(x).await.unwrap().iter().all(|t| t.status == TicketStatus::Booked));
}

#[tokio::test]
async fn edit_keeps_issued_ticket_fare_and_travel_time() {
    let h = harness();
    let departure = departure_at(4, Utc::now() + Duration::days(1));
    h.store.insert_departure(&departure).await.unwrap();
    let service = DepartureService::new(h.store.clone(), Arc::new(StaticTemplateRegistry::new()), 0).unwrap();

    let x = add_rider(&h, Gender::Female);
    let receipt = h.bookings.book_seats(x, departure.id, &[seat("2")]).await.unwrap();

    let edited = service
        .edit(
            departure.id,
            &DepartureEdit {
                date: Some((Utc::now() + Duration::days(3)).date_naive()),
                fare: Some(Fare { actual_price: 1200, discount: 0, promo_code: None }),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(edited.capacity(), 4);
    assert!(edited.seat(seat("2")).unwrap().booked);
    assert_ne!(edited.departs_at(), departure.departs_at());

    let ticket = h.bookings.get_ticket(receipt.tickets[0].id).await.unwrap();
    assert_eq!(ticket.fare, 900);
    assert_eq!(ticket.travel_at, departure.departs_at());

    let y = add_rider(&h, Gender::Male);
    let later = h.bookings.book_seats(y, departure.id, &[seat("3")]).await.unwrap();
    assert_eq!(later.tickets[0].fare, 1200);
    assert_eq!(later.tickets[0].travel_at, edited.departs_at());
}

#[tokio::test]
async fn upcoming_listing_uses_the_current_clock() {
    let store = Arc::new(MemoryBookingStore::new());
    let past = departure_at(2, Utc::now() - Duration::minutes(1));
    let future = departure_at(2, Utc::now() + Duration::minutes(1));
    store.insert_departure(&past).await.unwrap();
    store.insert_departure(&future).await.unwrap();

    let service = DepartureService::new(store, Arc::new(StaticTemplateRegistry::new()), 300).unwrap();
    let upcoming: Vec<Uuid> = service.list_upcoming().await.unwrap().iter().map(|d| d.id).collect();
    assert_eq!(upcoming, vec![future.id]);
}
