use busline_core::{RiderDirectory, RiderIdentifier, RiderProfile};
use busline_inventory::{AllocationError, SeatClaim, SeatNumber};
use busline_shared::{
    BookingConfirmedEvent, BusEvent, SeatMapChangedEvent, TicketCancelledEvent, TicketScannedEvent,
};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::events::{spawn_publish, EventPublisher};
use crate::idempotency::BookingKey;
use crate::models::{BookingReceipt, Ticket, TicketInformation};
use crate::store::{AllocationRequest, BookingStore};
use crate::{BookingError, BookingResult};

/// Coordinates seat allocation with ticket issuance and the ticket lifecycle.
#[derive(Clone)]
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    riders: Arc<dyn RiderDirectory>,
    publisher: Arc<dyn EventPublisher>,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        riders: Arc<dyn RiderDirectory>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self { store, riders, publisher }
    }

    /// Book a party of seats for one rider: every seat or none.
    pub async fn book_seats(
        &self,
        rider_id: Uuid,
        departure_id: Uuid,
        seat_numbers: &[SeatNumber],
    ) -> BookingResult<BookingReceipt> {
        if seat_numbers.is_empty() {
            return Err(AllocationError::InvalidRequest("no seats requested".to_string()).into());
        }

        let rider = self.resolve(&RiderIdentifier::Id(rider_id)).await?;
        let request = AllocationRequest {
            departure_id,
            rider_id,
            claims: seat_numbers
                .iter()
                .map(|seat_number| SeatClaim {
                    seat_number: *seat_number,
                    email: rider.contact_email.expose().clone(),
                    gender: rider.gender,
                })
                .collect(),
            key: BookingKey::new(departure_id, rider_id, seat_numbers),
        };

        let now = Utc::now();
        let receipt = self.store.allocate_and_issue(&request, now).await.map_err(|e| {
            tracing::info!("Booking {} rejected: {}", request.key, e);
            e
        })?;

        if receipt.replayed {
            return Ok(receipt);
        }

        let seat_labels: Vec<String> = receipt.seat_numbers().iter().map(ToString::to_string).collect();
        tracing::info!(
            "Booked seats [{}] on departure {} for rider {}",
            seat_labels.join(", "),
            departure_id,
            rider_id
        );

        let departs_at = receipt.tickets.first().map(|t| t.travel_at).unwrap_or(now);
        spawn_publish(
            self.publisher.clone(),
            vec![
                BusEvent::BookingConfirmed(BookingConfirmedEvent {
                    rider_id,
                    departure_id,
                    seat_numbers: seat_labels.clone(),
                    ticket_ids: receipt.tickets.iter().map(|t| t.id).collect(),
                    departs_at,
                    timestamp: now.timestamp(),
                }),
                BusEvent::SeatMapChanged(SeatMapChangedEvent {
                    departure_id,
                    seat_numbers: seat_labels,
                    booked: true,
                    timestamp: now.timestamp(),
                }),
            ],
        );

        Ok(receipt)
    }

    /// Cancel a ticket. The seat goes back to the free pool in the same unit.
    pub async fn cancel(&self, ticket_id: Uuid) -> BookingResult<Ticket> {
        let now = Utc::now();
        let (ticket, released) = self.store.cancel_ticket(ticket_id, now).await?;

        tracing::info!("Ticket {} cancelled (seat released: {})", ticket.id, released);

        let mut events = vec![BusEvent::TicketCancelled(TicketCancelledEvent {
            ticket_id: ticket.id,
            rider_id: ticket.rider_id,
            departure_id: ticket.departure_id,
            seat_number: ticket.seat_number.to_string(),
            seat_released: released,
            timestamp: now.timestamp(),
        })];
        if released {
            events.push(BusEvent::SeatMapChanged(SeatMapChangedEvent {
                departure_id: ticket.departure_id,
                seat_numbers: vec![ticket.seat_number.to_string()],
                booked: false,
                timestamp: now.timestamp(),
            }));
        }
        spawn_publish(self.publisher.clone(), events);

        Ok(ticket)
    }

    /// Boarding scan by account id or travel card.
    pub async fn scan_at_boarding(
        &self,
        identifier: &RiderIdentifier,
        departure_id: Uuid,
    ) -> BookingResult<Vec<Ticket>> {
        let rider = self.resolve(identifier).await?;
        let now = Utc::now();
        let scanned = self.store.scan_tickets(rider.id, departure_id, now).await?;

        tracing::info!("Scanned {} ticket(s) for rider {} on departure {}", scanned.len(), rider.id, departure_id);

        spawn_publish(
            self.publisher.clone(),
            vec![BusEvent::TicketScanned(TicketScannedEvent {
                rider_id: rider.id,
                departure_id,
                ticket_ids: scanned.iter().map(|t| t.id).collect(),
                timestamp: now.timestamp(),
            })],
        );

        Ok(scanned)
    }

    /// Operator frees a seat that no active ticket holds.
    pub async fn release_seat(&self, departure_id: Uuid, seat_number: SeatNumber) -> BookingResult<bool> {
        let now = Utc::now();
        let released = self.store.release_seat(departure_id, seat_number, now).await?;

        if released {
            spawn_publish(
                self.publisher.clone(),
                vec![BusEvent::SeatMapChanged(SeatMapChangedEvent {
                    departure_id,
                    seat_numbers: vec![seat_number.to_string()],
                    booked: false,
                    timestamp: now.timestamp(),
                })],
            );
        }
        Ok(released)
    }

    pub async fn get_ticket(&self, ticket_id: Uuid) -> BookingResult<Ticket> {
        self.store
            .get_ticket(ticket_id)
            .await?
            .ok_or(BookingError::TicketNotFound(ticket_id))
    }

    pub async fn tickets_for_rider(&self, rider_id: Uuid) -> BookingResult<Vec<Ticket>> {
        self.store.tickets_for_rider(rider_id).await
    }

    /// Tickets of a rider joined with route, vehicle and timetable.
    pub async fn ticket_information(&self, identifier: &RiderIdentifier) -> BookingResult<Vec<TicketInformation>> {
        let rider = self.resolve(identifier).await?;
        let tickets = self.store.tickets_for_rider(rider.id).await?;

        let mut information = Vec::with_capacity(tickets.len());
        for ticket in &tickets {
            let departure = self
                .store
                .get_departure(ticket.departure_id)
                .await?
                .ok_or(AllocationError::DepartureNotFound(ticket.departure_id))?;
            information.push(TicketInformation::new(ticket, &rider.display_name, &departure));
        }
        Ok(information)
    }

    async fn resolve(&self, identifier: &RiderIdentifier) -> BookingResult<RiderProfile> {
        self.riders
            .resolve_rider(identifier)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| BookingError::RiderNotFound(identifier.to_string()))
    }
}
