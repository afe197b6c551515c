use async_trait::async_trait;
use busline_core::DepartureStatus;
use busline_inventory::{AllocationError, Departure, SeatNumber};
use chrono::{DateTime, FixedOffset, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::departures::DepartureEdit;
use crate::lifecycle;
use crate::models::{BookingReceipt, Ticket};
use crate::store::{AllocationRequest, BookingStore};
use crate::{BookingError, BookingResult};

/// In-process store. Each departure sits behind its own async mutex, which
/// is the critical section for allocation. Lock order is always
/// departure, then the ticket table.
#[derive(Default)]
pub struct MemoryBookingStore {
    departures: RwLock<HashMap<Uuid, Arc<Mutex<Departure>>>>,
    tickets: Mutex<HashMap<Uuid, Ticket>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn departure_slot(&self, id: Uuid) -> BookingResult<Arc<Mutex<Departure>>> {
        self.departures
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| AllocationError::DepartureNotFound(id).into())
    }
}

fn active_holder<'a>(
    tickets: &'a HashMap<Uuid, Ticket>,
    departure_id: Uuid,
    seat_number: SeatNumber,
) -> Option<&'a Ticket> {
    tickets
        .values()
        .find(|t| t.departure_id == departure_id && t.seat_number == seat_number && t.status.is_active())
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn insert_departure(&self, departure: &Departure) -> BookingResult<()> {
        self.departures
            .write()
            .await
            .insert(departure.id, Arc::new(Mutex::new(departure.clone())));
        Ok(())
    }

    async fn get_departure(&self, id: Uuid) -> BookingResult<Option<Departure>> {
        let slot = self.departures.read().await.get(&id).cloned();
        match slot {
            Some(slot) => Ok(Some(slot.lock().await.clone())),
            None => Ok(None),
        }
    }

    async fn list_departures(&self, operator_id: Option<Uuid>) -> BookingResult<Vec<Departure>> {
        let slots: Vec<_> = self.departures.read().await.values().cloned().collect();

        let mut departures = Vec::with_capacity(slots.len());
        for slot in slots {
            let departure = slot.lock().await;
            if operator_id.map_or(true, |id| id == departure.operator_id) {
                departures.push(departure.clone());
            }
        }
        departures.sort_by_key(|d| d.departs_at());
        Ok(departures)
    }

    async fn update_departure_status(
        &self,
        id: Uuid,
        status: DepartureStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Departure> {
        let slot = self.departure_slot(id).await?;
        let mut departure = slot.lock().await;
        departure.update_status(status, now)?;
        Ok(departure.clone())
    }

    async fn edit_departure(
        &self,
        id: Uuid,
        edit: &DepartureEdit,
        tz: FixedOffset,
        now: DateTime<Utc>,
    ) -> BookingResult<Departure> {
        let slot = self.departure_slot(id).await?;
        let mut departure = slot.lock().await;

        let mut working = departure.clone();
        lifecycle::edit(&mut working, edit, tz, now)?;
        *departure = working;
        Ok(departure.clone())
    }

    async fn allocate_and_issue(
        &self,
        request: &AllocationRequest,
        now: DateTime<Utc>,
    ) -> BookingResult<BookingReceipt> {
        let slot = self.departure_slot(request.departure_id).await?;
        let mut departure = slot.lock().await;
        let mut tickets = self.tickets.lock().await;

        let prior: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.booking_key == request.key.as_str())
            .cloned()
            .collect();

        let mut working = departure.clone();
        let receipt = lifecycle::book(&mut working, request, &prior, now)?;
        if receipt.replayed {
            return Ok(receipt);
        }

        for ticket in &receipt.tickets {
            if let Some(holder) = active_holder(&tickets, ticket.departure_id, ticket.seat_number) {
                return Err(BookingError::SeatHeldByTicket {
                    departure_id: ticket.departure_id,
                    seat_number: ticket.seat_number,
                    ticket_id: holder.id,
                });
            }
        }

        for ticket in &receipt.tickets {
            tickets.insert(ticket.id, ticket.clone());
        }
        *departure = working;

        Ok(receipt)
    }

    async fn cancel_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> BookingResult<(Ticket, bool)> {
        let departure_id = self
            .tickets
            .lock()
            .await
            .get(&ticket_id)
            .map(|t| t.departure_id)
            .ok_or(BookingError::TicketNotFound(ticket_id))?;

        let slot = self.departure_slot(departure_id).await?;
        let mut departure = slot.lock().await;
        let mut tickets = self.tickets.lock().await;

        let mut ticket = tickets
            .get(&ticket_id)
            .cloned()
            .ok_or(BookingError::TicketNotFound(ticket_id))?;
        let mut working = departure.clone();
        let released = lifecycle::cancel(&mut working, &mut ticket, now)?;

        tickets.insert(ticket.id, ticket.clone());
        *departure = working;

        Ok((ticket, released))
    }

    async fn scan_tickets(
        &self,
        rider_id: Uuid,
        departure_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<Ticket>> {
        let slot = self.departure_slot(departure_id).await?;
        let departure = slot.lock().await;
        let mut tickets = self.tickets.lock().await;

        let mut candidates: Vec<Ticket> = tickets
            .values()
            .filter(|t| t.rider_id == rider_id && t.departure_id == departure_id)
            .cloned()
            .collect();
        candidates.sort_by_key(|t| t.seat_number);

        let scanned = lifecycle::scan(&departure, &mut candidates, rider_id, now)?;
        for ticket in &scanned {
            tickets.insert(ticket.id, ticket.clone());
        }
        Ok(scanned)
    }

    async fn release_seat(
        &self,
        departure_id: Uuid,
        seat_number: SeatNumber,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        let slot = self.departure_slot(departure_id).await?;
        let mut departure = slot.lock().await;
        let tickets = self.tickets.lock().await;

        let holder = active_holder(&tickets, departure_id, seat_number);
        lifecycle::manual_release(&mut departure, seat_number, holder, now)
    }

    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>> {
        Ok(self.tickets.lock().await.get(&id).cloned())
    }

    async fn tickets_for_rider(&self, rider_id: Uuid) -> BookingResult<Vec<Ticket>> {
        let mut tickets: Vec<Ticket> = self
            .tickets
            .lock()
            .await
            .values()
            .filter(|t| t.rider_id == rider_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| (t.issued_at, t.seat_number));
        Ok(tickets)
    }
}
