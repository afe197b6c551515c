use async_trait::async_trait;
use busline_booking::lifecycle;
use busline_booking::{
    AllocationRequest, BookingError, BookingReceipt, BookingResult, BookingStore, DepartureEdit, Ticket,
};
use busline_core::{DepartureStatus, Gender, RouteSnapshot, Schedule, VehicleSnapshot};
use busline_inventory::{AllocationError, Departure, Fare, Seat, SeatNumber};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

/// Postgres-backed departures, seats and tickets.
///
/// Every mutating call is one transaction that starts by locking the
/// departure row (`FOR UPDATE`), then its seat rows in index order, then
/// any ticket rows. Same order everywhere, so no two calls deadlock.
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct DepartureRow {
    id: Uuid,
    operator_id: Uuid,
    bus_entity_id: Uuid,
    route_id: Uuid,
    vehicle: Json<VehicleSnapshot>,
    route: Json<RouteSnapshot>,
    service_date: NaiveDate,
    departure_time: String,
    arrival_time: String,
    departs_at: DateTime<Utc>,
    arrives_at: DateTime<Utc>,
    actual_price: i64,
    discount: i64,
    promo_code: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    departure_id: Uuid,
    seat_number: String,
    neighbor_seat_number: Option<String>,
    booked: bool,
    email: Option<String>,
    gender: Option<String>,
    neighbor_gender: Option<String>,
}

#[derive(sqlx::FromRow)]
struct TicketRow {
    id: Uuid,
    ticket_code: String,
    rider_id: Uuid,
    departure_id: Uuid,
    operator_id: Uuid,
    seat_number: String,
    fare: i64,
    issued_at: DateTime<Utc>,
    travel_at: DateTime<Utc>,
    status: String,
    booking_key: String,
    cancelled_at: Option<DateTime<Utc>>,
    scanned_at: Option<DateTime<Utc>>,
}

/// Partial unique index over active tickets, see the departures migration.
const ACTIVE_SEAT_CONSTRAINT: &str = "uq_tickets_active_seat";

const DEPARTURE_COLUMNS: &str = "id, operator_id, bus_entity_id, route_id, vehicle, route, service_date, \
     departure_time, arrival_time, departs_at, arrives_at, actual_price, discount, promo_code, status, \
     created_at, updated_at";

const SEAT_COLUMNS: &str =
    "departure_id, seat_number, neighbor_seat_number, booked, email, gender, neighbor_gender";

const TICKET_COLUMNS: &str = "id, ticket_code, rider_id, departure_id, operator_id, seat_number, fare, \
     issued_at, travel_at, status, booking_key, cancelled_at, scanned_at";

fn parse_gender(value: Option<String>) -> BookingResult<Option<Gender>> {
    value.map(|g| g.parse::<Gender>()).transpose().map_err(Into::into)
}

impl SeatRow {
    fn into_seat(self) -> BookingResult<Seat> {
        Ok(Seat {
            seat_number: SeatNumber::parse(&self.seat_number)?,
            neighbor_seat_number: self.neighbor_seat_number.as_deref().map(SeatNumber::parse).transpose()?,
            booked: self.booked,
            email: self.email,
            gender: parse_gender(self.gender)?,
            neighbor_gender: parse_gender(self.neighbor_gender)?,
        })
    }
}

impl DepartureRow {
    fn into_departure(self, seats: Vec<Seat>) -> BookingResult<Departure> {
        Ok(Departure {
            id: self.id,
            operator_id: self.operator_id,
            bus_entity_id: self.bus_entity_id,
            route_id: self.route_id,
            vehicle: self.vehicle.0,
            route: self.route.0,
            schedule: Schedule {
                service_date: self.service_date,
                departure_time: self.departure_time,
                arrival_time: self.arrival_time,
                departs_at: self.departs_at,
                arrives_at: self.arrives_at,
            },
            fare: Fare {
                actual_price: self.actual_price,
                discount: self.discount,
                promo_code: self.promo_code,
            },
            status: self.status.parse::<DepartureStatus>()?,
            seats,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl TicketRow {
    fn into_ticket(self) -> BookingResult<Ticket> {
        Ok(Ticket {
            id: self.id,
            ticket_code: self.ticket_code,
            rider_id: self.rider_id,
            departure_id: self.departure_id,
            operator_id: self.operator_id,
            seat_number: SeatNumber::parse(&self.seat_number)?,
            fare: self.fare,
            issued_at: self.issued_at,
            travel_at: self.travel_at,
            status: self.status.parse()?,
            booking_key: self.booking_key,
            cancelled_at: self.cancelled_at,
            scanned_at: self.scanned_at,
        })
    }
}

fn into_tickets(rows: Vec<TicketRow>) -> BookingResult<Vec<Ticket>> {
    rows.into_iter().map(TicketRow::into_ticket).collect()
}

/// Load a departure with its seats. With `lock` set, the departure row and
/// its seat rows stay locked until the surrounding transaction ends.
async fn fetch_departure(conn: &mut PgConnection, id: Uuid, lock: bool) -> BookingResult<Option<Departure>> {
    let suffix = if lock { " FOR UPDATE" } else { "" };

    let row: Option<DepartureRow> =
        sqlx::query_as(&format!("SELECT {} FROM departures WHERE id = $1{}", DEPARTURE_COLUMNS, suffix))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(BookingError::storage)?;

    let Some(row) = row else {
        return Ok(None);
    };

    let seat_rows: Vec<SeatRow> = sqlx::query_as(&format!(
        "SELECT {} FROM seats WHERE departure_id = $1 ORDER BY seat_index{}",
        SEAT_COLUMNS, suffix
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await
    .map_err(BookingError::storage)?;

    let seats = seat_rows.into_iter().map(SeatRow::into_seat).collect::<BookingResult<Vec<_>>>()?;
    row.into_departure(seats).map(Some)
}

async fn lock_departure(conn: &mut PgConnection, id: Uuid) -> BookingResult<Departure> {
    fetch_departure(conn, id, true)
        .await?
        .ok_or_else(|| AllocationError::DepartureNotFound(id).into())
}

/// Write back only the seats whose state differs from `before`.
async fn persist_seats(conn: &mut PgConnection, before: &Departure, after: &Departure) -> BookingResult<()> {
    for (old, new) in before.seats.iter().zip(after.seats.iter()) {
        if old == new {
            continue;
        }
        sqlx::query(
            "UPDATE seats SET booked = $3, email = $4, gender = $5, neighbor_gender = $6 \
             WHERE departure_id = $1 AND seat_index = $2",
        )
        .bind(after.id)
        .bind(new.seat_number.index() as i32)
        .bind(new.booked)
        .bind(new.email.as_deref())
        .bind(new.gender.map(|g| g.as_str()))
        .bind(new.neighbor_gender.map(|g| g.as_str()))
        .execute(&mut *conn)
        .await
        .map_err(BookingError::storage)?;
    }

    sqlx::query("UPDATE departures SET updated_at = $2 WHERE id = $1")
        .bind(after.id)
        .bind(after.updated_at)
        .execute(&mut *conn)
        .await
        .map_err(BookingError::storage)?;
    Ok(())
}

fn is_active_seat_conflict(constraint: Option<&str>) -> bool {
    constraint == Some(ACTIVE_SEAT_CONSTRAINT)
}

async fn insert_ticket(conn: &mut PgConnection, ticket: &Ticket) -> BookingResult<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO tickets (id, ticket_code, rider_id, departure_id, operator_id, seat_index, seat_number,
                             fare, issued_at, travel_at, status, booking_key, cancelled_at, scanned_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(ticket.id)
    .bind(&ticket.ticket_code)
    .bind(ticket.rider_id)
    .bind(ticket.departure_id)
    .bind(ticket.operator_id)
    .bind(ticket.seat_number.index() as i32)
    .bind(ticket.seat_number.to_string())
    .bind(ticket.fare)
    .bind(ticket.issued_at)
    .bind(ticket.travel_at)
    .bind(ticket.status.as_str())
    .bind(&ticket.booking_key)
    .bind(ticket.cancelled_at)
    .bind(ticket.scanned_at)
    .execute(&mut *conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        // The partial unique index backs up the row locks. Any other
        // unique violation (a duplicate ticket code) is a storage fault.
        Err(sqlx::Error::Database(db)) if is_active_seat_conflict(db.constraint()) => {
            Err(AllocationError::SeatAlreadyBooked(vec![ticket.seat_number]).into())
        }
        Err(e) => Err(BookingError::storage(e)),
    }
}

async fn update_ticket(conn: &mut PgConnection, ticket: &Ticket) -> BookingResult<()> {
    sqlx::query("UPDATE tickets SET status = $2, cancelled_at = $3, scanned_at = $4 WHERE id = $1")
        .bind(ticket.id)
        .bind(ticket.status.as_str())
        .bind(ticket.cancelled_at)
        .bind(ticket.scanned_at)
        .execute(&mut *conn)
        .await
        .map_err(BookingError::storage)?;
    Ok(())
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_departure(&self, departure: &Departure) -> BookingResult<()> {
        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;

        sqlx::query(&format!(
            "INSERT INTO departures ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)",
            DEPARTURE_COLUMNS
        ))
        .bind(departure.id)
        .bind(departure.operator_id)
        .bind(departure.bus_entity_id)
        .bind(departure.route_id)
        .bind(Json(&departure.vehicle))
        .bind(Json(&departure.route))
        .bind(departure.schedule.service_date)
        .bind(&departure.schedule.departure_time)
        .bind(&departure.schedule.arrival_time)
        .bind(departure.schedule.departs_at)
        .bind(departure.schedule.arrives_at)
        .bind(departure.fare.actual_price)
        .bind(departure.fare.discount)
        .bind(departure.fare.promo_code.as_deref())
        .bind(departure.status.as_str())
        .bind(departure.created_at)
        .bind(departure.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(BookingError::storage)?;

        for seat in &departure.seats {
            sqlx::query(
                r#"
                INSERT INTO seats (departure_id, seat_index, seat_number, neighbor_seat_number, booked, email, gender, neighbor_gender)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(departure.id)
            .bind(seat.seat_number.index() as i32)
            .bind(seat.seat_number.to_string())
            .bind(seat.neighbor_seat_number.map(|n| n.to_string()))
            .bind(seat.booked)
            .bind(seat.email.as_deref())
            .bind(seat.gender.map(|g| g.as_str()))
            .bind(seat.neighbor_gender.map(|g| g.as_str()))
            .execute(&mut *tx)
            .await
            .map_err(BookingError::storage)?;
        }

        tx.commit().await.map_err(BookingError::storage)?;
        Ok(())
    }

    async fn get_departure(&self, id: Uuid) -> BookingResult<Option<Departure>> {
        let mut conn = self.pool.acquire().await.map_err(BookingError::storage)?;
        fetch_departure(&mut conn, id, false).await
    }

    async fn list_departures(&self, operator_id: Option<Uuid>) -> BookingResult<Vec<Departure>> {
        let rows: Vec<DepartureRow> = sqlx::query_as(&format!(
            "SELECT {} FROM departures WHERE ($1::uuid IS NULL OR operator_id = $1) ORDER BY departs_at",
            DEPARTURE_COLUMNS
        ))
        .bind(operator_id)
        .fetch_all(&self.pool)
        .await
        .map_err(BookingError::storage)?;

        let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
        let seat_rows: Vec<SeatRow> = sqlx::query_as(&format!(
            "SELECT {} FROM seats WHERE departure_id = ANY($1) ORDER BY departure_id, seat_index",
            SEAT_COLUMNS
        ))
        .bind(&ids[..])
        .fetch_all(&self.pool)
        .await
        .map_err(BookingError::storage)?;

        let mut seats: HashMap<Uuid, Vec<Seat>> = HashMap::new();
        for row in seat_rows {
            let departure_id = row.departure_id;
            seats.entry(departure_id).or_default().push(row.into_seat()?);
        }

        rows.into_iter()
            .map(|row| {
                let layout = seats.remove(&row.id).unwrap_or_default();
                row.into_departure(layout)
            })
            .collect()
    }

    async fn update_departure_status(
        &self,
        id: Uuid,
        status: DepartureStatus,
        now: DateTime<Utc>,
    ) -> BookingResult<Departure> {
        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;
        let mut departure = lock_departure(&mut tx, id).await?;
        departure.update_status(status, now)?;

        sqlx::query("UPDATE departures SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(id)
            .bind(departure.status.as_str())
            .bind(departure.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(BookingError::storage)?;

        tx.commit().await.map_err(BookingError::storage)?;
        Ok(departure)
    }

    async fn edit_departure(
        &self,
        id: Uuid,
        edit: &DepartureEdit,
        tz: FixedOffset,
        now: DateTime<Utc>,
    ) -> BookingResult<Departure> {
        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;
        let mut departure = lock_departure(&mut tx, id).await?;
        lifecycle::edit(&mut departure, edit, tz, now)?;

        sqlx::query(
            r#"
            UPDATE departures
               SET service_date = $2, departure_time = $3, arrival_time = $4, departs_at = $5, arrives_at = $6,
                   actual_price = $7, discount = $8, promo_code = $9, updated_at = $10
             WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(departure.schedule.service_date)
        .bind(&departure.schedule.departure_time)
        .bind(&departure.schedule.arrival_time)
        .bind(departure.schedule.departs_at)
        .bind(departure.schedule.arrives_at)
        .bind(departure.fare.actual_price)
        .bind(departure.fare.discount)
        .bind(departure.fare.promo_code.as_deref())
        .bind(departure.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(BookingError::storage)?;

        tx.commit().await.map_err(BookingError::storage)?;
        Ok(departure)
    }

    async fn allocate_and_issue(
        &self,
        request: &AllocationRequest,
        now: DateTime<Utc>,
    ) -> BookingResult<BookingReceipt> {
        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;
        let before = lock_departure(&mut tx, request.departure_id).await?;

        let prior: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE booking_key = $1 ORDER BY seat_index",
            TICKET_COLUMNS
        ))
        .bind(request.key.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(BookingError::storage)?;
        let prior = into_tickets(prior)?;

        let mut working = before.clone();
        let receipt = lifecycle::book(&mut working, request, &prior, now)?;
        if receipt.replayed {
            // Nothing written; dropping the transaction rolls it back.
            return Ok(receipt);
        }

        persist_seats(&mut tx, &before, &working).await?;
        for ticket in &receipt.tickets {
            insert_ticket(&mut tx, ticket).await?;
        }

        tx.commit().await.map_err(BookingError::storage)?;
        Ok(receipt)
    }

    async fn cancel_ticket(&self, ticket_id: Uuid, now: DateTime<Utc>) -> BookingResult<(Ticket, bool)> {
        let departure_id: Option<Uuid> = sqlx::query_scalar("SELECT departure_id FROM tickets WHERE id = $1")
            .bind(ticket_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(BookingError::storage)?;
        let departure_id = departure_id.ok_or(BookingError::TicketNotFound(ticket_id))?;

        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;
        let before = lock_departure(&mut tx, departure_id).await?;

        let row: Option<TicketRow> =
            sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1 FOR UPDATE", TICKET_COLUMNS))
                .bind(ticket_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(BookingError::storage)?;
        let mut ticket = row.ok_or(BookingError::TicketNotFound(ticket_id))?.into_ticket()?;

        let mut working = before.clone();
        let released = lifecycle::cancel(&mut working, &mut ticket, now)?;

        update_ticket(&mut tx, &ticket).await?;
        persist_seats(&mut tx, &before, &working).await?;
        tx.commit().await.map_err(BookingError::storage)?;

        Ok((ticket, released))
    }

    async fn scan_tickets(
        &self,
        rider_id: Uuid,
        departure_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<Vec<Ticket>> {
        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;
        let departure = lock_departure(&mut tx, departure_id).await?;

        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE rider_id = $1 AND departure_id = $2 ORDER BY seat_index FOR UPDATE",
            TICKET_COLUMNS
        ))
        .bind(rider_id)
        .bind(departure_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(BookingError::storage)?;
        let mut candidates = into_tickets(rows)?;

        let scanned = lifecycle::scan(&departure, &mut candidates, rider_id, now)?;
        for ticket in &scanned {
            update_ticket(&mut tx, ticket).await?;
        }

        tx.commit().await.map_err(BookingError::storage)?;
        Ok(scanned)
    }

    async fn release_seat(
        &self,
        departure_id: Uuid,
        seat_number: SeatNumber,
        now: DateTime<Utc>,
    ) -> BookingResult<bool> {
        let mut tx = self.pool.begin().await.map_err(BookingError::storage)?;
        let before = lock_departure(&mut tx, departure_id).await?;

        let holder: Option<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE departure_id = $1 AND seat_index = $2 AND status IN ('booked', 'scanned')",
            TICKET_COLUMNS
        ))
        .bind(departure_id)
        .bind(seat_number.index() as i32)
        .fetch_optional(&mut *tx)
        .await
        .map_err(BookingError::storage)?;
        let holder = holder.map(TicketRow::into_ticket).transpose()?;

        let mut working = before.clone();
        let released = lifecycle::manual_release(&mut working, seat_number, holder.as_ref(), now)?;
        if released {
            persist_seats(&mut tx, &before, &working).await?;
            tx.commit().await.map_err(BookingError::storage)?;
        }
        Ok(released)
    }

    async fn get_ticket(&self, id: Uuid) -> BookingResult<Option<Ticket>> {
        let row: Option<TicketRow> = sqlx::query_as(&format!("SELECT {} FROM tickets WHERE id = $1", TICKET_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(BookingError::storage)?;
        row.map(TicketRow::into_ticket).transpose()
    }

    async fn tickets_for_rider(&self, rider_id: Uuid) -> BookingResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(&format!(
            "SELECT {} FROM tickets WHERE rider_id = $1 ORDER BY issued_at, seat_index",
            TICKET_COLUMNS
        ))
        .bind(rider_id)
        .fetch_all(&self.pool)
        .await
        .map_err(BookingError::storage)?;
        into_tickets(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seat_row_conversion() {
        let row = SeatRow {
            departure_id: Uuid::new_v4(),
            seat_number: "3".to_string(),
            neighbor_seat_number: Some("4".to_string()),
            booked: true,
            email: Some("a@example.com".to_string()),
            gender: Some("female".to_string()),
            neighbor_gender: None,
        };
        let seat = row.into_seat().unwrap();
        assert_eq!(seat.seat_number, SeatNumber::parse("3").unwrap());
        assert_eq!(seat.neighbor_seat_number, SeatNumber::parse("4").ok());
        assert_eq!(seat.gender, Some(Gender::Female));
    }

    #[test]
    fn test_only_the_active_seat_index_means_conflict() {
        assert!(is_active_seat_conflict(Some("uq_tickets_active_seat")));
        assert!(!is_active_seat_conflict(Some("tickets_ticket_code_key")));
        assert!(!is_active_seat_conflict(None));
    }

    #[test]
    fn test_corrupt_ticket_status_is_reported() {
        let now = Utc::now();
        let row = TicketRow {
            id: Uuid::new_v4(),
            ticket_code: "TICKET-1-ABCDE".to_string(),
            rider_id: Uuid::new_v4(),
            departure_id: Uuid::new_v4(),
            operator_id: Uuid::new_v4(),
            seat_number: "1".to_string(),
            fare: 100,
            issued_at: now,
            travel_at: now,
            status: "refunded".to_string(),
            booking_key: "k".to_string(),
            cancelled_at: None,
            scanned_at: None,
        };
        assert!(row.into_ticket().is_err());
    }
}
