use busline_core::payment::{PaymentLedger, PaymentRecord, PaymentStatus};
use busline_core::{CoreError, RiderDirectory, RiderIdentifier};
use busline_inventory::AllocationError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::lifecycle::require_open;
use crate::store::BookingStore;
use crate::{BookingError, BookingResult};

const DEFAULT_CURRENCY: &str = "INR";

fn one_seat() -> u32 {
    1
}

/// Rider's request to pay for seats on a departure. The amount is not part
/// of the request; it comes from the departure's fare.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NewPayment {
    pub rider_id: Uuid,
    pub departure_id: Uuid,
    #[serde(default = "one_seat")]
    pub seat_count: u32,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OperatorPayments {
    pub operator_id: Uuid,
    pub total: i64,
    pub payments: Vec<PaymentRecord>,
}

/// Payment bookkeeping. Provider status changes land here and never touch
/// tickets.
#[derive(Clone)]
pub struct PaymentService {
    ledger: Arc<dyn PaymentLedger>,
    store: Arc<dyn BookingStore>,
    riders: Arc<dyn RiderDirectory>,
}

impl PaymentService {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        store: Arc<dyn BookingStore>,
        riders: Arc<dyn RiderDirectory>,
    ) -> Self {
        Self { ledger, store, riders }
    }

    /// Open a `pending` payment priced at the departure's current fare.
    pub async fn create(&self, input: &NewPayment) -> BookingResult<PaymentRecord> {
        if input.seat_count == 0 {
            return Err(CoreError::ValidationError("seat count must be at least one".to_string()).into());
        }

        let rider = self
            .riders
            .resolve_rider(&RiderIdentifier::Id(input.rider_id))
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| BookingError::RiderNotFound(input.rider_id.to_string()))?;

        let departure = self
            .store
            .get_departure(input.departure_id)
            .await?
            .ok_or(AllocationError::DepartureNotFound(input.departure_id))?;

        let now = Utc::now();
        require_open(&departure, "take payment", now)?;
        if input.seat_count > departure.capacity() {
            return Err(CoreError::ValidationError(format!(
                "departure {} has only {} seats",
                departure.id,
                departure.capacity()
            ))
            .into());
        }

        let currency = input
            .currency
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CURRENCY)
            .to_uppercase();

        let record = PaymentRecord {
            payment_id: format!("pay_{}", Uuid::new_v4().simple()),
            rider_id: rider.id,
            departure_id: departure.id,
            operator_id: departure.operator_id,
            amount: departure.fare.payable() * i64::from(input.seat_count),
            currency,
            status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.ledger.record_payment(&record).await.map_err(BookingError::storage)?;

        tracing::info!(
            "Payment {} of {} {} opened for rider {} on departure {}",
            record.payment_id,
            record.amount,
            record.currency,
            record.rider_id,
            record.departure_id
        );
        Ok(record)
    }

    pub async fn update_status(&self, payment_id: &str, status: PaymentStatus) -> BookingResult<PaymentRecord> {
        let record = self
            .ledger
            .update_payment_status(payment_id, status)
            .await
            .map_err(BookingError::storage)?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", payment_id)))?;

        tracing::info!("Payment {} is now {}", record.payment_id, record.status);
        Ok(record)
    }

    /// Payments an operator has taken, with the summed amount.
    pub async fn for_operator(
        &self,
        operator_id: Uuid,
        status: Option<PaymentStatus>,
    ) -> BookingResult<OperatorPayments> {
        let payments = self
            .ledger
            .payments_for_operator(operator_id, status)
            .await
            .map_err(BookingError::storage)?;
        let total = payments.iter().map(|p| p.amount).sum();

        Ok(OperatorPayments { operator_id, total, payments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBookingStore;
    use busline_core::identity::StaticRiderDirectory;
    use busline_core::payment::MemoryPaymentLedger;
    use busline_core::registry::{RouteSnapshot, VehicleSnapshot};
    use busline_core::{DepartureStatus, DepartureTemplate, ErrorKind, Gender, RiderProfile, Schedule};
    use busline_inventory::{Departure, Fare};
    use busline_shared::Masked;
    use chrono::Duration;

    struct Fixture {
        service: PaymentService,
        store: Arc<MemoryBookingStore>,
        rider: Uuid,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryBookingStore::new());
        let riders = Arc::new(StaticRiderDirectory::new());
        let rider = Uuid::new_v4();
        riders
            .insert(
                RiderProfile {
                    id: rider,
                    display_name: "Hina".into(),
                    contact_email: Masked("hina@example.com".into()),
                    gender: Some(Gender::Female),
                },
                None,
            )
            .unwrap();

        Fixture {
            service: PaymentService::new(Arc::new(MemoryPaymentLedger::new()), store.clone(), riders),
            store,
            rider,
        }
    }

    async fn departure(f: &Fixture, operator_id: Uuid) -> Departure {
        let departs_at = Utc::now() + Duration::hours(12);
        let template = DepartureTemplate {
            operator_id,
            capacity: 4,
            route: RouteSnapshot { start_city: "Sialkot".into(), end_city: "Lahore".into(), stops: vec![] },
            vehicle: VehicleSnapshot {
                bus_number: "SKT-51".into(),
                capacity: 4,
                wifi: true,
                ac: true,
                fuel_type: Default::default(),
                standard: Default::default(),
            },
        };
        let schedule = Schedule {
            service_date: departs_at.date_naive(),
            departure_time: departs_at.format("%H:%M").to_string(),
            arrival_time: departs_at.format("%H:%M").to_string(),
            departs_at,
            arrives_at: departs_at,
        };
        let fare = Fare { actual_price: 1100, discount: 100, promo_code: None };
        let departure =
            Departure::create(template, Uuid::new_v4(), Uuid::new_v4(), schedule, fare, Utc::now()).unwrap();
        f.store.insert_departure(&departure).await.unwrap();
        departure
    }

    fn request(f: &Fixture, departure: &Departure, seat_count: u32) -> NewPayment {
        NewPayment { rider_id: f.rider, departure_id: departure.id, seat_count, currency: None }
    }

    #[tokio::test]
    async fn test_pending_payment_priced_from_fare() {
        let f = fixture();
        let operator = Uuid::new_v4();
        let d = departure(&f, operator).await;

        let record = f.service.create(&request(&f, &d, 2)).await.unwrap();
        assert_eq!(record.status, PaymentStatus::Pending);
        assert_eq!(record.amount, 2000);
        assert_eq!(record.currency, "INR");
        assert_eq!(record.operator_id, operator);

        let settled = f.service.update_status(&record.payment_id, PaymentStatus::Succeeded).await.unwrap();
        assert_eq!(settled.status, PaymentStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_create_checks_rider_and_departure() {
        let f = fixture();
        let d = departure(&f, Uuid::new_v4()).await;

        let mut stranger = request(&f, &d, 1);
        stranger.rider_id = Uuid::new_v4();
        assert!(matches!(f.service.create(&stranger).await.unwrap_err(), BookingError::RiderNotFound(_)));

        let mut nowhere = request(&f, &d, 1);
        nowhere.departure_id = Uuid::new_v4();
        assert_eq!(f.service.create(&nowhere).await.unwrap_err().kind(), ErrorKind::NotFound);

        assert_eq!(f.service.create(&request(&f, &d, 0)).await.unwrap_err().kind(), ErrorKind::Validation);
        assert_eq!(f.service.create(&request(&f, &d, 5)).await.unwrap_err().kind(), ErrorKind::Validation);

        f.store
            .update_departure_status(d.id, DepartureStatus::Cancelled, Utc::now())
            .await
            .unwrap();
        assert_eq!(f.service.create(&request(&f, &d, 1)).await.unwrap_err().kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_operator_total_and_unknown_payment() {
        let f = fixture();
        let operator = Uuid::new_v4();
        let first = departure(&f, operator).await;
        let second = departure(&f, operator).await;
        let elsewhere = departure(&f, Uuid::new_v4()).await;

        let paid = f.service.create(&request(&f, &first, 1)).await.unwrap();
        f.service.create(&request(&f, &second, 3)).await.unwrap();
        f.service.create(&request(&f, &elsewhere, 1)).await.unwrap();
        f.service.update_status(&paid.payment_id, PaymentStatus::Succeeded).await.unwrap();

        let all = f.service.for_operator(operator, None).await.unwrap();
        assert_eq!(all.payments.len(), 2);
        assert_eq!(all.total, 4000);

        let settled = f.service.for_operator(operator, Some(PaymentStatus::Succeeded)).await.unwrap();
        assert_eq!(settled.total, 1000);

        let err = f.service.update_status("pay_missing", PaymentStatus::Failed).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
