use busline_booking::{
    BookingService, BookingStore, DepartureService, EventPublisher, FanoutPublisher, LogPublisher,
    MemoryBookingStore, MemoryReminderStore, PaymentService, ReminderStore,
};
use busline_core::identity::StaticRiderDirectory;
use busline_core::payment::{MemoryPaymentLedger, PaymentLedger};
use busline_core::registry::StaticTemplateRegistry;
use busline_core::{DepartureTemplateSource, RiderDirectory, RiderProfile};
use busline_shared::{BusEvent, Masked};
use busline_store::app_config::{BusinessRules, SeedConfig};
use busline_store::RedisClient;
use std::sync::Arc;
use tokio::sync::broadcast;

#[derive(Clone)]
pub struct AppState {
    pub departures: DepartureService,
    pub bookings: BookingService,
    pub payments: PaymentService,
    pub store: Arc<dyn BookingStore>,
    pub reminders: Arc<dyn ReminderStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub redis: Option<Arc<RedisClient>>,
    pub sse_tx: broadcast::Sender<BusEvent>,
    pub business_rules: BusinessRules,
}

/// Backend-specific collaborators, wired into services by `AppState::new`.
pub struct Backends {
    pub store: Arc<dyn BookingStore>,
    pub templates: Arc<dyn DepartureTemplateSource>,
    pub riders: Arc<dyn RiderDirectory>,
    pub payments: Arc<dyn PaymentLedger>,
    pub reminders: Arc<dyn ReminderStore>,
}

impl AppState {
    /// `downstream` receives every event after live subscribers do.
    pub fn new(
        backends: Backends,
        downstream: Arc<dyn EventPublisher>,
        redis: Option<Arc<RedisClient>>,
        business_rules: BusinessRules,
    ) -> anyhow::Result<Self> {
        let (sse_tx, _) = broadcast::channel(256);
        let publisher: Arc<dyn EventPublisher> = Arc::new(FanoutPublisher::new(sse_tx.clone(), downstream));

        let departures = DepartureService::new(
            backends.store.clone(),
            backends.templates,
            business_rules.utc_offset_minutes,
        )?;
        let bookings = BookingService::new(backends.store.clone(), backends.riders.clone(), publisher.clone());
        let payments = PaymentService::new(backends.payments, backends.store.clone(), backends.riders);

        Ok(Self {
            departures,
            bookings,
            payments,
            store: backends.store,
            reminders: backends.reminders,
            publisher,
            redis,
            sse_tx,
            business_rules,
        })
    }
}

/// In-process backends. The returned directory and registry stay shared
/// with the services so callers can keep registering into them.
pub struct MemoryBackends {
    pub backends: Backends,
    pub riders: Arc<StaticRiderDirectory>,
    pub templates: Arc<StaticTemplateRegistry>,
}

pub fn memory_backends(seed: &SeedConfig) -> anyhow::Result<MemoryBackends> {
    let riders = Arc::new(StaticRiderDirectory::new());
    let templates = Arc::new(StaticTemplateRegistry::new());

    for rider in &seed.riders {
        riders.insert(
            RiderProfile {
                id: rider.id,
                display_name: rider.display_name.clone(),
                contact_email: Masked(rider.contact_email.clone()),
                gender: rider.gender,
            },
            rider.card_token.clone(),
        )?;
    }
    for vehicle in &seed.vehicles {
        templates.register_vehicle(vehicle.bus_entity_id, vehicle.operator_id, vehicle.vehicle.clone())?;
    }
    for route in &seed.routes {
        templates.register_route(route.route_id, route.route.clone())?;
    }
    tracing::info!(
        "Seeded {} rider(s), {} vehicle(s), {} route(s)",
        seed.riders.len(),
        seed.vehicles.len(),
        seed.routes.len()
    );

    Ok(MemoryBackends {
        backends: Backends {
            store: Arc::new(MemoryBookingStore::new()),
            templates: templates.clone(),
            riders: riders.clone(),
            payments: Arc::new(MemoryPaymentLedger::new()),
            reminders: Arc::new(MemoryReminderStore::new()),
        },
        riders,
        templates,
    })
}

/// Publisher used when no broker is configured.
pub fn log_publisher() -> Arc<dyn EventPublisher> {
    Arc::new(LogPublisher)
}
