use busline_api::resiliency::{CircuitBreaker, GuardedPublisher};
use busline_api::state::{log_publisher, memory_backends, Backends};
use busline_api::{app, worker, AppState};
use busline_booking::EventPublisher;
use busline_store::app_config::{Config, StorageBackend};
use busline_store::{
    DbClient, EventProducer, PgBookingStore, PgPaymentLedger, PgReminderStore, PgRiderDirectory, PgTemplateRegistry,
    RedisClient,
};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "busline_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Busline API on port {}", config.server.port);

    let backends = match config.storage.backend {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            memory_backends(&config.seed)?.backends
        }
        StorageBackend::Postgres => {
            let database = config
                .database
                .as_ref()
                .context("storage.backend = postgres requires a [database] section")?;
            let db = DbClient::new(database).await.context("Failed to connect to Postgres")?;
            db.migrate().await.context("Failed to run migrations")?;

            Backends {
                store: Arc::new(PgBookingStore::new(db.pool.clone())),
                templates: Arc::new(PgTemplateRegistry::new(db.pool.clone())),
                riders: Arc::new(PgRiderDirectory::new(db.pool.clone())),
                payments: Arc::new(PgPaymentLedger::new(db.pool.clone())),
                reminders: Arc::new(PgReminderStore::new(db.pool.clone())),
            }
        }
    };

    let redis = match &config.redis {
        Some(redis) => Some(Arc::new(
            RedisClient::new(&redis.url).await.context("Failed to connect to Redis")?,
        )),
        None => None,
    };

    let downstream: Arc<dyn EventPublisher> = match &config.kafka {
        Some(kafka) => {
            let producer = EventProducer::new(&kafka.brokers).context("Failed to create Kafka producer")?;
            Arc::new(GuardedPublisher::new(
                Arc::new(producer),
                CircuitBreaker::new("kafka", 5, Duration::from_secs(30)),
            ))
        }
        None => log_publisher(),
    };

    let rules = config.business_rules.clone();
    let app_state = AppState::new(backends, downstream, redis, rules.clone())?;
    let lead = chrono::Duration::minutes(rules.reminder_lead_minutes);

    match &config.kafka {
        Some(kafka) => {
            let (brokers, group_id) = (kafka.brokers.clone(), kafka.group_id.clone());
            let reminders = app_state.reminders.clone();
            tokio::spawn(async move {
                if let Err(e) = worker::start_reminder_scheduler(brokers, group_id, reminders, lead).await {
                    tracing::error!("Reminder scheduler stopped: {:#}", e);
                }
            });
        }
        None => {
            tokio::spawn(worker::start_local_reminder_scheduler(
                app_state.sse_tx.subscribe(),
                app_state.reminders.clone(),
                lead,
            ));
        }
    }
    tokio::spawn(worker::start_reminder_dispatcher(
        app_state.reminders.clone(),
        app_state.store.clone(),
        app_state.publisher.clone(),
        Duration::from_secs(rules.reminder_poll_seconds),
    ));

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
