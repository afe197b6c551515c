pub mod app_config;
pub mod database;
pub mod departure_repo;
pub mod events;
pub mod payment_repo;
pub mod redis_repo;
pub mod registry_repo;
pub mod reminder_repo;

pub use app_config::Config;
pub use database::DbClient;
pub use departure_repo::PgBookingStore;
pub use events::EventProducer;
pub use payment_repo::PgPaymentLedger;
pub use redis_repo::RedisClient;
pub use registry_repo::{PgRiderDirectory, PgTemplateRegistry};
pub use reminder_repo::PgReminderStore;
