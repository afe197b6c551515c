use busline_core::{Gender, RouteSnapshot, VehicleSnapshot};
use serde::Deserialize;
use std::env;
use uuid::Uuid;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    pub database: Option<DatabaseConfig>,
    pub redis: Option<RedisConfig>,
    pub kafka: Option<KafkaConfig>,
    pub business_rules: BusinessRules,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_group_id")]
    pub group_id: String,
}

fn default_group_id() -> String {
    "busline-reminders".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BusinessRules {
    /// Operator zone, minutes east of UTC (e.g. 300 for UTC+05:00).
    pub utc_offset_minutes: i32,
    #[serde(default = "default_reminder_lead")]
    pub reminder_lead_minutes: i64,
    #[serde(default = "default_reminder_poll")]
    pub reminder_poll_seconds: u64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: i64,
}

/// Real-world zones span UTC-12:00 to UTC+14:00.
const UTC_OFFSET_RANGE: std::ops::RangeInclusive<i32> = -720..=840;
const MAX_REMINDER_LEAD_MINUTES: i64 = 7 * 24 * 60;

impl BusinessRules {
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: String| Err(config::ConfigError::Message(msg));

        if !UTC_OFFSET_RANGE.contains(&self.utc_offset_minutes) {
            return invalid(format!(
                "business_rules.utc_offset_minutes must be within {:?}, got {}",
                UTC_OFFSET_RANGE, self.utc_offset_minutes
            ));
        }
        if self.reminder_poll_seconds == 0 {
            return invalid("business_rules.reminder_poll_seconds must be at least 1".to_string());
        }
        if !(0..=MAX_REMINDER_LEAD_MINUTES).contains(&self.reminder_lead_minutes) {
            return invalid(format!(
                "business_rules.reminder_lead_minutes must be within 0..={}, got {}",
                MAX_REMINDER_LEAD_MINUTES, self.reminder_lead_minutes
            ));
        }
        if self.rate_limit_per_minute < 1 {
            return invalid("business_rules.rate_limit_per_minute must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_reminder_lead() -> i64 {
    120
}

fn default_reminder_poll() -> u64 {
    30
}

fn default_rate_limit() -> i64 {
    120
}

/// Registry and rider fixtures for the memory backend.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SeedConfig {
    #[serde(default)]
    pub riders: Vec<SeedRider>,
    #[serde(default)]
    pub vehicles: Vec<SeedVehicle>,
    #[serde(default)]
    pub routes: Vec<SeedRoute>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedRider {
    pub id: Uuid,
    pub display_name: String,
    pub contact_email: String,
    pub gender: Option<Gender>,
    pub card_token: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedVehicle {
    pub bus_entity_id: Uuid,
    pub operator_id: Uuid,
    #[serde(flatten)]
    pub vehicle: VehicleSnapshot,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedRoute {
    pub route_id: Uuid,
    #[serde(flatten)]
    pub route: RouteSnapshot,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `BUSLINE_DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("BUSLINE").separator("__"))
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.business_rules.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        [server]
        port = 8080

        [business_rules]
        utc_offset_minutes = 300

        [[seed.riders]]
        id = "7d4c2f5e-8b1a-4c3e-9f2d-1a2b3c4d5e6f"
        display_name = "Ayesha"
        contact_email = "ayesha@example.com"
        gender = "female"
        card_token = "RFID-0001"

        [[seed.vehicles]]
        bus_entity_id = "0b7e1c2d-3f4a-4b5c-8d6e-7f8091a2b3c4"
        operator_id = "5a6b7c8d-9e0f-4a1b-8c2d-3e4f5a6b7c8d"
        bus_number = "LEA-2211"
        capacity = 40
        ac = true
    "#;

    fn parse(source: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_defaults_fill_optional_sections() {
        let config = parse(SAMPLE);
        assert!(config.business_rules.validate().is_ok());

        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.database.is_none() && config.kafka.is_none());
        assert_eq!(config.business_rules.reminder_lead_minutes, 120);
        assert_eq!(config.seed.riders[0].gender, Some(Gender::Female));
        assert_eq!(config.seed.vehicles[0].vehicle.capacity, 40);
        assert!(config.seed.routes.is_empty());
    }

    #[test]
    fn test_business_rules_out_of_range_are_rejected() {
        let rules = |extra: &str| {
            parse(&format!("[server]\nport = 8080\n\n[business_rules]\n{}\n", extra)).business_rules
        };

        assert!(rules("utc_offset_minutes = 300\nreminder_poll_seconds = 0").validate().is_err());
        assert!(rules("utc_offset_minutes = 40000000").validate().is_err());
        assert!(rules("utc_offset_minutes = -800").validate().is_err());
        assert!(rules("utc_offset_minutes = 0\nreminder_lead_minutes = -5").validate().is_err());
        assert!(rules("utc_offset_minutes = 0\nrate_limit_per_minute = 0").validate().is_err());
        assert!(rules("utc_offset_minutes = 840\nreminder_poll_seconds = 1").validate().is_ok());
    }
}
