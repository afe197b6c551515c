use async_trait::async_trait;
use busline_core::registry::{FuelType, RouteStop, ServiceStandard};
use busline_core::{
    DepartureTemplate, DepartureTemplateSource, Gender, RiderDirectory, RiderIdentifier, RiderProfile, RouteSnapshot,
    VehicleSnapshot,
};
use busline_shared::Masked;
use sqlx::types::Json;
use sqlx::PgPool;
use std::error::Error;
use uuid::Uuid;

/// Vehicles and routes read from the operator registry tables.
pub struct PgTemplateRegistry {
    pool: PgPool,
}

impl PgTemplateRegistry {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct TemplateRow {
    operator_id: Uuid,
    bus_number: String,
    capacity: i32,
    wifi: bool,
    ac: bool,
    fuel_type: String,
    standard: String,
    start_city: String,
    end_city: String,
    stops: Json<Vec<RouteStop>>,
}

fn parse_fuel(value: &str) -> FuelType {
    match value {
        "electric" => FuelType::Electric,
        _ => FuelType::Diesel,
    }
}

fn parse_standard(value: &str) -> ServiceStandard {
    match value {
        "economy" => ServiceStandard::Economy,
        "business" => ServiceStandard::Business,
        _ => ServiceStandard::Executive,
    }
}

#[async_trait]
impl DepartureTemplateSource for PgTemplateRegistry {
    async fn get_departure_template(
        &self,
        bus_entity_id: Uuid,
        route_id: Uuid,
    ) -> Result<Option<DepartureTemplate>, Box<dyn Error + Send + Sync>> {
        let row: Option<TemplateRow> = sqlx::query_as(
            r#"
            SELECT b.operator_id, b.bus_number, b.capacity, b.wifi, b.ac, b.fuel_type, b.standard,
                   r.start_city, r.end_city, r.stops
            FROM bus_entities b, routes r
            WHERE b.id = $1 AND r.id = $2
            "#,
        )
        .bind(bus_entity_id)
        .bind(route_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let capacity = u32::try_from(row.capacity)?;
        Ok(Some(DepartureTemplate {
            operator_id: row.operator_id,
            capacity,
            route: RouteSnapshot {
                start_city: row.start_city,
                end_city: row.end_city,
                stops: row.stops.0,
            },
            vehicle: VehicleSnapshot {
                bus_number: row.bus_number,
                capacity,
                wifi: row.wifi,
                ac: row.ac,
                fuel_type: parse_fuel(&row.fuel_type),
                standard: parse_standard(&row.standard),
            },
        }))
    }
}

/// Rider accounts and their travel cards.
pub struct PgRiderDirectory {
    pool: PgPool,
}

impl PgRiderDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RiderRow {
    id: Uuid,
    display_name: String,
    contact_email: String,
    gender: Option<String>,
}

#[async_trait]
impl RiderDirectory for PgRiderDirectory {
    async fn resolve_rider(
        &self,
        identifier: &RiderIdentifier,
    ) -> Result<Option<RiderProfile>, Box<dyn Error + Send + Sync>> {
        let query = match identifier {
            RiderIdentifier::Id(id) => {
                sqlx::query_as::<_, RiderRow>("SELECT id, display_name, contact_email, gender FROM riders WHERE id = $1")
                    .bind(*id)
            }
            RiderIdentifier::CardToken(token) => sqlx::query_as::<_, RiderRow>(
                "SELECT id, display_name, contact_email, gender FROM riders WHERE card_token = $1",
            )
            .bind(token.clone()),
        };

        let Some(row) = query.fetch_optional(&self.pool).await? else {
            tracing::debug!("No rider for {}", identifier);
            return Ok(None);
        };

        Ok(Some(RiderProfile {
            id: row.id,
            display_name: row.display_name,
            contact_email: Masked(row.contact_email),
            gender: row.gender.map(|g| g.parse::<Gender>()).transpose()?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_vehicle_labels_fall_back_to_defaults() {
        assert_eq!(parse_fuel("electric"), FuelType::Electric);
        assert_eq!(parse_fuel("lpg"), FuelType::default());
        assert_eq!(parse_standard("business"), ServiceStandard::Business);
        assert_eq!(parse_standard(""), ServiceStandard::default());
    }
}
