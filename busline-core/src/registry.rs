use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FuelType {
    #[default]
    Diesel,
    Electric,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStandard {
    Economy,
    #[default]
    Executive,
    Business,
}

/// Vehicle facts frozen into a departure when it is created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VehicleSnapshot {
    pub bus_number: String,
    pub capacity: u32,
    #[serde(default)]
    pub wifi: bool,
    #[serde(default)]
    pub ac: bool,
    #[serde(default)]
    pub fuel_type: FuelType,
    #[serde(default)]
    pub standard: ServiceStandard,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteStop {
    pub name: String,
    pub location_link: Option<String>,
    /// Minutes from the previous stop.
    #[serde(default)]
    pub duration_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RouteSnapshot {
    pub start_city: String,
    pub end_city: String,
    #[serde(default)]
    pub stops: Vec<RouteStop>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DepartureTemplate {
    pub operator_id: Uuid,
    pub capacity: u32,
    pub route: RouteSnapshot,
    pub vehicle: VehicleSnapshot,
}

/// Operator/route/vehicle registry. Consulted once, when a departure is created.
#[async_trait]
pub trait DepartureTemplateSource: Send + Sync {
    async fn get_departure_template(
        &self,
        bus_entity_id: Uuid,
        route_id: Uuid,
    ) -> Result<Option<DepartureTemplate>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Registry backed by two in-process maps.
#[derive(Default)]
pub struct StaticTemplateRegistry {
    vehicles: RwLock<HashMap<Uuid, (Uuid, VehicleSnapshot)>>,
    routes: RwLock<HashMap<Uuid, RouteSnapshot>>,
}

impl StaticTemplateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_vehicle(&self, bus_entity_id: Uuid, operator_id: Uuid, vehicle: VehicleSnapshot) -> CoreResult<()> {
        self.vehicles
            .write()
            .map_err(|_| CoreError::InternalError("registry poisoned".to_string()))?
            .insert(bus_entity_id, (operator_id, vehicle));
        Ok(())
    }

    pub fn register_route(&self, route_id: Uuid, route: RouteSnapshot) -> CoreResult<()> {
        self.routes
            .write()
            .map_err(|_| CoreError::InternalError("registry poisoned".to_string()))?
            .insert(route_id, route);
        Ok(())
    }
}

#[async_trait]
impl DepartureTemplateSource for StaticTemplateRegistry {
    async fn get_departure_template(
        &self,
        bus_entity_id: Uuid,
        route_id: Uuid,
    ) -> Result<Option<DepartureTemplate>, Box<dyn std::error::Error + Send + Sync>> {
        let vehicle = self
            .vehicles
            .read()
            .map_err(|_| CoreError::InternalError("registry poisoned".to_string()))?
            .get(&bus_entity_id)
            .cloned();
        let route = self
            .routes
            .read()
            .map_err(|_| CoreError::InternalError("registry poisoned".to_string()))?
            .get(&route_id)
            .cloned();

        Ok(match (vehicle, route) {
            (Some((operator_id, vehicle)), Some(route)) => Some(DepartureTemplate {
                operator_id,
                capacity: vehicle.capacity,
                route,
                vehicle,
            }),
            _ => None,
        })
    }
}
