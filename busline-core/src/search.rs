use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Explicit departure search. Unknown fields are rejected at deserialization
/// so a typo never silently widens the result set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct DepartureFilter {
    pub start_city: Option<String>,
    pub end_city: Option<String>,
    pub date: Option<NaiveDate>,
    pub operator_id: Option<Uuid>,
    pub min_free_seats: Option<u32>,
    #[serde(default)]
    pub upcoming_only: bool,
}

impl DepartureFilter {
    pub fn validate(&self) -> CoreResult<()> {
        for (field, value) in [("start_city", &self.start_city), ("end_city", &self.end_city)] {
            if matches!(value, Some(v) if v.trim().is_empty()) {
                return Err(CoreError::ValidationError(format!("{} must not be blank", field)));
            }
        }
        Ok(())
    }

    pub fn city_matches(wanted: &Option<String>, actual: &str) -> bool {
        match wanted {
            Some(city) => city.trim().eq_ignore_ascii_case(actual.trim()),
            None => true,
        }
    }
}

/// Query string of `GET /v1/departures`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ListDeparturesQuery {
    #[serde(default)]
    pub upcoming_only: bool,
    pub operator_id: Option<Uuid>,
}
