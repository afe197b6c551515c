use async_trait::async_trait;
use busline_shared::Masked;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::RwLock;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Gender {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            other => Err(CoreError::ValidationError(format!("unknown gender '{}'", other))),
        }
    }
}

/// How a rider presents themselves: account id, or the physical travel card
/// tapped at the bus door.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiderIdentifier {
    Id(Uuid),
    CardToken(String),
}

impl fmt::Display for RiderIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiderIdentifier::Id(id) => write!(f, "rider {}", id),
            RiderIdentifier::CardToken(_) => f.write_str("card ********"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiderProfile {
    pub id: Uuid,
    pub display_name: String,
    pub contact_email: Masked<String>,
    pub gender: Option<Gender>,
}

#[async_trait]
pub trait RiderDirectory: Send + Sync {
    /// Resolve a rider by id or card token. `Ok(None)` when nobody matches.
    async fn resolve_rider(
        &self,
        identifier: &RiderIdentifier,
    ) -> Result<Option<RiderProfile>, Box<dyn std::error::Error + Send + Sync>>;
}

/// Rider directory held in process memory. Used by the memory backend and tests.
#[derive(Default)]
pub struct StaticRiderDirectory {
    riders: RwLock<HashMap<Uuid, (RiderProfile, Option<String>)>>,
}

impl StaticRiderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, profile: RiderProfile, card_token: Option<String>) -> CoreResult<()> {
        let mut riders = self
            .riders
            .write()
            .map_err(|_| CoreError::InternalError("rider directory poisoned".to_string()))?;
        riders.insert(profile.id, (profile, card_token));
        Ok(())
    }
}

#[async_trait]
impl RiderDirectory for StaticRiderDirectory {
    async fn resolve_rider(
        &self,
        identifier: &RiderIdentifier,
    ) -> Result<Option<RiderProfile>, Box<dyn std::error::Error + Send + Sync>> {
        let riders = self
            .riders
            .read()
            .map_err(|_| CoreError::InternalError("rider directory poisoned".to_string()))?;

        let found = match identifier {
            RiderIdentifier::Id(id) => riders.get(id).map(|(profile, _)| profile.clone()),
            RiderIdentifier::CardToken(token) => riders
                .values()
                .find(|(_, card)| card.as_deref() == Some(token.as_str()))
                .map(|(profile, _)| profile.clone()),
        };

        tracing::debug!("Resolved {} -> {:?}", identifier, found.as_ref().map(|p| p.id));
        Ok(found)
    }
}
