pub mod identity;
pub mod payment;
pub mod registry;
pub mod schedule;
pub mod search;

pub use identity::{Gender, RiderDirectory, RiderIdentifier, RiderProfile};
pub use registry::{DepartureTemplate, DepartureTemplateSource, RouteSnapshot, VehicleSnapshot};
pub use schedule::{DepartureStatus, Schedule};
pub use search::DepartureFilter;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Internal service error: {0}")]
    InternalError(String),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::ValidationError(_) => ErrorKind::Validation,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::InvalidState(_) => ErrorKind::InvalidState,
            CoreError::InternalError(_) => ErrorKind::Internal,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Coarse failure classes callers branch on (e.g. offer other seats on `Conflict`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidState,
    Validation,
    Internal,
}
