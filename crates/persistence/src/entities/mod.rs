//! Database entity definitions.
//!
//! Entities are direct mappings to database rows.

pub mod area_of_interest;
pub mod device;
pub mod event;
pub mod location;

pub use area_of_interest::AreaOfInterestEntity;
pub use device::DeviceEntity;
pub use event::EventEntity;
pub use location::LocationFixEntity;

use domain::TrackingError;
use thiserror::Error;
use uuid::Uuid;

/// A row that cannot be mapped to its domain model.
#[derive(Debug, Error)]
pub enum EntityError {
    #[error("stored geometry for {id} is not a polygon: {reason}")]
    Geometry { id: Uuid, reason: String },

    #[error("unknown {column} value '{value}'")]
    UnknownValue { column: &'static str, value: String },

    #[error("area of interest {0} has no single owner")]
    MissingOwner(Uuid),
}

impl From<EntityError> for TrackingError {
    fn from(err: EntityError) -> Self {
        TrackingError::Persistence(err.to_string())
    }
}
