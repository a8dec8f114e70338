//! Location fix entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::LocationFix;
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the location_fixes table.
#[derive(Debug, Clone, FromRow)]
pub struct LocationFixEntity {
    pub id: i64,
    pub device_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<LocationFixEntity> for LocationFix {
    fn from(entity: LocationFixEntity) -> Self {
        Self {
            id: entity.id,
            device_id: entity.device_id,
            latitude: entity.latitude,
            longitude: entity.longitude,
            captured_at: entity.captured_at,
            created_at: entity.created_at,
        }
    }
}
