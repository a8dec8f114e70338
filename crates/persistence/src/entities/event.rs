//! Event entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{Event, EventStatus, EventType};
use sqlx::FromRow;
use uuid::Uuid;

use super::EntityError;

/// Database row mapping for the events table.
#[derive(Debug, Clone, FromRow)]
pub struct EventEntity {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_type: String,
    pub status: String,
    pub latitude: f64,
    pub longitude: f64,
    pub is_public: bool,
    pub created_by: Uuid,
    pub device_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<EventEntity> for Event {
    type Error = EntityError;

    fn try_from(entity: EventEntity) -> Result<Self, Self::Error> {
        let event_type =
            EventType::parse(&entity.event_type).ok_or_else(|| EntityError::UnknownValue {
                column: "event_type",
                value: entity.event_type.clone(),
            })?;
        let status = EventStatus::parse(&entity.status).ok_or_else(|| EntityError::UnknownValue {
            column: "status",
            value: entity.status.clone(),
        })?;

        Ok(Self {
            id: entity.id,
            title: entity.title,
            description: entity.description,
            event_type,
            status,
            latitude: entity.latitude,
            longitude: entity.longitude,
            is_public: entity.is_public,
            created_by: entity.created_by,
            device_id: entity.device_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}
