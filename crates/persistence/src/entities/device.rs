//! Device entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{ProviderCredentials, SessionToken, TrackedDevice};
use sqlx::FromRow;
use uuid::Uuid;

/// Database row mapping for the devices table.
#[derive(Debug, Clone, FromRow)]
pub struct DeviceEntity {
    pub id: Uuid,
    pub number: Option<String>,
    pub provider_identity: Option<String>,
    pub provider_secret: Option<String>,
    pub trackable: bool,
    pub session_token: Option<String>,
    pub owner_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl From<DeviceEntity> for TrackedDevice {
    fn from(entity: DeviceEntity) -> Self {
        Self {
            id: entity.id,
            number: entity.number,
            credentials: ProviderCredentials::from_parts(
                entity.provider_identity,
                entity.provider_secret,
            ),
            trackable: entity.trackable,
            session_token: entity.session_token.map(SessionToken::new),
            owner_id: entity.owner_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            deleted_at: entity.deleted_at,
        }
    }
}
