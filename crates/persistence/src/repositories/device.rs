//! Device repository: registry reads and session token caching.

use domain::models::{SessionToken, TrackedDevice};
use domain::services::ports::{DeviceRegistry, SessionStore};
use domain::TrackingError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::DeviceEntity;
use crate::metrics::timed;

const DEVICE_COLUMNS: &str = "id, number, provider_identity, provider_secret, trackable, \
                              session_token, owner_id, created_at, updated_at, deleted_at";

/// Input for registering a device.
#[derive(Debug, Clone, Default)]
pub struct NewDevice {
    pub number: Option<String>,
    pub provider_identity: Option<String>,
    pub provider_secret: Option<String>,
    pub trackable: bool,
    pub owner_id: Option<Uuid>,
}

/// Repository for device-related database operations.
#[derive(Clone)]
pub struct DeviceRepository {
    pool: PgPool,
}

impl DeviceRepository {
    /// Creates a new DeviceRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn insert_device(&self, device: &NewDevice) -> Result<TrackedDevice, sqlx::Error> {
        let sql = format!(
            r#"
            INSERT INTO devices (number, provider_identity, provider_secret, trackable, owner_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {DEVICE_COLUMNS}
            "#
        );
        let entity = timed(
            "insert_device",
            sqlx::query_as::<_, DeviceEntity>(&sql)
                .bind(&device.number)
                .bind(&device.provider_identity)
                .bind(&device.provider_secret)
                .bind(device.trackable)
                .bind(device.owner_id)
                .fetch_one(&self.pool),
        )
        .await?;
        Ok(entity.into())
    }

    /// Soft-deletes a device. Returns the number of rows affected.
    pub async fn soft_delete(&self, device_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = timed(
            "soft_delete_device",
            sqlx::query(
                r#"
                UPDATE devices
                SET deleted_at = NOW(), updated_at = NOW()
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(device_id)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn set_session_token(
        &self,
        device_id: Uuid,
        token: Option<&str>,
    ) -> Result<(), TrackingError> {
        let result = timed(
            "set_session_token",
            sqlx::query(
                r#"
                UPDATE devices
                SET session_token = $2, updated_at = NOW()
                WHERE id = $1
                "#,
            )
            .bind(device_id)
            .bind(token)
            .execute(&self.pool),
        )
        .await?;

        if result.rows_affected() == 0 {
            return Err(TrackingError::NotFound(format!("device {}", device_id)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for DeviceRepository {
    async fn list_pollable(&self) -> Result<Vec<TrackedDevice>, TrackingError> {
        let sql = format!(
            r#"
            SELECT {DEVICE_COLUMNS}
            FROM devices
            WHERE trackable = true
              AND provider_identity IS NOT NULL
              AND provider_secret IS NOT NULL
              AND deleted_at IS NULL
            ORDER BY created_at ASC
            "#
        );
        let rows = timed(
            "list_pollable_devices",
            sqlx::query_as::<_, DeviceEntity>(&sql).fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.into_iter().map(TrackedDevice::from).collect())
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<TrackedDevice>, TrackingError> {
        let sql = format!(
            r#"
            SELECT {DEVICE_COLUMNS}
            FROM devices
            WHERE number = $1 AND deleted_at IS NULL
            "#
        );
        let row = timed(
            "find_device_by_number",
            sqlx::query_as::<_, DeviceEntity>(&sql)
                .bind(number)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(TrackedDevice::from))
    }
}

#[async_trait::async_trait]
impl SessionStore for DeviceRepository {
    async fn load_session(&self, device_id: Uuid) -> Result<Option<SessionToken>, TrackingError> {
        let row: Option<(Option<String>,)> = timed(
            "load_session_token",
            sqlx::query_as("SELECT session_token FROM devices WHERE id = $1")
                .bind(device_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        match row {
            Some((token,)) => Ok(token.map(SessionToken::new)),
            None => Err(TrackingError::NotFound(format!("device {}", device_id))),
        }
    }

    async fn save_session(&self, device_id: Uuid, token: &SessionToken) -> Result<(), TrackingError> {
        self.set_session_token(device_id, Some(token.as_str())).await
    }

    async fn clear_session(&self, device_id: Uuid) -> Result<(), TrackingError> {
        self.set_session_token(device_id, None).await
    }
}
