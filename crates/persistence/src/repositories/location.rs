//! Location fix repository: append and bounded retention.

use domain::models::{LocationFix, NewLocationFix};
use domain::services::ports::LocationStore;
use domain::TrackingError;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::entities::LocationFixEntity;
use crate::metrics::timed;

/// Repository for location fix database operations.
#[derive(Clone)]
pub struct LocationRepository {
    pool: PgPool,
}

impl LocationRepository {
    /// Creates a new LocationRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Most recent fixes for a device by capture time.
    pub async fn recent_fixes(
        &self,
        device_id: Uuid,
        limit: i64,
    ) -> Result<Vec<LocationFix>, sqlx::Error> {
        let rows = timed(
            "recent_fixes",
            sqlx::query_as::<_, LocationFixEntity>(
                r#"
                SELECT id, device_id, latitude, longitude, captured_at, created_at
                FROM location_fixes
                WHERE device_id = $1
                ORDER BY captured_at DESC, id DESC
                LIMIT $2
                "#,
            )
            .bind(device_id)
            .bind(limit)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.into_iter().map(LocationFix::from).collect())
    }
}

#[async_trait::async_trait]
impl LocationStore for LocationRepository {
    async fn append_fix(&self, fix: NewLocationFix) -> Result<LocationFix, TrackingError> {
        let row = timed(
            "append_fix",
            sqlx::query_as::<_, LocationFixEntity>(
                r#"
                INSERT INTO location_fixes (device_id, latitude, longitude, captured_at)
                VALUES ($1, $2, $3, $4)
                RETURNING id, device_id, latitude, longitude, captured_at, created_at
                "#,
            )
            .bind(fix.device_id)
            .bind(fix.position.latitude)
            .bind(fix.position.longitude)
            .bind(fix.captured_at)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into())
    }

    async fn prune_fixes(&self, device_id: Uuid, keep: i64) -> Result<u64, TrackingError> {
        let result = timed(
            "prune_fixes",
            sqlx::query(
                r#"
                DELETE FROM location_fixes
                WHERE device_id = $1
                  AND id NOT IN (
                      SELECT id FROM location_fixes
                      WHERE device_id = $1
                      ORDER BY captured_at DESC, id DESC
                      LIMIT $2
                  )
                "#,
            )
            .bind(device_id)
            .bind(keep)
            .execute(&self.pool),
        )
        .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(device_id = %device_id, deleted, "Pruned location history");
        }
        Ok(deleted)
    }
}
