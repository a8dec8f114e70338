//! Tracker settings repository (singleton row).

use std::time::Duration;

use domain::services::ports::PollSettingsSource;
use domain::TrackingError;
use sqlx::PgPool;

use crate::metrics::timed;

/// Reads and writes the `tracker_settings` row.
#[derive(Clone)]
pub struct TrackerSettingsRepository {
    pool: PgPool,
}

impl TrackerSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Changes the polling cadence; picked up at the start of the next cycle.
    pub async fn set_poll_interval_secs(&self, secs: i32) -> Result<(), TrackingError> {
        if secs <= 0 {
            return Err(TrackingError::Validation(
                "Poll interval must be a positive number of seconds".into(),
            ));
        }

        timed(
            "set_poll_interval",
            sqlx::query(
                r#"
                INSERT INTO tracker_settings (id, poll_interval_secs, updated_at)
                VALUES (1, $1, NOW())
                ON CONFLICT (id) DO UPDATE SET
                    poll_interval_secs = EXCLUDED.poll_interval_secs,
                    updated_at = EXCLUDED.updated_at
                "#,
            )
            .bind(secs)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PollSettingsSource for TrackerSettingsRepository {
    async fn poll_interval(&self) -> Result<Duration, TrackingError> {
        let secs: Option<i32> = timed(
            "get_poll_interval",
            sqlx::query_scalar("SELECT poll_interval_secs FROM tracker_settings WHERE id = 1")
                .fetch_optional(&self.pool),
        )
        .await?;

        match secs {
            Some(secs) if secs > 0 => Ok(Duration::from_secs(secs as u64)),
            Some(secs) => Err(TrackingError::Validation(format!(
                "stored poll interval {} is not positive",
                secs
            ))),
            None => Err(TrackingError::NotFound("tracker settings".into())),
        }
    }
}
