//! Event repository.

use domain::models::{Event, NewEvent};
use domain::services::ports::EventStore;
use domain::TrackingError;
use sqlx::PgPool;
use uuid::Uuid;

use crate::entities::EventEntity;
use crate::metrics::timed;

/// Repository for event database operations.
#[derive(Clone)]
pub struct EventRepository {
    pool: PgPool,
}

impl EventRepository {
    /// Creates a new EventRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_event(&self, event_id: Uuid) -> Result<Option<Event>, TrackingError> {
        let row = timed(
            "find_event",
            sqlx::query_as::<_, EventEntity>(
                r#"
                SELECT id, title, description, event_type, status, latitude, longitude,
                       is_public, created_by, device_id, created_at, updated_at
                FROM events
                WHERE id = $1 AND deleted_at IS NULL
                "#,
            )
            .bind(event_id)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(Event::try_from).transpose().map_err(Into::into)
    }
}

#[async_trait::async_trait]
impl EventStore for EventRepository {
    async fn insert_event(&self, created_by: Uuid, event: &NewEvent) -> Result<Event, TrackingError> {
        let row = timed(
            "insert_event",
            sqlx::query_as::<_, EventEntity>(
                r#"
                INSERT INTO events (title, description, event_type, latitude, longitude,
                                    is_public, created_by, device_id)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                RETURNING id, title, description, event_type, status, latitude, longitude,
                          is_public, created_by, device_id, created_at, updated_at
                "#,
            )
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.event_type.as_str())
            .bind(event.latitude)
            .bind(event.longitude)
            .bind(event.is_public)
            .bind(created_by)
            .bind(event.device_id)
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(Event::try_from(row)?)
    }
}
