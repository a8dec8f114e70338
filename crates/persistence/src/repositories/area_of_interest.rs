//! Area of interest repository: storage plus PostGIS spatial matching.

use domain::geometry::polygon_to_wkt;
use domain::models::{AreaOfInterest, AreaShape, Position};
use domain::services::ports::{AreaChange, AreaStore, SpatialStore};
use domain::TrackingError;
use geo::Polygon;
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use crate::entities::AreaOfInterestEntity;
use crate::metrics::timed;

const AREA_COLUMNS: &str = "id, user_id, community_id, polygon_area, latitude, longitude, \
                            radius_in_meters, ST_AsGeoJSON(geom) AS geometry_geojson, \
                            created_at, updated_at";

/// Repository for areas of interest and their event associations.
#[derive(Clone)]
pub struct AreaOfInterestRepository {
    pool: PgPool,
}

impl AreaOfInterestRepository {
    /// Creates a new AreaOfInterestRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Replaces the area's links with the public events its stored geometry intersects.
async fn relink_in(conn: &mut PgConnection, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError> {
    let event_ids = timed(
        "public_events_in_area",
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT e.id
            FROM areas_of_interest a
            JOIN events e ON ST_Intersects(a.geom, e.geom)
            WHERE a.id = $1
              AND e.is_public = true
              AND e.deleted_at IS NULL
            ORDER BY e.created_at DESC
            "#,
        )
        .bind(area_id)
        .fetch_all(&mut *conn),
    )
    .await?;

    timed(
        "clear_area_events",
        sqlx::query("DELETE FROM event_areas_of_interest WHERE area_of_interest_id = $1")
            .bind(area_id)
            .execute(&mut *conn),
    )
    .await?;

    if !event_ids.is_empty() {
        timed(
            "insert_area_events",
            sqlx::query(
                r#"
                INSERT INTO event_areas_of_interest (area_of_interest_id, event_id)
                SELECT $1, UNNEST($2::uuid[])
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(area_id)
            .bind(event_ids.as_slice())
            .execute(&mut *conn),
        )
        .await?;
    }

    Ok(event_ids)
}

#[async_trait::async_trait]
impl AreaStore for AreaOfInterestRepository {
    async fn save_area_and_relink(
        &self,
        change: AreaChange,
        shape: &AreaShape,
        geometry: &Polygon<f64>,
    ) -> Result<(AreaOfInterest, Vec<Uuid>), TrackingError> {
        let (polygon_area, latitude, longitude, radius) = shape.columns();
        let wkt = polygon_to_wkt(geometry);
        let mut tx = self.pool.begin().await?;

        let row = match change {
            AreaChange::Create(owner) => {
                let (user_id, community_id) = owner.columns();
                let sql = format!(
                    r#"
                    INSERT INTO areas_of_interest
                        (user_id, community_id, polygon_area, latitude, longitude, radius_in_meters, geom)
                    VALUES ($1, $2, $3, $4, $5, $6, ST_GeomFromText($7, 4326))
                    RETURNING {AREA_COLUMNS}
                    "#
                );
                timed(
                    "insert_area_of_interest",
                    sqlx::query_as::<_, AreaOfInterestEntity>(&sql)
                        .bind(user_id)
                        .bind(community_id)
                        .bind(polygon_area)
                        .bind(latitude)
                        .bind(longitude)
                        .bind(radius)
                        .bind(wkt.as_str())
                        .fetch_one(&mut *tx),
                )
                .await?
            }
            AreaChange::Update(area_id) => {
                let sql = format!(
                    r#"
                    UPDATE areas_of_interest
                    SET polygon_area = $2,
                        latitude = $3,
                        longitude = $4,
                        radius_in_meters = $5,
                        geom = ST_GeomFromText($6, 4326),
                        updated_at = NOW()
                    WHERE id = $1 AND deleted_at IS NULL
                    RETURNING {AREA_COLUMNS}
                    "#
                );
                timed(
                    "update_area_geometry",
                    sqlx::query_as::<_, AreaOfInterestEntity>(&sql)
                        .bind(area_id)
                        .bind(polygon_area)
                        .bind(latitude)
                        .bind(longitude)
                        .bind(radius)
                        .bind(wkt.as_str())
                        .fetch_optional(&mut *tx),
                )
                .await?
                .ok_or_else(|| TrackingError::NotFound(format!("area of interest {}", area_id)))?
            }
        };

        let area = AreaOfInterest::try_from(row)?;
        let linked = relink_in(&mut *tx, area.id).await?;
        tx.commit().await?;

        debug!(area_id = %area.id, linked = linked.len(), "Saved area and replaced event links");
        Ok((area, linked))
    }

    async fn find_area(&self, area_id: Uuid) -> Result<Option<AreaOfInterest>, TrackingError> {
        let sql = format!(
            r#"
            SELECT {AREA_COLUMNS}
            FROM areas_of_interest
            WHERE id = $1 AND deleted_at IS NULL
            "#
        );
        let row = timed(
            "find_area_of_interest",
            sqlx::query_as::<_, AreaOfInterestEntity>(&sql)
                .bind(area_id)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(AreaOfInterest::try_from).transpose()?)
    }
}

#[async_trait::async_trait]
impl SpatialStore for AreaOfInterestRepository {
    async fn relink_area(&self, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError> {
        let mut tx = self.pool.begin().await?;
        let linked = relink_in(&mut *tx, area_id).await?;
        tx.commit().await?;

        debug!(area_id = %area_id, linked = linked.len(), "Replaced area event links");
        Ok(linked)
    }

    async fn areas_containing(&self, position: Position) -> Result<Vec<Uuid>, TrackingError> {
        let ids = timed(
            "areas_containing",
            sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT id
                FROM areas_of_interest
                WHERE deleted_at IS NULL
                  AND ST_Intersects(geom, ST_SetSRID(ST_MakePoint($1, $2), 4326))
                "#,
            )
            .bind(position.longitude)
            .bind(position.latitude)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(ids)
    }

    async fn link_event_to_areas(&self, event_id: Uuid, area_ids: &[Uuid]) -> Result<u64, TrackingError> {
        if area_ids.is_empty() {
            return Ok(0);
        }

        let result = timed(
            "link_event_to_areas",
            sqlx::query(
                r#"
                INSERT INTO event_areas_of_interest (area_of_interest_id, event_id)
                SELECT UNNEST($1::uuid[]), $2
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(area_ids)
            .bind(event_id)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }

    async fn linked_events(&self, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError> {
        let ids = timed(
            "linked_events",
            sqlx::query_scalar::<_, Uuid>(
                r#"
                SELECT e.id
                FROM event_areas_of_interest l
                JOIN events e ON e.id = l.event_id
                WHERE l.area_of_interest_id = $1
                ORDER BY e.created_at DESC
                "#,
            )
            .bind(area_id)
            .fetch_all(&self.pool),
        )
        .await?;
        Ok(ids)
    }
}
