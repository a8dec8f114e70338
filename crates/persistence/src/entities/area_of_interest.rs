//! Area of interest entity (database row mapping).

use chrono::{DateTime, Utc};
use domain::models::{AreaOfInterest, AreaOwner, AreaShape, Circle, Position};
use geo::{Coord, LineString, Polygon};
use serde::Deserialize;
use sqlx::FromRow;
use uuid::Uuid;

use super::EntityError;

/// Database row mapping for the areas_of_interest table.
///
/// `geometry_geojson` is selected as `ST_AsGeoJSON(geom)`.
#[derive(Debug, Clone, FromRow)]
pub struct AreaOfInterestEntity {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub community_id: Option<Uuid>,
    pub polygon_area: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_in_meters: Option<f64>,
    pub geometry_geojson: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct GeoJsonPolygon {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<Vec<[f64; 2]>>,
}

fn decode_polygon(id: Uuid, geojson: &str) -> Result<Polygon<f64>, EntityError> {
    let parsed: GeoJsonPolygon = serde_json::from_str(geojson).map_err(|e| EntityError::Geometry {
        id,
        reason: e.to_string(),
    })?;
    if parsed.kind != "Polygon" {
        return Err(EntityError::Geometry {
            id,
            reason: format!("unexpected type {}", parsed.kind),
        });
    }

    let mut rings = parsed
        .coordinates
        .into_iter()
        .map(|ring| LineString::from(ring.into_iter().map(|[x, y]| Coord { x, y }).collect::<Vec<_>>()));
    let exterior = rings.next().ok_or_else(|| EntityError::Geometry {
        id,
        reason: "no exterior ring".into(),
    })?;

    Ok(Polygon::new(exterior, rings.collect()))
}

impl TryFrom<AreaOfInterestEntity> for AreaOfInterest {
    type Error = EntityError;

    fn try_from(entity: AreaOfInterestEntity) -> Result<Self, Self::Error> {
        let owner = AreaOwner::from_columns(entity.user_id, entity.community_id)
            .ok_or(EntityError::MissingOwner(entity.id))?;

        let shape = match (
            entity.polygon_area,
            entity.latitude,
            entity.longitude,
            entity.radius_in_meters,
        ) {
            (Some(wkt), _, _, _) => AreaShape::Polygon(wkt),
            (None, Some(latitude), Some(longitude), Some(radius_in_meters)) => {
                AreaShape::Circle(Circle {
                    center: Position::new(latitude, longitude),
                    radius_in_meters,
                })
            }
            _ => {
                return Err(EntityError::Geometry {
                    id: entity.id,
                    reason: "neither polygon nor circle columns are set".into(),
                })
            }
        };

        Ok(Self {
            id: entity.id,
            owner,
            shape,
            geometry: decode_polygon(entity.id, &entity.geometry_geojson)?,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(geojson: &str) -> AreaOfInterestEntity {
        AreaOfInterestEntity {
            id: Uuid::new_v4(),
            user_id: Some(Uuid::new_v4()),
            community_id: None,
            polygon_area: Some("POLYGON((0 0,10 0,10 10,0 0))".into()),
            latitude: None,
            longitude: None,
            radius_in_meters: None,
            geometry_geojson: geojson.into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_decodes_geojson_polygon() {
        let area = AreaOfInterest::try_from(entity(
            r#"{"type":"Polygon","coordinates":[[[0,0],[10,0],[10,10],[0,0]]]}"#,
        ))
        .unwrap();
        assert_eq!(area.geometry.exterior().0.len(), 4);
        assert_eq!(area.geometry.exterior().0[1], Coord { x: 10.0, y: 0.0 });
        assert!(matches!(area.shape, AreaShape::Polygon(_)));
    }

    #[test]
    fn test_rejects_non_polygon() {
        let err = AreaOfInterest::try_from(entity(r#"{"type":"Point","coordinates":[[[0,0]]]}"#))
            .unwrap_err();
        assert!(matches!(err, EntityError::Geometry { .. }));
    }

    #[test]
    fn test_rejects_ownerless_row() {
        let mut row = entity(r#"{"type":"Polygon","coordinates":[[[0,0],[1,0],[1,1],[0,0]]]}"#);
        row.user_id = None;
        assert!(matches!(
            AreaOfInterest::try_from(row),
            Err(EntityError::MissingOwner(_))
        ));
    }
}
