//! Area of interest domain model.

use chrono::{DateTime, Utc};
use geo::Polygon;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::location::Position;

/// Who an area belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum AreaOwner {
    User(Uuid),
    Community(Uuid),
}

impl AreaOwner {
    /// Splits into the nullable `(user_id, community_id)` column pair.
    pub fn columns(&self) -> (Option<Uuid>, Option<Uuid>) {
        match *self {
            AreaOwner::User(id) => (Some(id), None),
            AreaOwner::Community(id) => (None, Some(id)),
        }
    }

    pub fn from_columns(user_id: Option<Uuid>, community_id: Option<Uuid>) -> Option<Self> {
        match (user_id, community_id) {
            (Some(id), None) => Some(AreaOwner::User(id)),
            (None, Some(id)) => Some(AreaOwner::Community(id)),
            _ => None,
        }
    }
}

/// Shape fields as submitted by a client; exactly one form must be filled.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AreaShapeInput {
    /// `POLYGON((lon lat, ...))` text.
    pub polygon_area: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub radius_in_meters: Option<f64>,
}

impl AreaShapeInput {
    pub fn polygon(wkt: impl Into<String>) -> Self {
        Self {
            polygon_area: Some(wkt.into()),
            ..Self::default()
        }
    }

    pub fn circle(latitude: f64, longitude: f64, radius_in_meters: f64) -> Self {
        Self {
            polygon_area: None,
            latitude: Some(latitude),
            longitude: Some(longitude),
            radius_in_meters: Some(radius_in_meters),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Circle {
    pub center: Position,
    pub radius_in_meters: f64,
}

/// The form an area was defined in.
#[derive(Debug, Clone, PartialEq)]
pub enum AreaShape {
    Polygon(String),
    Circle(Circle),
}

impl AreaShape {
    /// Splits into `(polygon_area, latitude, longitude, radius_in_meters)` columns.
    pub fn columns(&self) -> (Option<&str>, Option<f64>, Option<f64>, Option<f64>) {
        match self {
            AreaShape::Polygon(wkt) => (Some(wkt.as_str()), None, None, None),
            AreaShape::Circle(c) => (
                None,
                Some(c.center.latitude),
                Some(c.center.longitude),
                Some(c.radius_in_meters),
            ),
        }
    }

    pub fn to_input(&self) -> AreaShapeInput {
        let (polygon, latitude, longitude, radius) = self.columns();
        AreaShapeInput {
            polygon_area: polygon.map(str::to_string),
            latitude,
            longitude,
            radius_in_meters: radius,
        }
    }
}

/// A stored area of interest with its resolved geometry.
#[derive(Debug, Clone)]
pub struct AreaOfInterest {
    pub id: Uuid,
    pub owner: AreaOwner,
    pub shape: AreaShape,
    pub geometry: Polygon<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
