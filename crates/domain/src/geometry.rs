//! Area-of-interest geometry: WKT polygon parsing and radius buffering.
//!
//! Coordinates follow the spatial store's axis order: `x` is longitude and
//! `y` is latitude, both in WGS 84 degrees.

use geo::{Coord, HaversineDestination, Intersects, LineString, Point, Polygon};
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

use crate::models::{AreaShape, AreaShapeInput, Circle, Position};

/// Default vertex count used to approximate a circle.
pub const DEFAULT_CIRCLE_SEGMENTS: usize = 32;

/// Smallest ring: three distinct vertices plus the closing vertex.
pub const MIN_RING_POINTS: usize = 4;

const WKT_PREFIX: &str = "POLYGON((";
const WKT_SUFFIX: &str = "))";

lazy_static! {
    /// `POLYGON((...))`, case-insensitive, whitespace allowed around the parentheses.
    static ref POLYGON_WKT: Regex =
        Regex::new(r"(?is)^POLYGON\s*\(\s*\((.*)\)\s*\)$").unwrap();
    static ref COORDINATE_PAIR: Regex =
        Regex::new(r"^[-+]?[0-9]*\.?[0-9]+ [-+]?[0-9]*\.?[0-9]+$").unwrap();
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GeometryError {
    #[error("an area needs either a polygon or a center point with a radius")]
    MissingShape,

    #[error("an area cannot have both a polygon and a radius")]
    AmbiguousShape,

    #[error("a circular area needs latitude, longitude and radius together")]
    IncompleteCircle,

    #[error("polygon must be written as POLYGON((x y, ...))")]
    NotAPolygon,

    #[error("polygon needs at least {MIN_RING_POINTS} points, got {0}")]
    TooFewPoints(usize),

    #[error("polygon ring is not closed: first point '{first}' differs from last point '{last}'")]
    RingNotClosed { first: String, last: String },

    #[error("invalid coordinate pair '{0}'")]
    InvalidCoordinate(String),

    #[error("coordinate '{0}' is outside the valid longitude/latitude range")]
    CoordinateOutOfRange(String),

    #[error("{0}")]
    InvalidRadius(String),
}

/// Turns user-supplied shapes into queryable polygons.
#[derive(Debug, Clone, Copy)]
pub struct GeometryResolver {
    circle_segments: usize,
}

impl Default for GeometryResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CIRCLE_SEGMENTS)
    }
}

impl GeometryResolver {
    pub fn new(circle_segments: usize) -> Self {
        Self {
            circle_segments: circle_segments.max(3),
        }
    }

    pub fn circle_segments(&self) -> usize {
        self.circle_segments
    }

    /// Classifies the raw input into exactly one shape form.
    pub fn classify(&self, input: &AreaShapeInput) -> Result<AreaShape, GeometryError> {
        let polygon = input
            .polygon_area
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let has_circle_part = input.latitude.is_some()
            || input.longitude.is_some()
            || input.radius_in_meters.is_some();

        match (polygon, has_circle_part) {
            (Some(_), true) => Err(GeometryError::AmbiguousShape),
            (Some(wkt), false) => Ok(AreaShape::Polygon(wkt.to_string())),
            (None, false) => Err(GeometryError::MissingShape),
            (None, true) => match (input.latitude, input.longitude, input.radius_in_meters) {
                (Some(latitude), Some(longitude), Some(radius_in_meters)) => {
                    Ok(AreaShape::Circle(Circle {
                        center: Position::new(latitude, longitude),
                        radius_in_meters,
                    }))
                }
                _ => Err(GeometryError::IncompleteCircle),
            },
        }
    }

    /// Validates the input and returns both its canonical shape and the polygon used for matching.
    pub fn resolve(&self, input: &AreaShapeInput) -> Result<(AreaShape, Polygon<f64>), GeometryError> {
        let shape = self.classify(input)?;
        let polygon = self.resolve_shape(&shape)?;
        Ok((shape, polygon))
    }

    pub fn resolve_shape(&self, shape: &AreaShape) -> Result<Polygon<f64>, GeometryError> {
        match shape {
            AreaShape::Polygon(wkt) => parse_polygon_wkt(wkt),
            AreaShape::Circle(circle) => self.buffer_circle(circle),
        }
    }

    /// Approximates a circle with a ring whose vertices sit exactly `radius` metres
    /// from the center along great-circle bearings.
    pub fn buffer_circle(&self, circle: &Circle) -> Result<Polygon<f64>, GeometryError> {
        shared::validation::validate_latitude(circle.center.latitude)
            .map_err(|e| GeometryError::CoordinateOutOfRange(shared::validation::message_of(&e)))?;
        shared::validation::validate_longitude(circle.center.longitude)
            .map_err(|e| GeometryError::CoordinateOutOfRange(shared::validation::message_of(&e)))?;
        shared::validation::validate_radius_meters(circle.radius_in_meters)
            .map_err(|e| GeometryError::InvalidRadius(shared::validation::message_of(&e)))?;

        let center = Point::new(circle.center.longitude, circle.center.latitude);
        let step = 360.0 / self.circle_segments as f64;
        let mut ring: Vec<Coord<f64>> = (0..self.circle_segments)
            .map(|i| center.haversine_destination(i as f64 * step, circle.radius_in_meters).0)
            .collect();
        ring.push(ring[0]);

        Ok(Polygon::new(LineString::from(ring), vec![]))
    }
}

/// Parses `POLYGON((x y, x y, ...))` into a polygon, enforcing ring closure by
/// exact token comparison.
pub fn parse_polygon_wkt(wkt: &str) -> Result<Polygon<f64>, GeometryError> {
    let body = POLYGON_WKT
        .captures(wkt.trim())
        .and_then(|captures| captures.get(1))
        .map(|body| body.as_str())
        .ok_or(GeometryError::NotAPolygon)?;

    let points: Vec<&str> = body.split(',').map(str::trim).collect();
    if points.len() < MIN_RING_POINTS {
        return Err(GeometryError::TooFewPoints(points.len()));
    }

    let first = points[0];
    let last = points[points.len() - 1];
    if first != last {
        return Err(GeometryError::RingNotClosed {
            first: first.to_string(),
            last: last.to_string(),
        });
    }

    let coords = points
        .iter()
        .map(|point| parse_coordinate(point))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Polygon::new(LineString::from(coords), vec![]))
}

fn parse_coordinate(point: &str) -> Result<Coord<f64>, GeometryError> {
    if !COORDINATE_PAIR.is_match(point) {
        return Err(GeometryError::InvalidCoordinate(point.to_string()));
    }

    let mut parts = point.split(' ');
    let (Some(x), Some(y)) = (parts.next(), parts.next()) else {
        return Err(GeometryError::InvalidCoordinate(point.to_string()));
    };
    let x: f64 = x
        .parse()
        .map_err(|_| GeometryError::InvalidCoordinate(point.to_string()))?;
    let y: f64 = y
        .parse()
        .map_err(|_| GeometryError::InvalidCoordinate(point.to_string()))?;

    if !(-180.0..=180.0).contains(&x) || !(-90.0..=90.0).contains(&y) {
        return Err(GeometryError::CoordinateOutOfRange(point.to_string()));
    }

    Ok(Coord { x, y })
}

/// Serializes a polygon's exterior ring as WKT for the spatial store.
pub fn polygon_to_wkt(polygon: &Polygon<f64>) -> String {
    let points: Vec<String> = polygon
        .exterior()
        .coords()
        .map(|c| format!("{} {}", c.x, c.y))
        .collect();
    format!("{}{}{}", WKT_PREFIX, points.join(","), WKT_SUFFIX)
}

/// Intersection test matching the spatial store's predicate; boundary points count.
pub fn contains_position(polygon: &Polygon<f64>, position: Position) -> bool {
    polygon.intersects(&Point::new(position.longitude, position.latitude))
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::HaversineDistance;

    const SQUARE: &str = "POLYGON((0 0,10 0,10 10,0 10,0 0))";

    fn circle_input(lat: f64, lon: f64, radius: f64) -> AreaShapeInput {
        AreaShapeInput {
            polygon_area: None,
            latitude: Some(lat),
            longitude: Some(lon),
            radius_in_meters: Some(radius),
        }
    }

    #[test]
    fn test_parse_well_formed_square() {
        let polygon = parse_polygon_wkt(SQUARE).unwrap();
        assert_eq!(polygon.exterior().coords().count(), 5);
        assert!(contains_position(&polygon, Position::new(5.0, 5.0)));
        assert!(!contains_position(&polygon, Position::new(25.0, 25.0)));
    }

    #[test]
    fn test_parse_tolerates_whitespace_around_points() {
        let polygon = parse_polygon_wkt("POLYGON(( 0 0 , 10 0, 10 10 ,0 0 ))").unwrap();
        assert_eq!(polygon.exterior().coords().count(), 4);
    }

    #[test]
    fn test_fewer_than_four_points_rejected() {
        let err = parse_polygon_wkt("POLYGON((0 0,10 0,0 0))").unwrap_err();
        assert_eq!(err, GeometryError::TooFewPoints(3));
    }

    #[test]
    fn test_open_ring_rejected() {
        let err = parse_polygon_wkt("POLYGON((0 0,10 0,10 10,0 10))").unwrap_err();
        assert!(matches!(err, GeometryError::RingNotClosed { .. }));
    }

    #[test]
    fn test_ring_closure_is_token_exact() {
        let err = parse_polygon_wkt("POLYGON((0 0,10 0,10 10,0.0 0))").unwrap_err();
        assert_eq!(
            err,
            GeometryError::RingNotClosed {
                first: "0 0".to_string(),
                last: "0.0 0".to_string(),
            }
        );
    }

    #[test]
    fn test_bad_coordinate_pair_rejected() {
        for wkt in [
            "POLYGON((0 0,10,10 10,0 0))",
            "POLYGON((0 0,10  0,10 10,0 0))",
            "POLYGON((0 0,a b,10 10,0 0))",
        ] {
            assert!(
                matches!(parse_polygon_wkt(wkt), Err(GeometryError::InvalidCoordinate(_))),
                "expected rejection for {}",
                wkt
            );
        }
    }

    #[test]
    fn test_missing_wrapper_rejected() {
        assert_eq!(
            parse_polygon_wkt("0 0,10 0,10 10,0 0").unwrap_err(),
            GeometryError::NotAPolygon
        );
    }

    #[test]
    fn test_keyword_case_and_spacing_accepted() {
        for wkt in [
            "POLYGON ((0 0,10 0,10 10,0 10,0 0))",
            "polygon((0 0,10 0,10 10,0 10,0 0))",
            "Polygon ( (0 0,10 0,10 10,0 10,0 0) )",
        ] {
            let polygon = parse_polygon_wkt(wkt).unwrap();
            assert_eq!(polygon, parse_polygon_wkt(SQUARE).unwrap(), "{}", wkt);
        }
        assert_eq!(
            parse_polygon_wkt("MULTIPOLYGON(((0 0,10 0,10 10,0 0)))").unwrap_err(),
            GeometryError::NotAPolygon
        );
    }

    #[test]
    fn test_out_of_range_vertex_rejected() {
        let err = parse_polygon_wkt("POLYGON((0 0,200 0,10 10,0 0))").unwrap_err();
        assert!(matches!(err, GeometryError::CoordinateOutOfRange(_)));
    }

    #[test]
    fn test_signed_and_fractional_coordinates() {
        let polygon =
            parse_polygon_wkt("POLYGON((-1.5 -1.5,+1.5 -1.5,1.5 .5,-1.5 -1.5))").unwrap();
        assert_eq!(polygon.exterior().0[2], Coord { x: 1.5, y: 0.5 });
    }

    #[test]
    fn test_wkt_roundtrip_preserves_vertices() {
        let polygon = parse_polygon_wkt(SQUARE).unwrap();
        assert_eq!(polygon_to_wkt(&polygon), SQUARE);
    }

    #[test]
    fn test_classify_requires_exactly_one_form() {
        let resolver = GeometryResolver::default();
        assert_eq!(
            resolver.classify(&AreaShapeInput::default()).unwrap_err(),
            GeometryError::MissingShape
        );

        let both = AreaShapeInput {
            polygon_area: Some(SQUARE.to_string()),
            ..circle_input(1.0, 1.0, 100.0)
        };
        assert_eq!(resolver.classify(&both).unwrap_err(), GeometryError::AmbiguousShape);

        let partial = AreaShapeInput {
            latitude: Some(1.0),
            ..AreaShapeInput::default()
        };
        assert_eq!(resolver.classify(&partial).unwrap_err(), GeometryError::IncompleteCircle);
    }

    #[test]
    fn test_blank_polygon_counts_as_missing() {
        let input = AreaShapeInput {
            polygon_area: Some("   ".to_string()),
            ..AreaShapeInput::default()
        };
        assert_eq!(
            GeometryResolver::default().classify(&input).unwrap_err(),
            GeometryError::MissingShape
        );
    }

    #[test]
    fn test_circle_resolution_is_idempotent() {
        let resolver = GeometryResolver::default();
        let input = circle_input(48.1486, 17.1077, 500.0);
        let (_, first) = resolver.resolve(&input).unwrap();
        let (_, second) = resolver.resolve(&input).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_circle_vertices_are_metrically_correct_at_high_latitude() {
        let resolver = GeometryResolver::new(16);
        let circle = Circle {
            center: Position::new(69.65, 18.95),
            radius_in_meters: 1_000.0,
        };
        let polygon = resolver.buffer_circle(&circle).unwrap();
        let center = Point::new(18.95, 69.65);

        assert_eq!(polygon.exterior().coords().count(), 17);
        for coord in polygon.exterior().coords() {
            let distance = center.haversine_distance(&Point::from(*coord));
            assert!((distance - 1_000.0).abs() < 1.0, "distance was {}", distance);
        }
        assert!(contains_position(&polygon, circle.center));
    }

    #[test]
    fn test_circle_rejects_bad_radius_and_center() {
        let resolver = GeometryResolver::default();
        assert!(matches!(
            resolver.resolve(&circle_input(1.0, 1.0, 0.0)),
            Err(GeometryError::InvalidRadius(_))
        ));
        assert!(matches!(
            resolver.resolve(&circle_input(91.0, 1.0, 100.0)),
            Err(GeometryError::CoordinateOutOfRange(_))
        ));
    }

    #[test]
    fn test_boundary_point_intersects() {
        let polygon = parse_polygon_wkt(SQUARE).unwrap();
        assert!(contains_position(&polygon, Position::new(0.0, 5.0)));
    }

    #[test]
    fn test_segment_floor() {
        assert_eq!(GeometryResolver::new(1).circle_segments(), 3);
    }
}
