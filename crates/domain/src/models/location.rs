//! Location fix domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of most recent fixes retained per device.
pub const FIX_RETENTION: i64 = 5;

/// A WGS 84 point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// A stored, timestamped reading for a device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub id: i64,
    pub device_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    pub captured_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl LocationFix {
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// A fix about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewLocationFix {
    pub device_id: Uuid,
    pub position: Position,
    pub captured_at: DateTime<Utc>,
}

impl NewLocationFix {
    /// A fix captured now.
    pub fn now(device_id: Uuid, position: Position) -> Self {
        Self {
            device_id,
            position,
            captured_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fix_serializes_camel_case() {
        let fix = LocationFix {
            id: 1,
            device_id: Uuid::nil(),
            latitude: 1.0,
            longitude: 2.0,
            captured_at: Utc::now(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&fix).unwrap();
        assert!(json.get("deviceId").is_some());
        assert!(json.get("capturedAt").is_some());
        assert_eq!(fix.position(), Position::new(1.0, 2.0));
    }
}
