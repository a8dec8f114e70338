//! Event domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::models::location::Position;

/// Kind of incident an event reports.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Robbery,
    Lost,
    Accident,
    Other,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Robbery => "robbery",
            EventType::Lost => "lost",
            EventType::Accident => "accident",
            EventType::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "robbery" => Some(EventType::Robbery),
            "lost" => Some(EventType::Lost),
            "accident" => Some(EventType::Accident),
            "other" => Some(EventType::Other),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Open,
    Resolved,
    Closed,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Open => "open",
            EventStatus::Resolved => "resolved",
            EventStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(EventStatus::Open),
            "resolved" => Some(EventStatus::Resolved),
            "closed" => Some(EventStatus::Closed),
            _ => None,
        }
    }
}

/// An event reported at a point. Only public events take part in geofence matching.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub event_type: EventType,
    pub status: EventStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub is_public: bool,
    pub created_by: Uuid,
    pub device_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Event {
    pub fn position(&self) -> Position {
        Position::new(self.latitude, self.longitude)
    }
}

/// Payload for creating an event.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,

    #[validate(length(max = 2000, message = "Description must be at most 2000 characters"))]
    pub description: Option<String>,

    pub event_type: EventType,

    #[validate(custom(function = "shared::validation::validate_latitude"))]
    pub latitude: f64,

    #[validate(custom(function = "shared::validation::validate_longitude"))]
    pub longitude: f64,

    #[serde(default = "default_public")]
    pub is_public: bool,

    /// Device that originated the event, if any.
    pub device_id: Option<Uuid>,
}

fn default_public() -> bool {
    true
}
