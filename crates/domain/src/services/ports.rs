//! Storage and provider abstractions used by the tracking services.
//!
//! The persistence crate implements the store traits against PostgreSQL/PostGIS,
//! the api crate implements [`LocationProvider`] against the GPS portal, and
//! [`super::memory`] / [`super::mock_provider`] provide in-process versions for tests.

use std::time::Duration;

use geo::Polygon;
use uuid::Uuid;

use crate::error::{ProviderError, TrackingError};
use crate::models::{
    AreaOfInterest, AreaOwner, AreaShape, Event, LocationFix, NewEvent, NewLocationFix, Position,
    ProviderCredentials, SessionToken, TrackedDevice,
};

/// Outcome of a fix request that reached the portal.
#[derive(Debug, Clone, PartialEq)]
pub enum FixResponse {
    Position(Position),
    /// The portal answered with its "session invalid" sentinel.
    SessionInvalid,
}

/// The external GPS portal.
#[async_trait::async_trait]
pub trait LocationProvider: Send + Sync {
    /// Runs the scripted login and returns the authenticated session token.
    async fn login(&self, credentials: &ProviderCredentials) -> Result<SessionToken, ProviderError>;

    /// Fetches the current position using an existing session.
    async fn current_fix(&self, token: &SessionToken) -> Result<FixResponse, ProviderError>;
}

/// Read access to the device registry.
#[async_trait::async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// Devices flagged trackable, with credentials, and not deleted.
    async fn list_pollable(&self) -> Result<Vec<TrackedDevice>, TrackingError>;

    async fn find_by_number(&self, number: &str) -> Result<Option<TrackedDevice>, TrackingError>;
}

/// Per-device cache of the portal session token.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    async fn load_session(&self, device_id: Uuid) -> Result<Option<SessionToken>, TrackingError>;

    async fn save_session(&self, device_id: Uuid, token: &SessionToken) -> Result<(), TrackingError>;

    async fn clear_session(&self, device_id: Uuid) -> Result<(), TrackingError>;
}

/// Append-only fix history with bounded retention.
#[async_trait::async_trait]
pub trait LocationStore: Send + Sync {
    async fn append_fix(&self, fix: NewLocationFix) -> Result<LocationFix, TrackingError>;

    /// Deletes all but the `keep` most recent fixes by capture time. Returns rows deleted.
    async fn prune_fixes(&self, device_id: Uuid, keep: i64) -> Result<u64, TrackingError>;
}

/// Source of the polling cadence, consulted at the start of every cycle.
#[async_trait::async_trait]
pub trait PollSettingsSource: Send + Sync {
    async fn poll_interval(&self) -> Result<Duration, TrackingError>;
}

/// Which row an area write targets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AreaChange {
    Create(AreaOwner),
    Update(Uuid),
}

#[async_trait::async_trait]
pub trait AreaStore: Send + Sync {
    /// Persists the area and replaces its event links with the public events its
    /// stored geometry intersects, as one unit. On error neither the area nor its
    /// links change. Returns the saved area and the linked event ids, most recent first.
    async fn save_area_and_relink(
        &self,
        change: AreaChange,
        shape: &AreaShape,
        geometry: &Polygon<f64>,
    ) -> Result<(AreaOfInterest, Vec<Uuid>), TrackingError>;

    async fn find_area(&self, area_id: Uuid) -> Result<Option<AreaOfInterest>, TrackingError>;
}

#[async_trait::async_trait]
pub trait EventStore: Send + Sync {
    async fn insert_event(&self, created_by: Uuid, event: &NewEvent) -> Result<Event, TrackingError>;
}

/// Geometry-aware reads and association writes.
#[async_trait::async_trait]
pub trait SpatialStore: Send + Sync {
    /// Atomically replaces the area's event links with the public events its stored
    /// geometry intersects. Returns the linked event ids, most recent first.
    async fn relink_area(&self, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError>;

    /// Areas whose geometry intersects the point.
    async fn areas_containing(&self, position: Position) -> Result<Vec<Uuid>, TrackingError>;

    /// Links the event to each area, ignoring links that already exist.
    /// Returns the number of rows actually inserted.
    async fn link_event_to_areas(&self, event_id: Uuid, area_ids: &[Uuid]) -> Result<u64, TrackingError>;

    /// Events currently linked to the area, most recent first.
    async fn linked_events(&self, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError>;
}
