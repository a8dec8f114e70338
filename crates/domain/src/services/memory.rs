//! In-memory implementation of every store trait.
//!
//! Used by unit tests and by local runs without a database. Spatial predicates
//! use the same intersection semantics as the PostGIS queries.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use geo::Polygon;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::TrackingError;
use crate::geometry::contains_position;
use crate::models::{
    AreaOfInterest, AreaShape, Event, EventStatus, LocationFix, NewEvent, NewLocationFix,
    Position, ProviderCredentials, SessionToken, TrackedDevice,
};
use crate::services::ports::{
    AreaChange, AreaStore, DeviceRegistry, EventStore, LocationStore, PollSettingsSource,
    SessionStore, SpatialStore,
};

#[derive(Default)]
struct Inner {
    devices: HashMap<Uuid, TrackedDevice>,
    fixes: Vec<LocationFix>,
    next_fix_id: i64,
    areas: HashMap<Uuid, AreaOfInterest>,
    events: HashMap<Uuid, Event>,
    /// (area_id, event_id) pairs; never duplicated.
    links: Vec<(Uuid, Uuid)>,
    poll_interval: Option<Duration>,
}

#[derive(Default)]
pub struct MemoryTrackerStore {
    inner: Mutex<Inner>,
    fail_pruning: AtomicBool,
    fail_relinking: AtomicBool,
    fail_event_linking: AtomicBool,
}

impl MemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a device and returns it.
    pub async fn add_device(
        &self,
        number: Option<&str>,
        credentials: Option<ProviderCredentials>,
        trackable: bool,
    ) -> TrackedDevice {
        let now = Utc::now();
        let device = TrackedDevice {
            id: Uuid::new_v4(),
            number: number.map(str::to_string),
            credentials,
            trackable,
            session_token: None,
            owner_id: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.inner
            .lock()
            .await
            .devices
            .insert(device.id, device.clone());
        device
    }

    pub async fn soft_delete_device(&self, device_id: Uuid) {
        if let Some(device) = self.inner.lock().await.devices.get_mut(&device_id) {
            device.deleted_at = Some(Utc::now());
        }
    }

    /// Fixes for a device, most recent first.
    pub async fn fixes_for(&self, device_id: Uuid) -> Vec<LocationFix> {
        let inner = self.inner.lock().await;
        let mut fixes: Vec<LocationFix> = inner
            .fixes
            .iter()
            .filter(|f| f.device_id == device_id)
            .cloned()
            .collect();
        fixes.sort_by(|a, b| b.captured_at.cmp(&a.captured_at).then(b.id.cmp(&a.id)));
        fixes
    }

    pub async fn set_poll_interval(&self, interval: Option<Duration>) {
        self.inner.lock().await.poll_interval = interval;
    }

    /// Makes subsequent `prune_fixes` calls fail.
    pub fn fail_pruning(&self, fail: bool) {
        self.fail_pruning.store(fail, Ordering::SeqCst);
    }

    /// Makes area relinking fail, which also aborts area saves.
    pub fn fail_relinking(&self, fail: bool) {
        self.fail_relinking.store(fail, Ordering::SeqCst);
    }

    /// Makes `areas_containing` and `link_event_to_areas` fail.
    pub fn fail_event_linking(&self, fail: bool) {
        self.fail_event_linking.store(fail, Ordering::SeqCst);
    }

    pub async fn find_event(&self, event_id: Uuid) -> Option<Event> {
        self.inner.lock().await.events.get(&event_id).cloned()
    }

    pub async fn area_count(&self) -> usize {
        self.inner.lock().await.areas.len()
    }

    /// Total number of association rows across all areas.
    pub async fn link_row_count(&self) -> usize {
        self.inner.lock().await.links.len()
    }

    fn events_newest_first(inner: &Inner, mut ids: Vec<Uuid>) -> Vec<Uuid> {
        ids.sort_by(|a, b| {
            let a = inner.events.get(a).map(|e| e.created_at);
            let b = inner.events.get(b).map(|e| e.created_at);
            b.cmp(&a)
        });
        ids
    }

    fn check_relinking(&self) -> Result<(), TrackingError> {
        if self.fail_relinking.load(Ordering::SeqCst) {
            return Err(TrackingError::Persistence("relink disabled".into()));
        }
        Ok(())
    }

    fn check_event_linking(&self) -> Result<(), TrackingError> {
        if self.fail_event_linking.load(Ordering::SeqCst) {
            return Err(TrackingError::Persistence("event linking disabled".into()));
        }
        Ok(())
    }

    fn public_events_within(inner: &Inner, geometry: &Polygon<f64>) -> Vec<Uuid> {
        let ids = inner
            .events
            .values()
            .filter(|e| e.is_public && contains_position(geometry, e.position()))
            .map(|e| e.id)
            .collect();
        Self::events_newest_first(inner, ids)
    }

    fn replace_links(inner: &mut Inner, area_id: Uuid, event_ids: &[Uuid]) {
        inner.links.retain(|(area, _)| *area != area_id);
        inner
            .links
            .extend(event_ids.iter().map(|event_id| (area_id, *event_id)));
    }
}

#[async_trait::async_trait]
impl DeviceRegistry for MemoryTrackerStore {
    async fn list_pollable(&self) -> Result<Vec<TrackedDevice>, TrackingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .devices
            .values()
            .filter(|d| d.is_pollable())
            .cloned()
            .collect())
    }

    async fn find_by_number(&self, number: &str) -> Result<Option<TrackedDevice>, TrackingError> {
        let inner = self.inner.lock().await;
        Ok(inner
            .devices
            .values()
            .find(|d| d.deleted_at.is_none() && d.number.as_deref() == Some(number))
            .cloned())
    }
}

#[async_trait::async_trait]
impl SessionStore for MemoryTrackerStore {
    async fn load_session(&self, device_id: Uuid) -> Result<Option<SessionToken>, TrackingError> {
        let inner = self.inner.lock().await;
        let device = inner
            .devices
            .get(&device_id)
            .ok_or_else(|| TrackingError::NotFound(format!("device {}", device_id)))?;
        Ok(device.session_token.clone())
    }

    async fn save_session(&self, device_id: Uuid, token: &SessionToken) -> Result<(), TrackingError> {
        let mut inner = self.inner.lock().await;
        let device = inner
            .devices
            .get_mut(&device_id)
            .ok_or_else(|| TrackingError::NotFound(format!("device {}", device_id)))?;
        device.session_token = Some(token.clone());
        device.updated_at = Utc::now();
        Ok(())
    }

    async fn clear_session(&self, device_id: Uuid) -> Result<(), TrackingError> {
        let mut inner = self.inner.lock().await;
        if let Some(device) = inner.devices.get_mut(&device_id) {
            device.session_token = None;
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl LocationStore for MemoryTrackerStore {
    async fn append_fix(&self, fix: NewLocationFix) -> Result<LocationFix, TrackingError> {
        let mut inner = self.inner.lock().await;
        inner.next_fix_id += 1;
        let stored = LocationFix {
            id: inner.next_fix_id,
            device_id: fix.device_id,
            latitude: fix.position.latitude,
            longitude: fix.position.longitude,
            captured_at: fix.captured_at,
            created_at: Utc::now(),
        };
        inner.fixes.push(stored.clone());
        Ok(stored)
    }

    async fn prune_fixes(&self, device_id: Uuid, keep: i64) -> Result<u64, TrackingError> {
        if self.fail_pruning.load(Ordering::SeqCst) {
            return Err(TrackingError::Persistence("prune disabled".into()));
        }

        let keep_ids: Vec<i64> = self
            .fixes_for(device_id)
            .await
            .iter()
            .take(keep.max(0) as usize)
            .map(|f| f.id)
            .collect();

        let mut inner = self.inner.lock().await;
        let before = inner.fixes.len();
        inner
            .fixes
            .retain(|f| f.device_id != device_id || keep_ids.contains(&f.id));
        Ok((before - inner.fixes.len()) as u64)
    }
}

#[async_trait::async_trait]
impl PollSettingsSource for MemoryTrackerStore {
    async fn poll_interval(&self) -> Result<Duration, TrackingError> {
        self.inner
            .lock()
            .await
            .poll_interval
            .ok_or_else(|| TrackingError::NotFound("tracker settings".into()))
    }
}

#[async_trait::async_trait]
impl AreaStore for MemoryTrackerStore {
    async fn save_area_and_relink(
        &self,
        change: AreaChange,
        shape: &AreaShape,
        geometry: &Polygon<f64>,
    ) -> Result<(AreaOfInterest, Vec<Uuid>), TrackingError> {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        let area = match change {
            AreaChange::Create(owner) => AreaOfInterest {
                id: Uuid::new_v4(),
                owner,
                shape: shape.clone(),
                geometry: geometry.clone(),
                created_at: now,
                updated_at: now,
            },
            AreaChange::Update(area_id) => {
                let existing = inner.areas.get(&area_id).ok_or_else(|| {
                    TrackingError::NotFound(format!("area of interest {}", area_id))
                })?;
                AreaOfInterest {
                    shape: shape.clone(),
                    geometry: geometry.clone(),
                    updated_at: now,
                    ..existing.clone()
                }
            }
        };
        let linked = Self::public_events_within(&inner, &area.geometry);

        // Nothing is written until every step has succeeded.
        self.check_relinking()?;
        inner.areas.insert(area.id, area.clone());
        Self::replace_links(&mut inner, area.id, &linked);
        Ok((area, linked))
    }

    async fn find_area(&self, area_id: Uuid) -> Result<Option<AreaOfInterest>, TrackingError> {
        Ok(self.inner.lock().await.areas.get(&area_id).cloned())
    }
}

#[async_trait::async_trait]
impl EventStore for MemoryTrackerStore {
    async fn insert_event(&self, created_by: Uuid, event: &NewEvent) -> Result<Event, TrackingError> {
        let now = Utc::now();
        let stored = Event {
            id: Uuid::new_v4(),
            title: event.title.clone(),
            description: event.description.clone(),
            event_type: event.event_type,
            status: EventStatus::Open,
            latitude: event.latitude,
            longitude: event.longitude,
            is_public: event.is_public,
            created_by,
            device_id: event.device_id,
            created_at: now,
            updated_at: now,
        };
        self.inner
            .lock()
            .await
            .events
            .insert(stored.id, stored.clone());
        Ok(stored)
    }
}

#[async_trait::async_trait]
impl SpatialStore for MemoryTrackerStore {
    async fn relink_area(&self, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError> {
        let mut inner = self.inner.lock().await;
        let geometry = inner
            .areas
            .get(&area_id)
            .map(|area| area.geometry.clone())
            .ok_or_else(|| TrackingError::NotFound(format!("area of interest {}", area_id)))?;
        let linked = Self::public_events_within(&inner, &geometry);

        self.check_relinking()?;
        Self::replace_links(&mut inner, area_id, &linked);
        Ok(linked)
    }

    async fn areas_containing(&self, position: Position) -> Result<Vec<Uuid>, TrackingError> {
        self.check_event_linking()?;
        let inner = self.inner.lock().await;
        Ok(inner
            .areas
            .values()
            .filter(|a| contains_position(&a.geometry, position))
            .map(|a| a.id)
            .collect())
    }

    async fn link_event_to_areas(&self, event_id: Uuid, area_ids: &[Uuid]) -> Result<u64, TrackingError> {
        self.check_event_linking()?;
        let mut inner = self.inner.lock().await;
        let mut inserted = 0;
        for area_id in area_ids {
            if !inner.links.contains(&(*area_id, event_id)) {
                inner.links.push((*area_id, event_id));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn linked_events(&self, area_id: Uuid) -> Result<Vec<Uuid>, TrackingError> {
        let inner = self.inner.lock().await;
        let ids = inner
            .links
            .iter()
            .filter(|(area, _)| *area == area_id)
            .map(|(_, event)| *event)
            .collect();
        Ok(Self::events_newest_first(&inner, ids))
    }
}
