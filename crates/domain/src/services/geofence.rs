//! Geofence matching between areas of interest and public events.
//!
//! The association between areas and events is derived data. It is
//! recomputed from geometry whenever an area's shape changes or a public
//! event is created, and never edited by hand. Neither trigger goes through
//! the other, so a recomputation can't cascade.

use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

use crate::error::TrackingError;
use crate::geometry::GeometryResolver;
use crate::models::{AreaOfInterest, AreaOwner, AreaShapeInput, Event, NewEvent};
use crate::services::ports::{AreaChange, AreaStore, EventStore, SpatialStore};

/// Keeps area/event links equal to the live spatial predicate.
pub struct GeofenceMatcher {
    spatial: Arc<dyn SpatialStore>,
}

impl GeofenceMatcher {
    pub fn new(spatial: Arc<dyn SpatialStore>) -> Self {
        Self { spatial }
    }

    /// Replaces the area's links with every public event inside its stored geometry.
    /// Returns the linked event ids, most recent first.
    pub async fn on_area_changed(&self, area: &AreaOfInterest) -> Result<Vec<Uuid>, TrackingError> {
        let event_ids = self.spatial.relink_area(area.id).await?;
        Self::record_area_links(area.id, &event_ids);
        Ok(event_ids)
    }

    fn record_area_links(area_id: Uuid, event_ids: &[Uuid]) {
        counter!("geofence_links_total", "trigger" => "area_changed")
            .increment(event_ids.len() as u64);
        debug!(area_id = %area_id, linked = event_ids.len(), "Recomputed area event links");
    }

    /// Links a public event into every area containing it. Private events are
    /// never linked. Returns the ids of the matching areas.
    pub async fn on_public_event_created(&self, event: &Event) -> Result<Vec<Uuid>, TrackingError> {
        if !event.is_public {
            return Ok(Vec::new());
        }

        let area_ids = self.spatial.areas_containing(event.position()).await?;
        if area_ids.is_empty() {
            return Ok(area_ids);
        }

        let inserted = self.spatial.link_event_to_areas(event.id, &area_ids).await?;
        counter!("geofence_links_total", "trigger" => "event_created").increment(inserted);
        debug!(
            event_id = %event.id,
            areas = area_ids.len(),
            inserted = inserted,
            "Linked event into areas"
        );

        Ok(area_ids)
    }

    /// Runs event matching on a detached task. Failures are logged only; the
    /// event row is already committed. Returns `None` for private events.
    pub fn dispatch_event_saved(self: &Arc<Self>, event: Event) -> Option<JoinHandle<()>> {
        if !event.is_public {
            return None;
        }

        let matcher = Arc::clone(self);
        Some(tokio::spawn(async move {
            if let Err(e) = matcher.on_public_event_created(&event).await {
                error!(
                    event_id = %event.id,
                    error = %e,
                    "Failed to match event against areas of interest"
                );
            }
        }))
    }
}

/// Entry points for the mutations that trigger geofence matching.
pub struct GeofenceService {
    resolver: GeometryResolver,
    areas: Arc<dyn AreaStore>,
    events: Arc<dyn EventStore>,
    matcher: Arc<GeofenceMatcher>,
}

/// An event together with the handle of its detached matching task.
pub struct CreatedEvent {
    pub event: Event,
    pub matching: Option<JoinHandle<()>>,
}

impl GeofenceService {
    pub fn new(
        resolver: GeometryResolver,
        areas: Arc<dyn AreaStore>,
        events: Arc<dyn EventStore>,
        matcher: Arc<GeofenceMatcher>,
    ) -> Self {
        Self {
            resolver,
            areas,
            events,
            matcher,
        }
    }

    pub fn resolver(&self) -> &GeometryResolver {
        &self.resolver
    }

    /// Validates the shape, then stores the area and links it in one unit.
    /// A failed link leaves no area behind.
    pub async fn create_area(
        &self,
        owner: AreaOwner,
        input: &AreaShapeInput,
    ) -> Result<AreaOfInterest, TrackingError> {
        let area = self.save_area(AreaChange::Create(owner), input).await?;
        info!(area_id = %area.id, "Area of interest created");
        Ok(area)
    }

    /// Replaces an area's shape and recomputes its links in one unit.
    /// A failed link keeps the previous shape and links.
    pub async fn update_area_geometry(
        &self,
        area_id: Uuid,
        input: &AreaShapeInput,
    ) -> Result<AreaOfInterest, TrackingError> {
        let area = self.save_area(AreaChange::Update(area_id), input).await?;
        info!(area_id = %area.id, "Area of interest geometry updated");
        Ok(area)
    }

    async fn save_area(
        &self,
        change: AreaChange,
        input: &AreaShapeInput,
    ) -> Result<AreaOfInterest, TrackingError> {
        let (shape, geometry) = self.resolver.resolve(input)?;
        let (area, linked) = self
            .areas
            .save_area_and_relink(change, &shape, &geometry)
            .await?;
        GeofenceMatcher::record_area_links(area.id, &linked);
        Ok(area)
    }

    /// Stores the event and, when public, dispatches matching without waiting for it.
    pub async fn create_event(
        &self,
        created_by: Uuid,
        input: NewEvent,
    ) -> Result<CreatedEvent, TrackingError> {
        input.validate()?;
        let event = self.events.insert_event(created_by, &input).await?;
        let matching = self.matcher.dispatch_event_saved(event.clone());

        info!(event_id = %event.id, public = event.is_public, "Event created");
        Ok(CreatedEvent { event, matching })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventType;
    use crate::services::memory::MemoryTrackerStore;
    use crate::services::ports::{AreaStore, SpatialStore};

    const LOW_SQUARE: &str = "POLYGON((0 0,10 0,10 10,0 10,0 0))";
    const HIGH_SQUARE: &str = "POLYGON((20 20,30 20,30 30,20 30,20 20))";

    fn setup() -> (GeofenceService, Arc<GeofenceMatcher>, Arc<MemoryTrackerStore>) {
        let store = Arc::new(MemoryTrackerStore::new());
        let matcher = Arc::new(GeofenceMatcher::new(store.clone()));
        let service = GeofenceService::new(
            GeometryResolver::default(),
            store.clone(),
            store.clone(),
            matcher.clone(),
        );
        (service, matcher, store)
    }

    fn event_at(lat: f64, lon: f64, is_public: bool) -> NewEvent {
        NewEvent {
            title: "Stolen bike".to_string(),
            description: None,
            event_type: EventType::Robbery,
            latitude: lat,
            longitude: lon,
            is_public,
            device_id: None,
        }
    }

    async fn create_and_wait(service: &GeofenceService, input: NewEvent) -> Event {
        let created = service.create_event(Uuid::new_v4(), input).await.unwrap();
        if let Some(handle) = created.matching {
            handle.await.unwrap();
        }
        created.event
    }

    fn owner() -> AreaOwner {
        AreaOwner::User(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_event_created_inside_area_is_linked_once() {
        let (service, _, store) = setup();
        let area = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();

        let event = create_and_wait(&service, event_at(5.0, 5.0, true)).await;

        assert_eq!(store.linked_events(area.id).await.unwrap(), vec![event.id]);
    }

    #[tokio::test]
    async fn test_area_moved_away_drops_event_and_moving_back_restores_it() {
        let (service, _, store) = setup();
        let area = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();
        let event = create_and_wait(&service, event_at(5.0, 5.0, true)).await;

        service
            .update_area_geometry(area.id, &AreaShapeInput::polygon(HIGH_SQUARE))
            .await
            .unwrap();
        assert!(store.linked_events(area.id).await.unwrap().is_empty());

        service
            .update_area_geometry(area.id, &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();
        assert_eq!(store.linked_events(area.id).await.unwrap(), vec![event.id]);
    }

    #[tokio::test]
    async fn test_new_area_picks_up_existing_events_newest_first() {
        let (service, matcher, store) = setup();
        let older = create_and_wait(&service, event_at(2.0, 2.0, true)).await;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let newer = create_and_wait(&service, event_at(3.0, 3.0, true)).await;
        create_and_wait(&service, event_at(50.0, 50.0, true)).await;

        let area = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();

        let linked = matcher.on_area_changed(&area).await.unwrap();
        assert_eq!(linked, vec![newer.id, older.id]);
        assert_eq!(store.linked_events(area.id).await.unwrap(), linked);
    }

    #[tokio::test]
    async fn test_private_events_are_never_linked() {
        let (service, matcher, store) = setup();
        let area = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();

        let created = service
            .create_event(Uuid::new_v4(), event_at(5.0, 5.0, false))
            .await
            .unwrap();
        assert!(created.matching.is_none());

        assert!(matcher
            .on_public_event_created(&created.event)
            .await
            .unwrap()
            .is_empty());
        matcher.on_area_changed(&area).await.unwrap();
        assert!(store.linked_events(area.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overlapping_areas_link_once_each_even_when_matched_twice() {
        let (service, matcher, store) = setup();
        let first = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();
        let second = service
            .create_area(owner(), &AreaShapeInput::polygon("POLYGON((4 4,8 4,8 8,4 4))"))
            .await
            .unwrap();

        let event = create_and_wait(&service, event_at(5.0, 6.0, true)).await;
        let mut areas = matcher.on_public_event_created(&event).await.unwrap();
        areas.sort();
        let mut expected = vec![first.id, second.id];
        expected.sort();

        assert_eq!(areas, expected);
        assert_eq!(store.link_row_count().await, 2);
        assert_eq!(store.linked_events(first.id).await.unwrap(), vec![event.id]);
        assert_eq!(store.linked_events(second.id).await.unwrap(), vec![event.id]);
    }

    #[tokio::test]
    async fn test_circle_area_matches_nearby_event() {
        let (service, _, store) = setup();
        let area = service
            .create_area(owner(), &AreaShapeInput::circle(48.1486, 17.1077, 1_000.0))
            .await
            .unwrap();

        let near = create_and_wait(&service, event_at(48.1520, 17.1100, true)).await;
        create_and_wait(&service, event_at(48.2000, 17.1077, true)).await;

        assert_eq!(store.linked_events(area.id).await.unwrap(), vec![near.id]);
    }

    #[tokio::test]
    async fn test_invalid_shape_rejected_before_persistence() {
        let (service, _, store) = setup();
        let err = service
            .create_area(owner(), &AreaShapeInput::polygon("POLYGON((0 0,10 0,10 10))"))
            .await
            .unwrap_err();
        assert!(err.is_user_facing());

        let err = service
            .create_area(owner(), &AreaShapeInput::default())
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::Validation(_)));
        assert!(store.areas_containing(crate::models::Position::new(5.0, 5.0)).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_unknown_area_is_not_found() {
        let (service, _, _) = setup();
        let err = service
            .update_area_geometry(Uuid::new_v4(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_failed_relink_on_create_persists_no_area() {
        let (service, _, store) = setup();
        create_and_wait(&service, event_at(5.0, 5.0, true)).await;
        store.fail_relinking(true);

        let err = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap_err();

        assert!(matches!(err, TrackingError::Persistence(_)));
        assert_eq!(store.area_count().await, 0);
        assert_eq!(store.link_row_count().await, 0);
        assert!(store
            .areas_containing(crate::models::Position::new(5.0, 5.0))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_failed_relink_on_update_keeps_previous_shape_and_links() {
        let (service, _, store) = setup();
        let area = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();
        let event = create_and_wait(&service, event_at(5.0, 5.0, true)).await;
        store.fail_relinking(true);

        assert!(service
            .update_area_geometry(area.id, &AreaShapeInput::polygon(HIGH_SQUARE))
            .await
            .is_err());

        let stored = store.find_area(area.id).await.unwrap().unwrap();
        assert_eq!(stored.geometry, area.geometry);
        assert_eq!(store.linked_events(area.id).await.unwrap(), vec![event.id]);
    }

    #[tokio::test]
    async fn test_failed_event_matching_keeps_event_and_writes_no_links() {
        let (service, _, store) = setup();
        let area = service
            .create_area(owner(), &AreaShapeInput::polygon(LOW_SQUARE))
            .await
            .unwrap();
        store.fail_event_linking(true);

        let created = service
            .create_event(Uuid::new_v4(), event_at(5.0, 5.0, true))
            .await
            .unwrap();
        let handle = created.matching.unwrap();
        assert!(handle.await.is_ok());

        assert!(store.find_event(created.event.id).await.is_some());
        assert!(store.linked_events(area.id).await.unwrap().is_empty());
        assert_eq!(store.link_row_count().await, 0);
    }

    #[tokio::test]
    async fn test_invalid_event_rejected() {
        let (service, _, _) = setup();
        let err = service
            .create_event(Uuid::new_v4(), event_at(120.0, 5.0, true))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, TrackingError::Validation(_)));
    }
}
