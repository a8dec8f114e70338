//! Domain services for Geo Tracker.
//!
//! Services contain the ingestion and geofencing logic and depend only on
//! the traits in [`ports`].

pub mod geofence;
pub mod ingestion;
pub mod memory;
pub mod mock_provider;
pub mod ports;

pub use geofence::{CreatedEvent, GeofenceMatcher, GeofenceService};
pub use ingestion::{IngestFailure, IngestReport, IngestStage, LocationIngestor};
pub use memory::MemoryTrackerStore;
pub use mock_provider::MockLocationProvider;
pub use ports::{
    AreaChange, AreaStore, DeviceRegistry, EventStore, FixResponse, LocationProvider, LocationStore,
    PollSettingsSource, SessionStore, SpatialStore,
};
