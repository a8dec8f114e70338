//! Repository implementations for database operations.
//!
//! Each repository implements the matching store traits from `domain::services::ports`.

pub mod area_of_interest;
pub mod device;
pub mod event;
pub mod location;
pub mod tracker_settings;

pub use area_of_interest::AreaOfInterestRepository;
pub use device::{DeviceRepository, NewDevice};
pub use event::EventRepository;
pub use location::LocationRepository;
pub use tracker_settings::TrackerSettingsRepository;
