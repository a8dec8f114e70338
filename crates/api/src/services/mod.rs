//! External service integrations.

pub mod gps_portal;

pub use gps_portal::GpsPortalClient;
