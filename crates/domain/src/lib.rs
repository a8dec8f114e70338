//! Domain layer for the Geo Tracker backend.
//!
//! This crate contains:
//! - Domain models (Device, LocationFix, Session, AreaOfInterest, Event)
//! - Geometry resolution for areas of interest
//! - Storage and provider traits, plus in-memory implementations
//! - Location ingestion and geofence matching services
//! - Domain error types

pub mod error;
pub mod geometry;
pub mod models;
pub mod services;

pub use error::{ProviderError, TrackingError};
