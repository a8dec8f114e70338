//! Persistence layer for the Geo Tracker backend.
//!
//! This crate contains:
//! - Database connection management and migrations
//! - Entity definitions (database row mappings)
//! - PostgreSQL/PostGIS implementations of the domain store traits
//! - Query timing metrics

pub mod db;
pub mod entities;
pub mod metrics;
pub mod repositories;
