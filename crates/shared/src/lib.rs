//! Shared utilities for the Geo Tracker backend.
//!
//! This crate provides small helpers used across the other crates:
//! - Coordinate and radius validation
//! - Secret fingerprinting for log output

pub mod crypto;
pub mod validation;
