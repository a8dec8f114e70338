//! Operational HTTP routes.

pub mod health;
