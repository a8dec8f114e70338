use axum::{middleware, routing::get, Router};
use domain::geometry::GeometryResolver;
use domain::services::{GeofenceMatcher, GeofenceService};
use persistence::repositories::{AreaOfInterestRepository, EventRepository};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::config::{Config, GeofenceConfig};
use crate::middleware::{metrics_handler, metrics_middleware};
use crate::routes::health;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
}

/// Wires the geofence service to the PostGIS repositories, for services that
/// mount area and event routes on top of this crate.
pub fn build_geofence_service(config: &GeofenceConfig, pool: &PgPool) -> GeofenceService {
    let areas = Arc::new(AreaOfInterestRepository::new(pool.clone()));
    let matcher = Arc::new(GeofenceMatcher::new(areas.clone()));
    GeofenceService::new(
        GeometryResolver::new(config.circle_segments),
        areas,
        Arc::new(EventRepository::new(pool.clone())),
        matcher,
    )
}

/// Builds the operational router: liveness, readiness and Prometheus scrape.
pub fn create_app(config: Arc<Config>, pool: PgPool) -> Router {
    let timeout = Duration::from_secs(config.server.request_timeout_secs);
    let state = AppState { pool, config };

    Router::new()
        .route("/health/live", get(health::live))
        .route("/health/ready", get(health::ready))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
