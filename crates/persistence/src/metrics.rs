//! Database metrics: query latency and pool occupancy.

use std::future::Future;
use std::time::Instant;

use metrics::{gauge, histogram};
use sqlx::PgPool;

/// Records one query's latency under its name.
pub fn record_query_duration(query_name: &'static str, duration_secs: f64) {
    histogram!("database_query_duration_seconds", "query" => query_name).record(duration_secs);
}

/// Publishes pool size gauges. Called periodically by the pool metrics job.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

/// Measures a query from construction until [`QueryTimer::record`].
pub struct QueryTimer {
    query_name: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query_name: &'static str) -> Self {
        Self {
            query_name,
            start: Instant::now(),
        }
    }

    pub fn record(self) {
        record_query_duration(self.query_name, self.start.elapsed().as_secs_f64());
    }
}

/// Awaits `query` and records its latency, whatever the outcome.
pub async fn timed<F, T>(query_name: &'static str, query: F) -> T
where
    F: Future<Output = T>,
{
    let timer = QueryTimer::new(query_name);
    let result = query.await;
    timer.record();
    result
}
