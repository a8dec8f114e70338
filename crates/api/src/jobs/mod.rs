//! Background job scheduler and job implementations.

mod poll_devices;
mod pool_metrics;
mod scheduler;

pub use poll_devices::{CycleSummary, InFlightDevices, InFlightGuard, PollDevicesJob};
pub use pool_metrics::PoolMetricsJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
