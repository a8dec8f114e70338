//! Background job that polls the GPS portal for every trackable device.
//!
//! Each cycle lists the pollable devices and hands every one of them to its
//! own task. The cycle never waits for ingestions to finish; concurrency is
//! capped by a semaphore and a device still being ingested from an earlier
//! cycle is skipped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use domain::services::ports::{DeviceRegistry, PollSettingsSource};
use domain::services::LocationIngestor;
use domain::TrackingError;
use metrics::{counter, gauge};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::scheduler::{Job, JobFrequency};
use crate::config::PollerConfig;

/// Devices with an ingestion currently running.
#[derive(Debug, Default)]
pub struct InFlightDevices {
    devices: Mutex<HashSet<Uuid>>,
}

impl InFlightDevices {
    /// Claims the device, or returns `None` if it is already claimed.
    pub fn try_claim(self: &Arc<Self>, device_id: Uuid) -> Option<InFlightGuard> {
        let mut devices = self.devices.lock().unwrap_or_else(|e| e.into_inner());
        if !devices.insert(device_id) {
            return None;
        }
        Some(InFlightGuard {
            owner: Arc::clone(self),
            device_id,
        })
    }

    pub fn contains(&self, device_id: Uuid) -> bool {
        self.devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(&device_id)
    }

    pub fn len(&self) -> usize {
        self.devices.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Releases the device claim on drop.
#[derive(Debug)]
pub struct InFlightGuard {
    owner: Arc<InFlightDevices>,
    device_id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.owner
            .devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.device_id);
    }
}

/// What one polling cycle dispatched.
#[derive(Debug)]
pub struct CycleSummary {
    pub listed: usize,
    pub skipped: usize,
    /// One handle per dispatched ingestion. Dropping them detaches the tasks.
    pub handles: Vec<JoinHandle<()>>,
}

/// Polls every pollable device once per cycle.
pub struct PollDevicesJob {
    registry: Arc<dyn DeviceRegistry>,
    ingestor: Arc<LocationIngestor>,
    settings: Arc<dyn PollSettingsSource>,
    default_interval: Duration,
    run_on_start: bool,
    permits: Arc<Semaphore>,
    in_flight: Arc<InFlightDevices>,
}

impl PollDevicesJob {
    pub fn new(
        registry: Arc<dyn DeviceRegistry>,
        ingestor: Arc<LocationIngestor>,
        settings: Arc<dyn PollSettingsSource>,
        config: &PollerConfig,
    ) -> Self {
        Self {
            registry,
            ingestor,
            settings,
            default_interval: config.default_interval(),
            run_on_start: config.run_on_start,
            permits: Arc::new(Semaphore::new(config.max_concurrent_ingestions.max(1))),
            in_flight: Arc::new(InFlightDevices::default()),
        }
    }

    pub fn in_flight(&self) -> &Arc<InFlightDevices> {
        &self.in_flight
    }

    /// Lists pollable devices and dispatches one ingestion task per device.
    pub async fn run_cycle(&self) -> Result<CycleSummary, TrackingError> {
        let devices = self.registry.list_pollable().await?;
        gauge!("poll_cycle_devices").set(devices.len() as f64);

        let mut summary = CycleSummary {
            listed: devices.len(),
            skipped: 0,
            handles: Vec::with_capacity(devices.len()),
        };

        for device in devices {
            let Some(guard) = self.in_flight.try_claim(device.id) else {
                debug!(device_id = %device.id, "Previous ingestion still running, skipping device");
                counter!("poll_cycle_devices_skipped_total", "reason" => "in_flight").increment(1);
                summary.skipped += 1;
                continue;
            };

            let permits = Arc::clone(&self.permits);
            let ingestor = Arc::clone(&self.ingestor);

            summary.handles.push(tokio::spawn(async move {
                let _guard = guard;
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };

                match ingestor.ingest(&device).await {
                    Ok(report) => {
                        debug!(
                            device_id = %report.device_id,
                            logins = report.logins,
                            fetches = report.fetches,
                            pruned = ?report.pruned,
                            "Location fix stored"
                        );
                    }
                    Err(failure) => {
                        warn!(
                            device_id = %failure.device_id,
                            stage = %failure.stage,
                            error = %failure.source,
                            "Location ingestion failed"
                        );
                    }
                }
            }));
        }

        Ok(summary)
    }
}

#[async_trait::async_trait]
impl Job for PollDevicesJob {
    fn name(&self) -> &'static str {
        "poll_devices"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Seconds(self.default_interval.as_secs())
    }

    async fn next_interval(&self) -> Duration {
        match self.settings.poll_interval().await {
            Ok(interval) if !interval.is_zero() => interval,
            Ok(_) => {
                warn!("Configured poll interval is zero, using default");
                self.default_interval
            }
            Err(e) => {
                warn!(error = %e, default_secs = self.default_interval.as_secs(), "Could not read poll interval, using default");
                self.default_interval
            }
        }
    }

    fn run_on_start(&self) -> bool {
        self.run_on_start
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = self
            .run_cycle()
            .await
            .map_err(|e| format!("Failed to list pollable devices: {}", e))?;

        info!(
            listed = summary.listed,
            dispatched = summary.handles.len(),
            skipped = summary.skipped,
            "Poll cycle dispatched"
        );
        Ok(())
    }
}
