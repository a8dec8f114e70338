//! Job scheduler infrastructure for background tasks.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Job frequency for scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobFrequency {
    Millis(u64),
    Seconds(u64),
    Minutes(u64),
}

impl JobFrequency {
    /// Get the duration between job executions.
    pub fn duration(&self) -> Duration {
        match self {
            JobFrequency::Millis(ms) => Duration::from_millis(*ms),
            JobFrequency::Seconds(secs) => Duration::from_secs(*secs),
            JobFrequency::Minutes(mins) => Duration::from_secs(*mins * 60),
        }
    }
}

/// Trait for implementing background jobs.
#[async_trait::async_trait]
pub trait Job: Send + Sync {
    /// The name of this job (used for logging).
    fn name(&self) -> &'static str;

    /// Nominal frequency, used when the job has no runtime cadence of its own.
    fn frequency(&self) -> JobFrequency;

    /// Delay before the next run. Asked again before every run, so a job
    /// can change cadence without a restart.
    async fn next_interval(&self) -> Duration {
        self.frequency().duration()
    }

    /// Whether to run once immediately instead of waiting a full interval.
    fn run_on_start(&self) -> bool {
        false
    }

    /// Execute the job. Returns Ok(()) on success, Err with message on failure.
    async fn execute(&self) -> Result<(), String>;
}

/// Background job scheduler.
pub struct JobScheduler {
    jobs: Vec<Arc<dyn Job>>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handles: Vec<JoinHandle<()>>,
}

async fn run_once(job: &dyn Job) {
    let name = job.name();
    let start = Instant::now();

    match job.execute().await {
        Ok(()) => {
            info!(
                job = name,
                elapsed_ms = start.elapsed().as_millis(),
                "Job completed successfully"
            );
        }
        Err(e) => {
            error!(
                job = name,
                elapsed_ms = start.elapsed().as_millis(),
                error = %e,
                "Job failed"
            );
        }
    }
}

impl JobScheduler {
    /// Create a new job scheduler.
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            jobs: Vec::new(),
            shutdown_tx,
            shutdown_rx,
            handles: Vec::new(),
        }
    }

    /// Register a job with the scheduler.
    pub fn register<J: Job + 'static>(&mut self, job: J) {
        self.jobs.push(Arc::new(job));
    }

    /// Start all registered jobs.
    pub fn start(&mut self) {
        info!("Starting job scheduler with {} jobs", self.jobs.len());

        for job in &self.jobs {
            let job = Arc::clone(job);
            let mut shutdown_rx = self.shutdown_rx.clone();

            let handle = tokio::spawn(async move {
                let name = job.name();
                info!(job = name, frequency = ?job.frequency(), "Job scheduled");

                if job.run_on_start() {
                    run_once(job.as_ref()).await;
                }

                loop {
                    let wait = job.next_interval().await;

                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {
                            run_once(job.as_ref()).await;
                        }
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                info!(job = name, "Job shutting down");
                                break;
                            }
                        }
                    }
                }
            });

            self.handles.push(handle);
        }
    }

    /// Initiate graceful shutdown of all jobs.
    /// Returns immediately after signaling shutdown.
    pub fn shutdown(&self) {
        info!("Initiating job scheduler shutdown");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for all jobs to complete with timeout.
    pub async fn wait_for_shutdown(self, timeout: Duration) {
        info!("Waiting for jobs to complete (timeout: {:?})", timeout);

        let shutdown_future = async {
            for handle in self.handles {
                if let Err(e) = handle.await {
                    warn!("Job task panicked: {}", e);
                }
            }
        };

        match tokio::time::timeout(timeout, shutdown_future).await {
            Ok(()) => info!("All jobs completed gracefully"),
            Err(_) => warn!("Job shutdown timed out after {:?}", timeout),
        }
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
