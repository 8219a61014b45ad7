use crate::report::{JobPhase, JobStats, RunContext, RunReport};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{interval, timeout, Instant, MissedTickBehavior};
use tracing::{error, info, warn};
use undertow_core::{CoreError, ErrorExt};

/// One unit of scheduled work. Implementations advance the run context
/// through the job phases and return their write/drop counts.
#[async_trait]
pub trait Job: Send + Sync {
    async fn run(&self, ctx: &mut RunContext) -> Result<JobStats, CoreError>;
}

/// A registered job plus its scheduling state.
pub struct ScheduledJob {
    name: String,
    interval: Duration,
    run_timeout: Duration,
    in_flight: Mutex<()>,
    skipped: AtomicU64,
    runner: Arc<dyn Job>,
}

impl ScheduledJob {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// How many overlapping triggers were skipped so far.
    pub fn skipped_triggers(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

/// Runs named jobs on independent cadences, decoupled from any
/// request/response cycle.
///
/// Only one run of a given job executes at a time: an overlapping trigger is
/// skipped (and counted), never queued. Each run is bounded by a timeout
/// ceiling, and a failed run only produces a failed report; the next tick
/// starts clean.
pub struct JobScheduler {
    jobs: Vec<Arc<ScheduledJob>>,
}

impl JobScheduler {
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    pub fn register(
        &mut self,
        name: &str,
        cadence: Duration,
        run_timeout: Duration,
        runner: Arc<dyn Job>,
    ) -> Arc<ScheduledJob> {
        let job = Arc::new(ScheduledJob {
            name: name.to_string(),
            interval: cadence,
            run_timeout,
            in_flight: Mutex::new(()),
            skipped: AtomicU64::new(0),
            runner,
        });
        info!(
            "Registered job {} with cadence {:?} and timeout {:?}",
            name, cadence, run_timeout
        );
        self.jobs.push(job.clone());
        job
    }

    /// Drive all registered jobs forever.
    pub async fn run(&self) {
        let mut handles = Vec::with_capacity(self.jobs.len());

        for job in &self.jobs {
            let job = job.clone();
            handles.push(tokio::spawn(async move {
                let mut ticker = interval(job.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    let job = job.clone();
                    // Runs execute off the ticker task so a slow run cannot
                    // stall the cadence; the in-flight guard handles overlap.
                    tokio::spawn(async move {
                        Self::trigger(&job).await;
                    });
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Execute one trigger of a job. Returns `None` when an earlier run of
    /// the same job is still in flight and this trigger was skipped.
    pub async fn trigger(job: &Arc<ScheduledJob>) -> Option<RunReport> {
        let _guard = match job.in_flight.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                job.skipped.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Job {} is already running, skipping overlapping trigger",
                    job.name
                );
                return None;
            }
        };

        let mut ctx = RunContext::new(&job.name);
        let run_id = ctx.run_id;
        let started_at = Utc::now();
        let started = Instant::now();
        info!("Job {} run {} starting", job.name, run_id);

        let outcome = timeout(job.run_timeout, job.runner.run(&mut ctx)).await;

        let report = match outcome {
            Ok(Ok(stats)) => {
                ctx.advance(JobPhase::Completed);
                RunReport {
                    job: job.name.clone(),
                    run_id,
                    phase: JobPhase::Completed,
                    records_written: stats.written,
                    records_dropped: stats.dropped,
                    started_at,
                    duration: started.elapsed(),
                    error: None,
                }
            }
            Ok(Err(e)) => {
                e.log_error();
                let failed_during = ctx.phase();
                ctx.advance(JobPhase::Failed);
                RunReport {
                    job: job.name.clone(),
                    run_id,
                    phase: JobPhase::Failed,
                    records_written: 0,
                    records_dropped: 0,
                    started_at,
                    duration: started.elapsed(),
                    error: Some(format!("{} (during {})", e, failed_during.as_str())),
                }
            }
            Err(_) => {
                ctx.advance(JobPhase::Failed);
                let ceiling = CoreError::Timeout {
                    seconds: job.run_timeout.as_secs(),
                };
                RunReport {
                    job: job.name.clone(),
                    run_id,
                    phase: JobPhase::Failed,
                    records_written: 0,
                    records_dropped: 0,
                    started_at,
                    duration: started.elapsed(),
                    error: Some(ceiling.to_string()),
                }
            }
        };

        if report.succeeded() {
            info!(
                "Job {} run {} completed: {} written, {} dropped in {:?}",
                report.job, report.run_id, report.records_written, report.records_dropped,
                report.duration
            );
        } else {
            error!(
                "Job {} run {} failed: {}",
                report.job,
                report.run_id,
                report.error.as_deref().unwrap_or("unknown")
            );
        }

        Some(report)
    }
}

impl Default for JobScheduler {
    fn default() -> Self {
        Self::new()
    }
}
