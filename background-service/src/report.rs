use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Lifecycle of one job run. A run walks Pending -> Authenticating ->
/// Extracting -> Writing -> Completed, or ends in Failed from whichever
/// phase it was in. No partial state is resumed; the next tick starts a
/// fresh run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Pending,
    Authenticating,
    Extracting,
    Writing,
    Completed,
    Failed,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Pending => "pending",
            JobPhase::Authenticating => "authenticating",
            JobPhase::Extracting => "extracting",
            JobPhase::Writing => "writing",
            JobPhase::Completed => "completed",
            JobPhase::Failed => "failed",
        }
    }
}

/// Per-run bookkeeping handed to a job body. Created fresh for every
/// trigger, so nothing carries over between runs.
#[derive(Debug)]
pub struct RunContext {
    pub job: String,
    pub run_id: Uuid,
    phase: JobPhase,
}

impl RunContext {
    pub fn new(job: &str) -> Self {
        Self {
            job: job.to_string(),
            run_id: Uuid::new_v4(),
            phase: JobPhase::Pending,
        }
    }

    pub fn advance(&mut self, phase: JobPhase) {
        debug!(
            "Job {} run {} entering phase {}",
            self.job,
            self.run_id,
            phase.as_str()
        );
        self.phase = phase;
    }

    pub fn phase(&self) -> JobPhase {
        self.phase
    }
}

/// What a job body reports back on success.
#[derive(Debug, Clone, Default)]
pub struct JobStats {
    pub written: u64,
    pub dropped: u64,
}

/// End-of-run summary surfaced to operators through the logs.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub job: String,
    pub run_id: Uuid,
    pub phase: JobPhase,
    pub records_written: u64,
    pub records_dropped: u64,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub error: Option<String>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.phase == JobPhase::Completed
    }
}
