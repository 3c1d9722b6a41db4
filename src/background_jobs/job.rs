use std::time::Duration;

/// Errors that can occur during job execution.
#[derive(Debug)]
pub enum JobError {
    ExecutionFailed(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

/// Trait for interval-scheduled background jobs.
///
/// Jobs are executed synchronously in a blocking context; long-running work
/// should stay well below the interval.
pub trait BackgroundJob: Send + Sync {
    /// Unique identifier for this job.
    fn id(&self) -> &'static str;

    /// Human-readable name for this job.
    fn name(&self) -> &'static str;

    /// Fixed interval between runs.
    fn interval(&self) -> Duration;

    /// Execute the job. Called via `spawn_blocking`.
    fn execute(&self) -> Result<(), JobError>;
}
