mod job;
mod runner;

pub mod jobs;

pub use job::{BackgroundJob, JobError};
pub use runner::spawn_jobs;
