use super::job::BackgroundJob;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Spawn one interval loop per job, stopping them when the token fires.
pub fn spawn_jobs(
    jobs: Vec<Arc<dyn BackgroundJob>>,
    cancellation_token: CancellationToken,
) -> Vec<JoinHandle<()>> {
    jobs.into_iter()
        .map(|job| {
            let token = cancellation_token.clone();
            tokio::spawn(async move {
                info!(
                    "Scheduling background job '{}' every {:?}",
                    job.id(),
                    job.interval()
                );
                let mut ticker = tokio::time::interval(job.interval());
                // Skip the immediate first tick, wait for the first interval.
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => {
                            info!("Stopping background job '{}'", job.id());
                            break;
                        }
                        _ = ticker.tick() => {
                            let job = job.clone();
                            let result =
                                tokio::task::spawn_blocking(move || job.execute()).await;
                            match result {
                                Ok(Ok(())) => {}
                                Ok(Err(e)) => error!("Background job failed: {}", e),
                                Err(e) => error!("Background job panicked: {}", e),
                            }
                        }
                    }
                }
            })
        })
        .collect()
}
