//! Background job removing dead artist-cache entries.
//!
//! Entries untouched for longer than the cache's dead-after window are no
//! longer serving anyone, not even as stale fallback, and are dropped.

use crate::background_jobs::{BackgroundJob, JobError};
use crate::cache::ArtistCache;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub struct CacheSweepJob {
    cache: Arc<ArtistCache>,
    interval: Duration,
}

impl CacheSweepJob {
    pub fn new(cache: Arc<ArtistCache>, interval: Duration) -> Self {
        Self { cache, interval }
    }
}

impl BackgroundJob for CacheSweepJob {
    fn id(&self) -> &'static str {
        "cache_sweep"
    }

    fn name(&self) -> &'static str {
        "Artist Cache Sweep"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn execute(&self) -> Result<(), JobError> {
        let removed = self.cache.sweep();
        if removed > 0 {
            info!(
                "Cache sweep removed {} dead entries, {} remain",
                removed,
                self.cache.len()
            );
        }
        Ok(())
    }
}
