//! Background maintenance: retention eviction and stall reporting.

use super::MediaDownloader;

impl MediaDownloader {
    /// Start the periodic maintenance task
    ///
    /// Every `jobs.eviction_interval` the task evicts terminal jobs older
    /// than `jobs.retention` (deleting their directories and notification
    /// topics), prunes handles of exited job tasks and logs stalled jobs.
    /// The task ends once shutdown has begun.
    pub fn spawn_maintenance(&self) -> tokio::task::JoinHandle<()> {
        let downloader = self.clone();
        let period = self.config.jobs.eviction_interval;

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                if !downloader.is_accepting() {
                    tracing::debug!("Maintenance task stopping for shutdown");
                    break;
                }
                downloader.run_maintenance().await;
            }
        });

        tracing::info!(
            interval_secs = period.as_secs(),
            retention_secs = self.config.jobs.retention.as_secs(),
            "Maintenance task started"
        );

        handle
    }

    /// Run one maintenance pass; returns the number of evicted jobs
    pub async fn run_maintenance(&self) -> usize {
        let evicted = self.registry.evict(self.config.jobs.retention);
        for job in &evicted {
            self.hub.remove(job.id);
            self.active.remove(&job.id);

            let dir = self.runner.job_dir(job.id);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(job_id = %job.id, error = %e, "failed to remove evicted job directory");
                }
            }
        }
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicted expired jobs");
        }

        self.active.retain(|_, handle| !handle.is_finished());

        for id in self.registry.stalled(self.config.jobs.stall_timeout) {
            tracing::warn!(
                job_id = %id,
                stall_timeout_secs = self.config.jobs.stall_timeout.as_secs(),
                "job produced no output within the stall timeout; consider cancelling it"
            );
        }

        evicted.len()
    }
}
