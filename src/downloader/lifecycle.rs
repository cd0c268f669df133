//! Shutdown coordination.

use crate::error::Result;
use crate::types::JobId;
use std::sync::atomic::Ordering;

use super::MediaDownloader;

impl MediaDownloader {
    /// Whether new jobs are accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting_new.load(Ordering::SeqCst)
    }

    /// Gracefully shut down the service
    ///
    /// 1. Stops accepting new jobs
    /// 2. Cancels every live job (queued jobs never spawn; running
    ///    subprocesses are terminated)
    /// 3. Waits up to `jobs.shutdown_timeout` for job tasks to exit
    ///
    /// Calling it again is harmless.
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.runner.close();
        tracing::info!("Stopped accepting new jobs");

        let ids: Vec<JobId> = self.active.iter().map(|entry| *entry.key()).collect();
        for id in &ids {
            if let Err(e) = self.cancel_job(*id) {
                tracing::debug!(job_id = %id, error = %e, "job vanished during shutdown");
            }
        }

        let handles: Vec<_> = ids
            .iter()
            .filter_map(|id| self.active.remove(id).map(|(_, handle)| handle))
            .collect();
        let pending = handles.len();

        let wait = futures::future::join_all(handles.into_iter().map(|handle| handle.join()));
        match tokio::time::timeout(self.config.jobs.shutdown_timeout, wait).await {
            Ok(_) => tracing::info!(jobs = pending, "All job tasks stopped"),
            Err(_) => tracing::warn!(
                jobs = pending,
                "Timeout waiting for job tasks to stop, proceeding with shutdown"
            ),
        }

        tracing::info!("Graceful shutdown complete");
        Ok(())
    }
}
