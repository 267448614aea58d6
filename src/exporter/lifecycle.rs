//! Waiting for builds and graceful shutdown.

use std::sync::atomic::Ordering;

use super::ExportCoordinator;

impl ExportCoordinator {
    /// Wait until every background build submitted so far has finished
    ///
    /// Builds accepted while waiting are awaited too.
    pub async fn wait_for_builds(&self) {
        self.builds.close();
        self.builds.wait().await;
        if self.accepting_new.load(Ordering::SeqCst) {
            self.builds.reopen();
        }
    }

    /// Stop accepting background builds and wait for running ones
    ///
    /// Waits at most `shutdown_timeout`; builds still running afterwards keep
    /// going but are no longer awaited. Subsequent
    /// [`check_or_trigger`](Self::check_or_trigger) calls for uncached studies
    /// fail with [`Error::ShuttingDown`](crate::Error::ShuttingDown).
    pub async fn shutdown(&self) {
        tracing::info!("initiating graceful shutdown");

        self.accepting_new.store(false, Ordering::SeqCst);
        self.shutdown_signal.cancel();
        self.builds.close();

        let running = self.builds.len();
        tracing::info!(running, "stopped accepting new builds");

        match tokio::time::timeout(self.config.shutdown_timeout, self.builds.wait()).await {
            Ok(()) => tracing::info!("all builds completed"),
            Err(_) => tracing::warn!(
                still_running = self.builds.len(),
                "timeout waiting for builds to complete, proceeding with shutdown"
            ),
        }

        tracing::info!("graceful shutdown complete");
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    pub fn is_shutting_down(&self) -> bool {
        !self.accepting_new.load(Ordering::SeqCst)
    }

    /// Resolves once [`shutdown`](Self::shutdown) has been called
    pub async fn shutdown_requested(&self) {
        self.shutdown_signal.cancelled().await;
    }
}
