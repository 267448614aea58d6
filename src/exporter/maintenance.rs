//! Cache sweep and precache entry points.

use crate::error::Result;
use crate::precache::{PrecacheReport, PrecacheScheduler};
use crate::types::ExportEvent;

use super::ExportCoordinator;

impl ExportCoordinator {
    /// Delete archives older than the retention window
    ///
    /// Returns the number of archives deleted.
    pub async fn trigger_cleanup(&self) -> Result<usize> {
        let deleted = self.pipeline.janitor.sweep().await?;
        self.emit_event(ExportEvent::CacheSwept { deleted });
        Ok(deleted)
    }

    /// Build every study with the given StudyDate (`YYYYMMDD`)
    pub async fn trigger_precache(&self, date: &str) -> PrecacheReport {
        PrecacheScheduler::new(self.clone()).precache_by_date(date).await
    }

    /// Build every study acquired today
    pub async fn trigger_precache_today(&self) -> PrecacheReport {
        PrecacheScheduler::new(self.clone()).precache_today().await
    }
}
