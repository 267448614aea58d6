//! Background task running cache maintenance on a timetable
//!
//! The task sweeps expired archives once a day at the configured local time
//! and, when `maintenance.precache_interval` is set, precaches today's studies
//! at that interval. Embedders that drive
//! [`trigger_cleanup`](crate::ExportCoordinator::trigger_cleanup) and
//! [`trigger_precache_today`](crate::ExportCoordinator::trigger_precache_today)
//! from an external scheduler simply never start it.
//!
//! # Example
//!
//! ```no_run
//! use study_export::{Config, ExportCoordinator, StudyQuery};
//! use study_export::maintenance_task::MaintenanceTask;
//! use std::sync::Arc;
//!
//! # async fn example(query: Arc<dyn StudyQuery>) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let maintenance = config.maintenance.clone();
//! let coordinator = ExportCoordinator::with_wado(config, query)?;
//!
//! let task = MaintenanceTask::new(coordinator.clone(), maintenance);
//! let stop = task.shutdown_token();
//! let handle = tokio::spawn(task.run());
//!
//! // later
//! stop.cancel();
//! handle.await?;
//! # Ok(())
//! # }
//! ```

use crate::config::MaintenanceConfig;
use crate::exporter::ExportCoordinator;
use chrono::{Local, NaiveDateTime, NaiveTime};
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// First occurrence of `hour:minute` strictly after `now`
pub fn next_cleanup_after(now: NaiveDateTime, hour: u32, minute: u32) -> NaiveDateTime {
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
    let today = now.date().and_time(time);
    if today > now {
        today
    } else {
        today + chrono::Duration::days(1)
    }
}

/// Periodic cache sweep and precache driver
pub struct MaintenanceTask {
    coordinator: ExportCoordinator,
    config: MaintenanceConfig,
    shutdown: CancellationToken,
}

impl MaintenanceTask {
    /// Create a task acting on `coordinator`
    pub fn new(coordinator: ExportCoordinator, config: MaintenanceConfig) -> Self {
        Self {
            coordinator,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run until the token is cancelled or the coordinator shuts down
    pub async fn run(self) {
        info!(
            cleanup_hour = self.config.cleanup_hour,
            cleanup_minute = self.config.cleanup_minute,
            precache_interval = ?self.config.precache_interval,
            "maintenance task started"
        );

        let mut precache = self.config.precache_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval
        });

        loop {
            if self.coordinator.is_shutting_down() {
                info!("maintenance task shutting down");
                break;
            }

            let now = Local::now().naive_local();
            let next = next_cleanup_after(now, self.config.cleanup_hour, self.config.cleanup_minute);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            debug!(next_cleanup = %next, "waiting for next maintenance event");

            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("maintenance task cancelled");
                    break;
                }
                _ = self.coordinator.shutdown_requested() => {
                    info!("maintenance task shutting down");
                    break;
                }
                _ = sleep(wait) => self.cleanup().await,
                _ = next_tick(&mut precache) => self.precache().await,
            }
        }

        info!("maintenance task stopped");
    }

    async fn cleanup(&self) {
        match self.coordinator.trigger_cleanup().await {
            Ok(deleted) => info!(deleted, "scheduled cache sweep finished"),
            Err(e) => warn!(error = %e, "scheduled cache sweep failed"),
        }
    }

    async fn precache(&self) {
        let report = self.coordinator.trigger_precache_today().await;
        if let Some(error) = &report.error {
            warn!(date = %report.date, error = %error, "scheduled precache did not run");
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
