// libs/call-session-cell/src/services/retention.rs
use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::error::CallSessionError;
use crate::services::clock::Clock;
use crate::services::registry::SessionRegistry;

/// Periodically evicts ended sessions older than the retention period.
pub struct RetentionSweeper {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: std::time::Duration,
}

impl RetentionSweeper {
    pub fn new(registry: Arc<SessionRegistry>, clock: Arc<dyn Clock>, config: &AppConfig) -> Self {
        Self {
            registry,
            clock,
            retention: Duration::hours(config.session_retention_hours.max(0)),
            interval: std::time::Duration::from_secs(config.retention_sweep_interval_seconds.max(1)),
        }
    }

    pub fn sweep_once(&self) -> Result<usize, CallSessionError> {
        let cutoff = self.clock.now() - self.retention;
        self.registry.evict_ended_before(cutoff)
    }

    /// Run the sweep loop on the tokio runtime until the handle is aborted.
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        info!(
            "Starting call session retention sweeper (retention {}h, every {:?})",
            self.retention.num_hours(),
            self.interval
        );

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                match self.sweep_once() {
                    Ok(0) => debug!("Retention sweep found nothing to evict"),
                    Ok(evicted) => debug!("Retention sweep evicted {} sessions", evicted),
                    Err(e) => error!("Retention sweep failed: {}", e),
                }
            }
        })
    }
}
