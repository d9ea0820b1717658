// libs/call-session-cell/src/state.rs
use std::sync::Arc;

use shared_config::AppConfig;

use crate::services::{
    CallLifecycleService, Clock, RelayTokenIssuer, RetentionSweeper, SessionRegistry,
    StatsAggregator, SystemClock,
};

/// Shared state behind the call session routes. One registry per process.
pub struct CallSessionState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<SessionRegistry>,
    pub issuer: Arc<RelayTokenIssuer>,
    pub lifecycle: CallLifecycleService,
    pub stats: StatsAggregator,
    clock: Arc<dyn Clock>,
}

impl CallSessionState {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: Arc<AppConfig>, clock: Arc<dyn Clock>) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let issuer = Arc::new(RelayTokenIssuer::new(&config, clock.clone()));
        let lifecycle =
            CallLifecycleService::new(registry.clone(), issuer.clone(), clock.clone(), &config);
        let stats = StatsAggregator::new(registry.clone(), clock.clone());

        Self {
            config,
            registry,
            issuer,
            lifecycle,
            stats,
            clock,
        }
    }

    pub fn retention_sweeper(&self) -> RetentionSweeper {
        RetentionSweeper::new(self.registry.clone(), self.clock.clone(), &self.config)
    }
}
