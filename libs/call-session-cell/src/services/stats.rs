// libs/call-session-cell/src/services/stats.rs
use chrono::Duration;
use std::sync::Arc;
use tracing::debug;

use crate::error::CallSessionError;
use crate::models::{CallKind, CallStats, CallStatus, StatsWindow};
use crate::services::clock::Clock;
use crate::services::registry::SessionRegistry;

/// Read-only usage projection over the registry.
pub struct StatsAggregator {
    registry: Arc<SessionRegistry>,
    clock: Arc<dyn Clock>,
}

impl StatsAggregator {
    pub fn new(registry: Arc<SessionRegistry>, clock: Arc<dyn Clock>) -> Self {
        Self { registry, clock }
    }

    /// Usage for `user_id` over sessions created inside `window`.
    ///
    /// Only calls that actually started (active or ended) are counted, so
    /// `total_calls == active_calls + completed_calls` always holds.
    pub fn compute(&self, user_id: &str, window: StatsWindow) -> Result<CallStats, CallSessionError> {
        let now = self.clock.now();
        let since = now - Duration::days(window.days());

        let sessions = self.registry.list(|session| {
            session.status != CallStatus::Created
                && session.created_at >= since
                && session.created_at <= now
                && session.has_participant(user_id)
        })?;

        let mut stats = CallStats::default();
        for session in sessions {
            stats.total_calls += 1;
            match session.status {
                CallStatus::Active => stats.active_calls += 1,
                CallStatus::Ended => {
                    stats.completed_calls += 1;
                    stats.total_duration_seconds += session.duration_seconds.unwrap_or(0);
                }
                CallStatus::Created => {}
            }
            match session.call_kind {
                CallKind::Video => stats.video_calls += 1,
                CallKind::Audio => stats.audio_calls += 1,
            }
        }

        if stats.total_calls > 0 {
            stats.average_duration_seconds =
                stats.total_duration_seconds / stats.total_calls as i64;
        }

        debug!(
            "Computed {}-day call stats for {}: {} calls",
            window.days(),
            user_id,
            stats.total_calls
        );
        Ok(stats)
    }
}
