// libs/call-session-cell/src/services/mod.rs

pub mod clock;
pub mod credentials;
pub mod lifecycle;
pub mod registry;
pub mod retention;
pub mod stats;

pub use clock::{Clock, ManualClock, SystemClock};
pub use credentials::RelayTokenIssuer;
pub use lifecycle::CallLifecycleService;
pub use registry::{SessionDraft, SessionRegistry};
pub use retention::RetentionSweeper;
pub use stats::StatsAggregator;
