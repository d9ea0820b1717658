// libs/call-session-cell/src/lib.rs
//! # Call Session Cell
//!
//! Coordinates doctor/patient video and audio consultations. The media itself
//! flows through an external relay; this cell keeps the authoritative record
//! of each call and issues the signed credentials the relay accepts.
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------+
//! |                 Call Session Cell                   |
//! +-----------------------------------------------------+
//! |  handlers.rs     |  HTTP endpoint handlers          |
//! |  router.rs       |  Route definitions               |
//! |  models.rs       |  Data structures & DTOs          |
//! |  state.rs        |  Shared service wiring           |
//! |  services/       |  Business logic layer            |
//! |    registry.rs   |  In-memory session store         |
//! |    credentials.rs|  Relay token issuing             |
//! |    lifecycle.rs  |  Create / join / end             |
//! |    stats.rs      |  Per-user usage statistics       |
//! |    retention.rs  |  Eviction of old ended sessions  |
//! +-----------------------------------------------------+
//! ```
//!
//! ## API Endpoints
//!
//! - `GET /calls/health` - Health check
//! - `POST /calls/token` - Issue a relay token for a channel
//! - `POST /calls/sessions` - Create a session
//! - `POST /calls/sessions/link` - Create a session reachable by link
//! - `GET /calls/sessions/{id}` - Get session details
//! - `POST /calls/sessions/{id}/join` - Join and receive a credential
//! - `POST /calls/sessions/{id}/end` - End the session
//! - `GET /calls/channels/{channel_id}` - Look up a session by channel
//! - `GET /calls/users/{user_id}/sessions` - List a user's sessions
//! - `GET /calls/users/{user_id}/stats` - Usage statistics
//!
//! ## Configuration
//!
//! - `RELAY_APP_ID` - Relay application identifier
//! - `RELAY_APP_CERTIFICATE` - Secret the relay tokens are signed with
//! - `CALL_LINK_BASE_URL` - Base URL for shareable call links
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use call_session_cell::{call_session_routes, CallSessionState};
//! use shared_config::AppConfig;
//! use std::sync::Arc;
//!
//! let config = Arc::new(AppConfig::from_env());
//! let state = Arc::new(CallSessionState::new(config));
//! let call_routes = call_session_routes(state);
//! ```

pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod state;

// Re-export commonly used types
pub use error::{CallSessionError, ErrorKind};
pub use models::{
    CallKind, CallSession, CallStats, CallStatus, IssuedCredential, NewCallSession,
    NewLinkSession, Participant, ParticipantRole, StatsWindow, TokenRole,
};

pub use services::{
    CallLifecycleService, Clock, ManualClock, RelayTokenIssuer, RetentionSweeper,
    SessionRegistry, StatsAggregator, SystemClock,
};

pub use router::call_session_routes;
pub use state::CallSessionState;
