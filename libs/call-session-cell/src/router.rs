// libs/call-session-cell/src/router.rs
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::*;
use crate::state::CallSessionState;

/// Creates the call session routes
pub fn call_session_routes(state: Arc<CallSessionState>) -> Router {
    Router::new()
        .route("/health", get(call_health_check))
        // Relay credentials
        .route("/token", post(issue_relay_token))
        // Session lifecycle
        .route("/sessions", post(create_call_session))
        .route("/sessions/link", post(create_link_session))
        .route("/sessions/{session_id}", get(get_call_session))
        .route("/sessions/{session_id}/join", post(join_call_session))
        .route("/sessions/{session_id}/end", post(end_call_session))
        .route("/channels/{channel_id}", get(get_session_by_channel))
        // Per-user views
        .route("/users/{user_id}/sessions", get(list_user_sessions))
        .route("/users/{user_id}/stats", get(get_user_call_stats))
        .with_state(state)
}
