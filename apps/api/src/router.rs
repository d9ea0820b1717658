use std::sync::Arc;

use axum::{
    Router,
    routing::get,
};

use call_session_cell::{call_session_routes, CallSessionState};

pub fn create_router(state: Arc<CallSessionState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Telecare call session API is running!" }))
        .nest("/calls", call_session_routes(state))
}
