// libs/call-session-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    CreateLinkSessionRequest, CreateSessionRequest, EndSessionRequest, EndSessionResponse,
    IssueTokenRequest, JoinCommand, JoinSessionRequest, ListSessionsQuery, NewCallSession,
    NewLinkSession, StatsQuery, StatsWindow,
};
use crate::state::CallSessionState;

// ==============================================================================
// CREDENTIAL HANDLERS
// ==============================================================================

/// Issue a relay token for an arbitrary channel
#[axum::debug_handler]
pub async fn issue_relay_token(
    State(state): State<Arc<CallSessionState>>,
    Json(request): Json<IssueTokenRequest>,
) -> Result<Json<Value>, AppError> {
    let credential = state.lifecycle.issue_token(request)?;

    Ok(Json(json!({
        "token": credential.token,
        "uid": credential.uid,
        "channel": credential.channel,
        "role": credential.role,
        "expire_at": credential.expire_at
    })))
}

// ==============================================================================
// CALL SESSION HANDLERS
// ==============================================================================

/// Create a call session. Without a system patient id but with an external
/// one, this creates a shareable link session instead.
#[axum::debug_handler]
pub async fn create_call_session(
    State(state): State<Arc<CallSessionState>>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let has_patient = request
        .patient_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());

    let has_external_patient = request
        .patient_external_id
        .as_deref()
        .is_some_and(|id| !id.trim().is_empty());

    if !has_patient && has_external_patient {
        let command = NewLinkSession::try_from(CreateLinkSessionRequest {
            patient_external_id: request.patient_external_id,
            doctor_id: request.doctor_id,
            call_kind: request.call_kind,
        })?;
        let response = state.lifecycle.create_link_session(command)?;

        return Ok(Json(json!({
            "success": true,
            "session": response.session,
            "call_link": response.call_link
        })));
    }

    let command = NewCallSession::try_from(request)?;
    let session = state.lifecycle.create_session(command)?;

    Ok(Json(json!({
        "success": true,
        "session": session
    })))
}

/// Create a session reachable through a shareable link
#[axum::debug_handler]
pub async fn create_link_session(
    State(state): State<Arc<CallSessionState>>,
    Json(request): Json<CreateLinkSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let command = NewLinkSession::try_from(request)?;
    let response = state.lifecycle.create_link_session(command)?;

    Ok(Json(json!({
        "success": true,
        "session": response.session,
        "call_link": response.call_link
    })))
}

#[axum::debug_handler]
pub async fn get_call_session(
    State(state): State<Arc<CallSessionState>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = state.lifecycle.get(session_id)?;
    Ok(Json(json!({ "session": session })))
}

#[axum::debug_handler]
pub async fn get_session_by_channel(
    State(state): State<Arc<CallSessionState>>,
    Path(channel_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let session = state.lifecycle.get_by_channel(&channel_id)?;
    Ok(Json(json!({ "session": session })))
}

/// Join a call session and receive a relay credential
#[axum::debug_handler]
pub async fn join_call_session(
    State(state): State<Arc<CallSessionState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<JoinSessionRequest>,
) -> Result<Json<Value>, AppError> {
    let command = JoinCommand::try_from(request)?;
    let response = state
        .lifecycle
        .join(session_id, &command.user_id, command.role)?;

    Ok(Json(json!({
        "success": true,
        "session": response.session,
        "token": response.credential.token,
        "uid": response.credential.uid,
        "expire_at": response.credential.expire_at
    })))
}

/// End a call session. Safe to call from every participant's device.
#[axum::debug_handler]
pub async fn end_call_session(
    State(state): State<Arc<CallSessionState>>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<EndSessionRequest>,
) -> Result<Json<EndSessionResponse>, AppError> {
    let requested_by = request.requested_by()?;
    let session = state.lifecycle.end(session_id, &requested_by)?;
    Ok(Json(EndSessionResponse::from(&session)))
}

// ==============================================================================
// USER VIEWS
// ==============================================================================

#[axum::debug_handler]
pub async fn list_user_sessions(
    State(state): State<Arc<CallSessionState>>,
    Path(user_id): Path<String>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Value>, AppError> {
    let page = state.lifecycle.list_for_user(&user_id, &query)?;
    Ok(Json(json!(page)))
}

#[axum::debug_handler]
pub async fn get_user_call_stats(
    State(state): State<Arc<CallSessionState>>,
    Path(user_id): Path<String>,
    Query(query): Query<StatsQuery>,
) -> Result<Json<Value>, AppError> {
    let window = match query.period.as_deref() {
        Some(raw) => raw.parse::<StatsWindow>()?,
        None => StatsWindow::default(),
    };
    let stats = state.stats.compute(&user_id, window)?;

    Ok(Json(json!({
        "user_id": user_id,
        "period_days": window.days(),
        "stats": stats
    })))
}

// ==============================================================================
// SYSTEM HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn call_health_check(
    State(state): State<Arc<CallSessionState>>,
) -> Result<Json<Value>, AppError> {
    let relay_configured = state.issuer.is_configured();
    let tracked_sessions = state.registry.len()?;

    Ok(Json(json!({
        "status": if relay_configured { "healthy" } else { "not_configured" },
        "relay_configured": relay_configured,
        "call_links_configured": state.config.is_call_links_configured(),
        "tracked_sessions": tracked_sessions
    })))
}
