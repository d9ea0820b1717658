// libs/call-session-cell/src/models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::CallSessionError;

// ==============================================================================
// CALL SESSION DOMAIN MODELS
// ==============================================================================

/// One doctor/patient consultation call and its participants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSession {
    pub id: Uuid,
    pub channel_id: String,
    pub doctor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub patient_external_id: Option<String>,
    pub call_kind: CallKind,
    pub scheduled_at: DateTime<Utc>,
    pub status: CallStatus,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Fixed when the session ends; absent before that.
    pub duration_seconds: Option<i64>,
}

impl CallSession {
    pub fn participant(&self, identity: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.identity == identity)
    }

    pub fn participant_mut(&mut self, identity: &str) -> Option<&mut Participant> {
        self.participants.iter_mut().find(|p| p.identity == identity)
    }

    pub fn has_participant(&self, identity: &str) -> bool {
        self.participant(identity).is_some()
    }

    pub fn is_ended(&self) -> bool {
        self.status == CallStatus::Ended
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CallStatus {
    #[serde(rename = "created")]
    Created,
    #[serde(rename = "active")]
    Active,
    #[serde(rename = "ended")]
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Created => "created",
            CallStatus::Active => "active",
            CallStatus::Ended => "ended",
        }
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallStatus {
    type Err = CallSessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "created" => Ok(CallStatus::Created),
            "active" => Ok(CallStatus::Active),
            "ended" => Ok(CallStatus::Ended),
            other => Err(CallSessionError::invalid(format!(
                "Unknown status filter '{}', expected created, active or ended",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum CallKind {
    #[default]
    #[serde(rename = "video")]
    Video,
    #[serde(rename = "audio")]
    Audio,
}

impl FromStr for CallKind {
    type Err = CallSessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "video" => Ok(CallKind::Video),
            "audio" => Ok(CallKind::Audio),
            other => Err(CallSessionError::invalid(format!(
                "Unsupported call kind '{}', expected video or audio",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Participant {
    pub identity: String,
    pub role: ParticipantRole,
    pub joined: bool,
    pub joined_at: Option<DateTime<Utc>>,
}

impl Participant {
    pub fn pending(identity: impl Into<String>, role: ParticipantRole) -> Self {
        Self {
            identity: identity.into(),
            role,
            joined: false,
            joined_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ParticipantRole {
    #[serde(rename = "doctor")]
    Doctor,
    #[serde(rename = "patient")]
    Patient,
    // Nurses, interpreters, guardians and anyone else the caller names.
    #[serde(rename = "other", other)]
    Other,
}

/// Permission carried by a relay credential.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TokenRole {
    #[default]
    #[serde(rename = "publisher")]
    Publisher,
    #[serde(rename = "subscriber")]
    Subscriber,
}

impl FromStr for TokenRole {
    type Err = CallSessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "publisher" => Ok(TokenRole::Publisher),
            "subscriber" => Ok(TokenRole::Subscriber),
            other => Err(CallSessionError::invalid(format!(
                "Unknown token role '{}', expected publisher or subscriber",
                other
            ))),
        }
    }
}

// ==============================================================================
// RELAY CREDENTIALS
// ==============================================================================

/// Claims carried by a relay token. The relay checks these against the
/// shared application certificate without calling back into this service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelayTokenClaims {
    pub iss: String,
    pub channel: String,
    pub uid: String,
    pub role: TokenRole,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct IssuedCredential {
    pub token: String,
    pub uid: String,
    pub channel: String,
    pub role: TokenRole,
    /// Absolute expiry as a unix timestamp.
    pub expire_at: i64,
}

// ==============================================================================
// VALIDATED COMMANDS
// ==============================================================================

/// A create request that passed boundary validation.
#[derive(Debug, Clone)]
pub struct NewCallSession {
    pub doctor_id: String,
    pub patient_id: String,
    pub patient_external_id: Option<String>,
    pub call_kind: CallKind,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub extra_participants: Vec<(String, ParticipantRole)>,
}

#[derive(Debug, Clone)]
pub struct NewLinkSession {
    pub patient_external_id: String,
    pub doctor_id: String,
    pub call_kind: CallKind,
}

// ==============================================================================
// REQUEST / RESPONSE DTOs
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateSessionRequest {
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub patient_external_id: Option<String>,
    pub call_kind: Option<String>,
    pub scheduled_time: Option<DateTime<Utc>>,
    pub participants: Option<Vec<ParticipantInput>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantInput {
    pub user_id: String,
    pub role: Option<ParticipantRole>,
}

impl TryFrom<CreateSessionRequest> for NewCallSession {
    type Error = CallSessionError;

    fn try_from(request: CreateSessionRequest) -> Result<Self, Self::Error> {
        let doctor_id = required("doctor_id", request.doctor_id)?;
        let patient_id = required("patient_id", request.patient_id)?;
        let call_kind = parse_call_kind(request.call_kind.as_deref())?;

        let extra_participants = request
            .participants
            .unwrap_or_default()
            .into_iter()
            .map(|p| {
                let identity = required("participants[].user_id", Some(p.user_id))?;
                Ok((identity, p.role.unwrap_or(ParticipantRole::Other)))
            })
            .collect::<Result<Vec<_>, CallSessionError>>()?;

        Ok(NewCallSession {
            doctor_id,
            patient_id,
            patient_external_id: non_empty(request.patient_external_id),
            call_kind,
            scheduled_at: request.scheduled_time,
            extra_participants,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CreateLinkSessionRequest {
    pub patient_external_id: Option<String>,
    pub doctor_id: Option<String>,
    pub call_kind: Option<String>,
}

impl TryFrom<CreateLinkSessionRequest> for NewLinkSession {
    type Error = CallSessionError;

    fn try_from(request: CreateLinkSessionRequest) -> Result<Self, Self::Error> {
        Ok(NewLinkSession {
            patient_external_id: required("patient_external_id", request.patient_external_id)?,
            doctor_id: required("doctor_id", request.doctor_id)?,
            call_kind: parse_call_kind(request.call_kind.as_deref())?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkSessionResponse {
    pub session: CallSession,
    pub call_link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JoinSessionRequest {
    pub user_id: Option<String>,
    pub user_role: Option<ParticipantRole>,
}

/// Validated join: who is joining and in which role.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCommand {
    pub user_id: String,
    pub role: ParticipantRole,
}

impl TryFrom<JoinSessionRequest> for JoinCommand {
    type Error = CallSessionError;

    fn try_from(request: JoinSessionRequest) -> Result<Self, Self::Error> {
        Ok(JoinCommand {
            user_id: required("user_id", request.user_id)?,
            role: request
                .user_role
                .ok_or_else(|| CallSessionError::invalid("user_role is required"))?,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinSessionResponse {
    pub session: CallSession,
    pub credential: IssuedCredential,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EndSessionRequest {
    pub user_id: Option<String>,
}

impl EndSessionRequest {
    pub fn requested_by(self) -> Result<String, CallSessionError> {
        required("user_id", self.user_id)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EndSessionResponse {
    pub status: CallStatus,
    pub duration: i64,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<&CallSession> for EndSessionResponse {
    fn from(session: &CallSession) -> Self {
        Self {
            status: session.status,
            duration: session.duration_seconds.unwrap_or(0),
            ended_at: session.ended_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IssueTokenRequest {
    pub channel_name: Option<String>,
    pub uid: Option<String>,
    pub role: Option<String>,
    pub expire_seconds: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ListSessionsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionPage {
    pub items: Vec<CallSession>,
    /// Number of matching sessions before pagination.
    pub total: usize,
    pub limit: usize,
    pub offset: usize,
}

// ==============================================================================
// STATISTICS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StatsWindow {
    #[serde(rename = "7d")]
    Week,
    #[default]
    #[serde(rename = "30d")]
    Month,
    #[serde(rename = "90d")]
    Quarter,
}

impl StatsWindow {
    pub fn days(&self) -> i64 {
        match self {
            StatsWindow::Week => 7,
            StatsWindow::Month => 30,
            StatsWindow::Quarter => 90,
        }
    }
}

impl FromStr for StatsWindow {
    type Err = CallSessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().trim_end_matches('d') {
            "7" => Ok(StatsWindow::Week),
            "30" => Ok(StatsWindow::Month),
            "90" => Ok(StatsWindow::Quarter),
            _ => Err(CallSessionError::invalid(format!(
                "Unsupported stats period '{}', expected 7d, 30d or 90d",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsQuery {
    pub period: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Default)]
pub struct CallStats {
    pub total_calls: u64,
    pub active_calls: u64,
    pub completed_calls: u64,
    pub total_duration_seconds: i64,
    pub average_duration_seconds: i64,
    pub video_calls: u64,
    pub audio_calls: u64,
}

// ==============================================================================
// VALIDATION HELPERS
// ==============================================================================

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(field: &str, value: Option<String>) -> Result<String, CallSessionError> {
    non_empty(value).ok_or_else(|| CallSessionError::invalid(format!("{} is required", field)))
}

fn parse_call_kind(raw: Option<&str>) -> Result<CallKind, CallSessionError> {
    raw.map(str::parse::<CallKind>).transpose().map(Option::unwrap_or_default)
}
