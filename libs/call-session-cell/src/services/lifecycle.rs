// libs/call-session-cell/src/services/lifecycle.rs
use chrono::{DateTime, SubsecRound, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::CallSessionError;
use crate::models::{
    CallSession, CallStatus, IssueTokenRequest, IssuedCredential, JoinSessionResponse,
    LinkSessionResponse, ListSessionsQuery, NewCallSession, NewLinkSession, Participant,
    ParticipantRole, SessionPage, TokenRole,
};
use crate::services::clock::Clock;
use crate::services::credentials::{sanitize_identity, RelayTokenIssuer};
use crate::services::registry::{hex_encode, random_bytes, SessionDraft, SessionRegistry};

pub const DEFAULT_PAGE_LIMIT: usize = 20;
pub const MAX_PAGE_LIMIT: usize = 100;

/// What a join did to the session it was applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The session had already ended; nothing changed.
    Rejected,
    Joined {
        /// This join moved the session from created to active.
        activated: bool,
        /// The identity was not pre-listed and was added.
        admitted: bool,
    },
}

/// Drives sessions through created -> active -> ended and hands out relay
/// credentials on join.
pub struct CallLifecycleService {
    registry: Arc<SessionRegistry>,
    issuer: Arc<RelayTokenIssuer>,
    clock: Arc<dyn Clock>,
    call_link_base_url: String,
}

impl CallLifecycleService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        issuer: Arc<RelayTokenIssuer>,
        clock: Arc<dyn Clock>,
        config: &AppConfig,
    ) -> Self {
        Self {
            registry,
            issuer,
            clock,
            call_link_base_url: config.call_link_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create a scheduled consultation with doctor and patient pre-registered.
    pub fn create_session(&self, command: NewCallSession) -> Result<CallSession, CallSessionError> {
        if command.doctor_id == command.patient_id {
            return Err(CallSessionError::invalid(
                "doctor_id and patient_id must identify different people",
            ));
        }

        let now = self.now();
        let mut participants = vec![
            Participant::pending(command.doctor_id.clone(), ParticipantRole::Doctor),
            Participant::pending(command.patient_id.clone(), ParticipantRole::Patient),
        ];
        for (identity, role) in command.extra_participants {
            if participants.iter().any(|p| p.identity == identity) {
                debug!("Ignoring duplicate participant {}", identity);
                continue;
            }
            participants.push(Participant::pending(identity, role));
        }

        let session = self.registry.create(SessionDraft {
            doctor_id: command.doctor_id,
            patient_id: Some(command.patient_id),
            patient_external_id: command.patient_external_id,
            call_kind: command.call_kind,
            scheduled_at: command.scheduled_at.unwrap_or(now),
            participants,
            created_at: now,
        })?;

        info!(
            "Created {:?} call session {} for doctor {} with {} participants",
            session.call_kind,
            session.id,
            session.doctor_id,
            session.participants.len()
        );
        Ok(session)
    }

    /// Create an ad hoc session for a patient known only by an external id.
    /// The patient joins anonymously through the returned link.
    pub fn create_link_session(
        &self,
        command: NewLinkSession,
    ) -> Result<LinkSessionResponse, CallSessionError> {
        if self.call_link_base_url.is_empty() {
            error!("Call link requested but CALL_LINK_BASE_URL is not configured");
            return Err(CallSessionError::NotConfigured {
                missing: "CALL_LINK_BASE_URL",
            });
        }

        let now = self.now();
        let external_id = command.patient_external_id;

        let session = self.registry.create_with_channel(
            SessionDraft {
                doctor_id: command.doctor_id.clone(),
                patient_id: None,
                patient_external_id: Some(external_id.clone()),
                call_kind: command.call_kind,
                scheduled_at: now,
                participants: vec![Participant::pending(command.doctor_id, ParticipantRole::Doctor)],
                created_at: now,
            },
            || link_channel_id(&external_id, now),
        )?;

        let call_link = self.call_link(&session.channel_id);
        info!(
            "Created link call session {} for external patient {}",
            session.id, external_id
        );

        Ok(LinkSessionResponse { session, call_link })
    }

    /// Mark `identity` as joined and issue a publisher credential for the
    /// session's channel. The first join activates the session.
    pub fn join(
        &self,
        session_id: Uuid,
        identity: &str,
        role: ParticipantRole,
    ) -> Result<JoinSessionResponse, CallSessionError> {
        let identity = sanitize_identity(identity)
            .ok_or_else(|| CallSessionError::invalid("user_id is required"))?;
        let identity = identity.as_str();

        // An unconfigured relay must leave the session untouched.
        self.issuer.ensure_configured()?;

        let now = self.now();
        let mut outcome = JoinOutcome::Rejected;
        let session = self.registry.mutate(session_id, |session| {
            outcome = apply_join(session, identity, role, now);
        })?;

        match outcome {
            JoinOutcome::Rejected => {
                warn!("User {} tried to join ended call session {}", identity, session_id);
                return Err(CallSessionError::invalid(format!(
                    "Call session {} has already ended",
                    session_id
                )));
            }
            JoinOutcome::Joined { activated, admitted } => {
                if admitted {
                    info!("Admitted unlisted participant {} to session {}", identity, session_id);
                }
                if activated {
                    info!("Call session {} is now active", session_id);
                }
            }
        }

        let credential =
            self.issuer
                .issue(&session.channel_id, Some(identity), TokenRole::Publisher, None)?;

        info!("User {} joined call session {}", identity, session_id);
        Ok(JoinSessionResponse { session, credential })
    }

    /// End the session. Repeated calls return the already-ended record.
    pub fn end(&self, session_id: Uuid, requested_by: &str) -> Result<CallSession, CallSessionError> {
        let requested_by = sanitize_identity(requested_by)
            .ok_or_else(|| CallSessionError::invalid("user_id is required"))?;
        let requested_by = requested_by.as_str();

        let now = self.now();
        let mut ended_now = false;
        let session = self.registry.mutate(session_id, |session| {
            ended_now = apply_end(session, now);
        })?;

        if !session.has_participant(requested_by) {
            warn!(
                "Call session {} end requested by non-participant {}",
                session_id, requested_by
            );
        }

        if ended_now {
            info!(
                "Call session {} ended by {} after {}s",
                session_id,
                requested_by,
                session.duration_seconds.unwrap_or(0)
            );
        } else {
            debug!("Call session {} already ended, returning existing record", session_id);
        }

        Ok(session)
    }

    pub fn get(&self, session_id: Uuid) -> Result<CallSession, CallSessionError> {
        self.registry.get(session_id)
    }

    pub fn get_by_channel(&self, channel_id: &str) -> Result<CallSession, CallSessionError> {
        self.registry.get_by_channel(channel_id.trim())
    }

    /// Sessions `user_id` participates in, newest first.
    pub fn list_for_user(
        &self,
        user_id: &str,
        query: &ListSessionsQuery,
    ) -> Result<SessionPage, CallSessionError> {
        let status_filter = query
            .status
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .map(str::parse::<CallStatus>)
            .transpose()?;
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let offset = query.offset.unwrap_or(0);

        let mut matching: Vec<CallSession> = self
            .registry
            .list(|session| {
                session.has_participant(user_id)
                    && status_filter.map_or(true, |status| session.status == status)
            })?
            .collect();

        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        let total = matching.len();
        let items = matching.into_iter().skip(offset).take(limit).collect();

        Ok(SessionPage {
            items,
            total,
            limit,
            offset,
        })
    }

    /// Issue a relay credential outside of a join, e.g. for a viewer.
    pub fn issue_token(&self, request: IssueTokenRequest) -> Result<IssuedCredential, CallSessionError> {
        let channel = request
            .channel_name
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CallSessionError::invalid("channel_name is required"))?;

        let role = match request.role.as_deref() {
            Some(raw) if !raw.trim().is_empty() => raw.parse::<TokenRole>()?,
            _ => TokenRole::Publisher,
        };

        self.issuer
            .issue(channel, request.uid.as_deref(), role, request.expire_seconds)
    }

    pub fn call_link(&self, channel_id: &str) -> String {
        format!("{}/call/{}", self.call_link_base_url, channel_id)
    }

    fn now(&self) -> DateTime<Utc> {
        // Whole seconds, so durations are exact differences of timestamps.
        self.clock.now().trunc_subsecs(0)
    }
}

/// Record a join on `session`. Activation happens only from `created`.
pub fn apply_join(
    session: &mut CallSession,
    identity: &str,
    role: ParticipantRole,
    now: DateTime<Utc>,
) -> JoinOutcome {
    if session.is_ended() {
        return JoinOutcome::Rejected;
    }

    let admitted = match session.participant_mut(identity) {
        Some(participant) => {
            participant.joined = true;
            participant.joined_at = Some(now);
            false
        }
        None => {
            session.participants.push(Participant {
                identity: identity.to_string(),
                role,
                joined: true,
                joined_at: Some(now),
            });
            true
        }
    };

    let activated = session.status == CallStatus::Created;
    if activated {
        session.status = CallStatus::Active;
        session.started_at = Some(now);
    }

    JoinOutcome::Joined { activated, admitted }
}

/// Move `session` to ended and fix its duration. Returns false if it had
/// already ended, in which case nothing changes.
pub fn apply_end(session: &mut CallSession, now: DateTime<Utc>) -> bool {
    if session.is_ended() {
        return false;
    }

    session.status = CallStatus::Ended;
    session.ended_at = Some(now);
    session.duration_seconds = Some(
        session
            .started_at
            .map(|started| (now - started).num_seconds().max(0))
            .unwrap_or(0),
    );
    true
}

/// Channel id for a link session: a digest of the external id, the creation
/// time and a random salt, so repeated links for one patient never collide.
fn link_channel_id(external_id: &str, created_at: DateTime<Utc>) -> Result<String, CallSessionError> {
    let salt = random_bytes::<8>()?;
    let mut hasher = Sha256::new();
    hasher.update(external_id.as_bytes());
    hasher.update(b":");
    hasher.update(created_at.timestamp_millis().to_be_bytes());
    hasher.update(b":");
    hasher.update(salt);
    let digest = hasher.finalize();
    Ok(hex_encode(&digest[..16]))
}
