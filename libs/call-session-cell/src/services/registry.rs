// libs/call-session-cell/src/services/registry.rs
use chrono::{DateTime, Utc};
use rand::{rngs::OsRng, RngCore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::CallSessionError;
use crate::models::{CallKind, CallSession, CallStatus, Participant};

const MAX_ID_ATTEMPTS: usize = 3;

type SessionEntry = Arc<Mutex<CallSession>>;

/// Everything about a new session except the identifiers the registry assigns.
#[derive(Debug, Clone)]
pub struct SessionDraft {
    pub doctor_id: String,
    pub patient_id: Option<String>,
    pub patient_external_id: Option<String>,
    pub call_kind: CallKind,
    pub scheduled_at: DateTime<Utc>,
    pub participants: Vec<Participant>,
    pub created_at: DateTime<Utc>,
}

impl SessionDraft {
    fn into_session(self, id: Uuid, channel_id: String) -> CallSession {
        CallSession {
            id,
            channel_id,
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            patient_external_id: self.patient_external_id,
            call_kind: self.call_kind,
            scheduled_at: self.scheduled_at,
            status: CallStatus::Created,
            participants: self.participants,
            created_at: self.created_at,
            started_at: None,
            ended_at: None,
            duration_seconds: None,
        }
    }
}

/// In-memory authority for call sessions.
///
/// Each session sits behind its own mutex, so writers to different sessions
/// never wait on each other; the outer maps are only locked long enough to
/// find or insert an entry. Lock order when both maps are held: `sessions`
/// then `channels`.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, SessionEntry>>,
    channels: RwLock<HashMap<String, Uuid>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a draft under a fresh session id and a random channel id.
    pub fn create(&self, draft: SessionDraft) -> Result<CallSession, CallSessionError> {
        self.create_with_channel(draft, random_channel_id)
    }

    /// Register a draft using `make_channel` to produce the channel id.
    /// Collisions on either key are retried with fresh values.
    pub fn create_with_channel<F>(
        &self,
        draft: SessionDraft,
        mut make_channel: F,
    ) -> Result<CallSession, CallSessionError>
    where
        F: FnMut() -> Result<String, CallSessionError>,
    {
        for attempt in 1..=MAX_ID_ATTEMPTS {
            let id = generate_session_id()?;
            let channel_id = make_channel()?;

            let mut sessions = self.sessions.write().map_err(poisoned)?;
            let mut channels = self.channels.write().map_err(poisoned)?;

            if sessions.contains_key(&id) || channels.contains_key(&channel_id) {
                warn!("Identifier collision on attempt {}, regenerating", attempt);
                continue;
            }

            let session = draft.into_session(id, channel_id.clone());
            channels.insert(channel_id, id);
            sessions.insert(id, Arc::new(Mutex::new(session.clone())));

            debug!("Registered call session {} on channel {}", session.id, session.channel_id);
            return Ok(session);
        }

        Err(CallSessionError::internal(
            "Could not generate unique session identifiers",
        ))
    }

    pub fn get(&self, id: Uuid) -> Result<CallSession, CallSessionError> {
        let entry = self.entry(id)?;
        let session = entry.lock().map_err(poisoned)?;
        Ok(session.clone())
    }

    pub fn get_by_channel(&self, channel_id: &str) -> Result<CallSession, CallSessionError> {
        let not_found = || CallSessionError::ChannelNotFound {
            channel_id: channel_id.to_string(),
        };

        let id = {
            let channels = self.channels.read().map_err(poisoned)?;
            channels.get(channel_id).copied().ok_or_else(not_found)?
        };

        // The session may have been evicted between the two lookups.
        self.get(id).map_err(|e| match e {
            CallSessionError::SessionNotFound { .. } => not_found(),
            other => other,
        })
    }

    /// Lazily yield snapshots of sessions matching `predicate`.
    ///
    /// The iterator walks the entries present when it was created; each call
    /// to `list` starts a new pass.
    pub fn list<P>(&self, predicate: P) -> Result<SessionIter<P>, CallSessionError>
    where
        P: Fn(&CallSession) -> bool,
    {
        let entries: Vec<SessionEntry> = {
            let sessions = self.sessions.read().map_err(poisoned)?;
            sessions.values().cloned().collect()
        };

        Ok(SessionIter {
            entries: entries.into_iter(),
            predicate,
        })
    }

    /// Apply `update` with exclusive access to one session and return the
    /// resulting state.
    pub fn mutate<F>(&self, id: Uuid, update: F) -> Result<CallSession, CallSessionError>
    where
        F: FnOnce(&mut CallSession),
    {
        let entry = self.entry(id)?;
        let mut session = entry.lock().map_err(poisoned)?;
        update(&mut *session);
        Ok(session.clone())
    }

    /// Drop ended sessions whose `ended_at` is older than `cutoff`.
    pub fn evict_ended_before(&self, cutoff: DateTime<Utc>) -> Result<usize, CallSessionError> {
        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let mut channels = self.channels.write().map_err(poisoned)?;

        let expired: Vec<(Uuid, String)> = sessions
            .iter()
            .filter_map(|(id, entry)| {
                let session = entry.lock().ok()?;
                match (session.status, session.ended_at) {
                    (CallStatus::Ended, Some(ended_at)) if ended_at < cutoff => {
                        Some((*id, session.channel_id.clone()))
                    }
                    _ => None,
                }
            })
            .collect();

        for (id, channel_id) in &expired {
            sessions.remove(id);
            channels.remove(channel_id);
        }

        if !expired.is_empty() {
            info!("Evicted {} ended call sessions older than {}", expired.len(), cutoff);
        }

        Ok(expired.len())
    }

    pub fn len(&self) -> Result<usize, CallSessionError> {
        Ok(self.sessions.read().map_err(poisoned)?.len())
    }

    pub fn is_empty(&self) -> Result<bool, CallSessionError> {
        Ok(self.len()? == 0)
    }

    fn entry(&self, id: Uuid) -> Result<SessionEntry, CallSessionError> {
        let sessions = self.sessions.read().map_err(poisoned)?;
        sessions
            .get(&id)
            .cloned()
            .ok_or(CallSessionError::SessionNotFound { session_id: id })
    }
}

pub struct SessionIter<P> {
    entries: std::vec::IntoIter<SessionEntry>,
    predicate: P,
}

impl<P> Iterator for SessionIter<P>
where
    P: Fn(&CallSession) -> bool,
{
    type Item = CallSession;

    fn next(&mut self) -> Option<Self::Item> {
        for entry in self.entries.by_ref() {
            let session = match entry.lock() {
                Ok(session) => session,
                Err(_) => {
                    warn!("Skipping call session with poisoned lock");
                    continue;
                }
            };
            if (self.predicate)(&*session) {
                return Some(session.clone());
            }
        }
        None
    }
}

// ==============================================================================
// IDENTIFIER GENERATION
// ==============================================================================

/// 128 bits straight from the OS generator.
pub fn generate_session_id() -> Result<Uuid, CallSessionError> {
    Ok(Uuid::from_bytes(random_bytes::<16>()?))
}

/// 32 lowercase hex characters.
pub fn random_channel_id() -> Result<String, CallSessionError> {
    Ok(hex_encode(&random_bytes::<16>()?))
}

pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CallSessionError> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| CallSessionError::internal(format!("Random generator failure: {}", e)))?;
    Ok(buf)
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn poisoned<T>(_: PoisonError<T>) -> CallSessionError {
    CallSessionError::internal("Session registry lock poisoned")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ParticipantRole;
    use assert_matches::assert_matches;
    use chrono::Duration;

    fn draft(doctor: &str, patient: &str) -> SessionDraft {
        let now = Utc::now();
        SessionDraft {
            doctor_id: doctor.to_string(),
            patient_id: Some(patient.to_string()),
            patient_external_id: None,
            call_kind: CallKind::Video,
            scheduled_at: now,
            participants: vec![
                Participant::pending(doctor, ParticipantRole::Doctor),
                Participant::pending(patient, ParticipantRole::Patient),
            ],
            created_at: now,
        }
    }

    #[test]
    fn test_create_assigns_unique_identifiers() {
        let registry = SessionRegistry::new();
        let first = registry.create(draft("d1", "p1")).unwrap();
        let second = registry.create(draft("d1", "p1")).unwrap();

        assert_ne!(first.id, second.id);
        assert_ne!(first.channel_id, second.channel_id);
        assert_eq!(first.channel_id.len(), 32);
        assert!(first.channel_id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first.status, CallStatus::Created);
        assert_eq!(registry.len().unwrap(), 2);
    }

    #[test]
    fn test_lookup_by_id_and_channel() {
        let registry = SessionRegistry::new();
        let created = registry.create(draft("d1", "p1")).unwrap();

        assert_eq!(registry.get(created.id).unwrap(), created);
        assert_eq!(registry.get_by_channel(&created.channel_id).unwrap(), created);
    }

    #[test]
    fn test_unknown_ids_are_not_found() {
        let registry = SessionRegistry::new();
        assert_matches!(
            registry.get(Uuid::new_v4()),
            Err(CallSessionError::SessionNotFound { .. })
        );
        assert_matches!(
            registry.get_by_channel("deadbeef"),
            Err(CallSessionError::ChannelNotFound { .. })
        );
        assert_matches!(
            registry.mutate(Uuid::new_v4(), |_| {}),
            Err(CallSessionError::SessionNotFound { .. })
        );
    }

    #[test]
    fn test_channel_collision_is_retried() {
        let registry = SessionRegistry::new();
        registry
            .create_with_channel(draft("d1", "p1"), || Ok("fixed".to_string()))
            .unwrap();

        let mut calls = 0;
        let second = registry
            .create_with_channel(draft("d2", "p2"), || {
                calls += 1;
                Ok(if calls == 1 { "fixed".to_string() } else { "other".to_string() })
            })
            .unwrap();
        assert_eq!(second.channel_id, "other");

        let exhausted =
            registry.create_with_channel(draft("d3", "p3"), || Ok("fixed".to_string()));
        assert_matches!(exhausted, Err(CallSessionError::Internal { .. }));
    }

    #[test]
    fn test_list_filters_and_restarts() {
        let registry = SessionRegistry::new();
        registry.create(draft("d1", "p1")).unwrap();
        registry.create(draft("d1", "p2")).unwrap();
        registry.create(draft("d2", "p3")).unwrap();

        let by_d1 = |s: &CallSession| s.doctor_id == "d1";
        assert_eq!(registry.list(by_d1).unwrap().count(), 2);
        assert_eq!(registry.list(by_d1).unwrap().count(), 2);
        assert_eq!(registry.list(|_| true).unwrap().count(), 3);
    }

    #[test]
    fn test_mutate_on_one_session_does_not_block_another() {
        let registry = SessionRegistry::new();
        let a = registry.create(draft("d1", "p1")).unwrap();
        let b = registry.create(draft("d2", "p2")).unwrap();

        // Holding A's entry lock while mutating B must not deadlock.
        let updated_a = registry
            .mutate(a.id, |session_a| {
                let updated_b = registry
                    .mutate(b.id, |session_b| session_b.status = CallStatus::Active)
                    .unwrap();
                assert_eq!(updated_b.status, CallStatus::Active);
                session_a.status = CallStatus::Ended;
            })
            .unwrap();
        assert_eq!(updated_a.status, CallStatus::Ended);
    }

    #[test]
    fn test_concurrent_mutations_are_not_lost() {
        let registry = SessionRegistry::new();
        let id = registry.create(draft("d1", "p1")).unwrap().id;

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let registry = &registry;
                scope.spawn(move || {
                    for i in 0..25 {
                        registry
                            .mutate(id, |s| {
                                s.participants.push(Participant::pending(
                                    format!("guest-{}-{}", worker, i),
                                    ParticipantRole::Other,
                                ))
                            })
                            .unwrap();
                    }
                });
            }
        });

        assert_eq!(registry.get(id).unwrap().participants.len(), 2 + 8 * 25);
    }

    #[test]
    fn test_evict_only_removes_old_ended_sessions() {
        let registry = SessionRegistry::new();
        let now = Utc::now();
        let old = registry.create(draft("d1", "p1")).unwrap();
        let recent = registry.create(draft("d1", "p2")).unwrap();
        let open = registry.create(draft("d1", "p3")).unwrap();

        registry
            .mutate(old.id, |s| {
                s.status = CallStatus::Ended;
                s.ended_at = Some(now - Duration::hours(100));
            })
            .unwrap();
        registry
            .mutate(recent.id, |s| {
                s.status = CallStatus::Ended;
                s.ended_at = Some(now - Duration::hours(1));
            })
            .unwrap();

        let evicted = registry.evict_ended_before(now - Duration::hours(72)).unwrap();
        assert_eq!(evicted, 1);
        assert_matches!(registry.get(old.id), Err(CallSessionError::SessionNotFound { .. }));
        assert_matches!(
            registry.get_by_channel(&old.channel_id),
            Err(CallSessionError::ChannelNotFound { .. })
        );
        assert!(registry.get(recent.id).is_ok());
        assert!(registry.get(open.id).is_ok());
    }
}
