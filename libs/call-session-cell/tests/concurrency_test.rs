use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use futures::future::join_all;

use call_session_cell::models::ListSessionsQuery;
use call_session_cell::{
    CallKind, CallSessionState, CallStatus, ManualClock, NewCallSession, ParticipantRole,
};
use shared_utils::test_utils::{TestConfig, TestUser};

fn shared_state() -> Arc<CallSessionState> {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    Arc::new(CallSessionState::with_clock(TestConfig::default().to_arc(), clock))
}

fn consultation(doctor: &TestUser, patient: &TestUser) -> NewCallSession {
    NewCallSession {
        doctor_id: doctor.id.clone(),
        patient_id: patient.id.clone(),
        patient_external_id: None,
        call_kind: CallKind::Video,
        scheduled_at: None,
        extra_participants: Vec::new(),
    }
}

#[test]
fn test_concurrent_joins_activate_exactly_once() {
    let state = shared_state();
    let doctor = TestUser::doctor();
    let patient = TestUser::patient();
    let session_id = state
        .lifecycle
        .create_session(consultation(&doctor, &patient))
        .unwrap()
        .id;

    let started: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let state = &state;
                let (identity, role) = if i % 2 == 0 {
                    (doctor.id.as_str(), ParticipantRole::Doctor)
                } else {
                    (patient.id.as_str(), ParticipantRole::Patient)
                };
                scope.spawn(move || state.lifecycle.join(session_id, identity, role).unwrap())
            })
            .collect();

        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().session.started_at)
            .collect()
    });

    let session = state.lifecycle.get(session_id).unwrap();
    assert_eq!(session.status, CallStatus::Active);
    assert_eq!(session.participants.len(), 2);
    assert!(session.participants.iter().all(|p| p.joined));
    assert!(started.iter().all(|s| *s == session.started_at));
}

#[test]
fn test_concurrent_ends_agree_on_one_outcome() {
    let state = shared_state();
    let doctor = TestUser::doctor();
    let patient = TestUser::patient();
    let session_id = state
        .lifecycle
        .create_session(consultation(&doctor, &patient))
        .unwrap()
        .id;
    state
        .lifecycle
        .join(session_id, &patient.id, ParticipantRole::Patient)
        .unwrap();

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = [&doctor, &patient, &doctor, &patient]
            .into_iter()
            .map(|user| {
                let state = &state;
                scope.spawn(move || state.lifecycle.end(session_id, &user.id).unwrap())
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let stored = state.lifecycle.get(session_id).unwrap();
    assert_eq!(stored.status, CallStatus::Ended);
    assert!(outcomes.iter().all(|s| *s == stored));
}

#[test]
fn test_joins_and_ends_race_without_backward_transitions() {
    let state = shared_state();
    let doctor = TestUser::doctor();
    let patient = TestUser::patient();
    let session_id = state
        .lifecycle
        .create_session(consultation(&doctor, &patient))
        .unwrap()
        .id;

    let writers_done = AtomicBool::new(false);

    thread::scope(|scope| {
        let reader = scope.spawn(|| {
            let mut last = CallStatus::Created;
            let mut observations = 0usize;
            loop {
                let status = state.lifecycle.get(session_id).unwrap().status;
                assert!(status >= last, "status went from {} back to {}", last, status);
                last = status;
                observations += 1;
                if writers_done.load(Ordering::Acquire) {
                    break observations;
                }
            }
        });

        let writers: Vec<_> = (0..12)
            .map(|i| {
                let state = &state;
                let doctor = &doctor;
                let patient = &patient;
                scope.spawn(move || {
                    if i % 3 == 0 {
                        state.lifecycle.end(session_id, &doctor.id).unwrap();
                    } else {
                        // Joins after the end are rejected; either outcome is fine here.
                        let _ = state
                            .lifecycle
                            .join(session_id, &patient.id, ParticipantRole::Patient);
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        writers_done.store(true, Ordering::Release);
        assert!(reader.join().unwrap() > 0);
    });

    let session = state.lifecycle.get(session_id).unwrap();
    assert_eq!(session.status, CallStatus::Ended);
    assert!(session.duration_seconds.is_some());
    if let (Some(started), Some(ended)) = (session.started_at, session.ended_at) {
        assert!(ended >= started);
    }
}

#[tokio::test]
async fn test_parallel_creation_yields_unique_channels() {
    let state = shared_state();
    let doctor = TestUser::doctor();
    let patient = TestUser::patient();

    let tasks = (0..64).map(|_| {
        let state = state.clone();
        let command = consultation(&doctor, &patient);
        tokio::spawn(async move { state.lifecycle.create_session(command).unwrap() })
    });

    let sessions: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|result| result.unwrap())
        .collect();

    let mut channels: Vec<_> = sessions.iter().map(|s| s.channel_id.clone()).collect();
    channels.sort();
    channels.dedup();
    assert_eq!(channels.len(), 64);

    let page = state
        .lifecycle
        .list_for_user(
            &patient.id,
            &ListSessionsQuery {
                limit: Some(100),
                ..ListSessionsQuery::default()
            },
        )
        .unwrap();
    assert_eq!(page.total, 64);
}
