use crate::datetime::DateTimeMachine;
use crate::steps::{first_step, BookingDraft, Flow, StepId, TripDraft};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use ridepool_core::clock::Clock;
use ridepool_core::CoreResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Ephemeral per-user wizard state. Never outlives its TTL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WizardSession {
    pub id: Uuid,
    pub user_key: String,
    pub user_id: Uuid,
    /// Bumped on every processed event; events must quote the current value.
    pub seq: u64,
    pub flow: Flow,
    pub step: StepId,
    pub draft: TripDraft,
    pub booking: Option<BookingDraft>,
    pub datetime: Option<DateTimeMachine>,
    /// Set by an edit from the confirm step.
    pub return_to_confirm: bool,
    pub created_at: DateTime<Utc>,
    pub last_event_at: DateTime<Utc>,
}

impl WizardSession {
    pub fn new(user_key: impl Into<String>, user_id: Uuid, flow: Flow, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_key: user_key.into(),
            user_id,
            seq: 0,
            flow,
            step: first_step(flow),
            draft: TripDraft::default(),
            booking: None,
            datetime: None,
            return_to_confirm: false,
            created_at: now,
            last_event_at: now,
        }
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.last_event_at < cutoff
    }
}

/// Session storage keyed by user.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, user_key: &str) -> CoreResult<Option<WizardSession>>;

    /// Stores a fresh session, replacing any previous one for the user.
    async fn create(&self, session: &WizardSession) -> CoreResult<()>;

    /// Writes `session` only if the stored copy still has `expected_seq`.
    async fn save_if_seq(&self, session: &WizardSession, expected_seq: u64) -> CoreResult<bool>;

    async fn delete(&self, user_key: &str) -> CoreResult<()>;

    /// Drops sessions idle since before `cutoff`; returns how many.
    async fn purge_idle(&self, cutoff: DateTime<Utc>) -> CoreResult<usize>;
}

pub struct MemorySessionStore {
    sessions: Mutex<HashMap<String, WizardSession>>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl MemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            clock,
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.ttl
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, user_key: &str) -> CoreResult<Option<WizardSession>> {
        let cutoff = self.cutoff();
        let mut sessions = self.sessions.lock();
        match sessions.get(user_key) {
            Some(s) if s.is_idle_since(cutoff) => {
                sessions.remove(user_key);
                Ok(None)
            }
            other => Ok(other.cloned()),
        }
    }

    async fn create(&self, session: &WizardSession) -> CoreResult<()> {
        self.sessions
            .lock()
            .insert(session.user_key.clone(), session.clone());
        Ok(())
    }

    async fn save_if_seq(&self, session: &WizardSession, expected_seq: u64) -> CoreResult<bool> {
        let mut sessions = self.sessions.lock();
        match sessions.get_mut(&session.user_key) {
            Some(stored) if stored.id == session.id && stored.seq == expected_seq => {
                *stored = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn delete(&self, user_key: &str) -> CoreResult<()> {
        self.sessions.lock().remove(user_key);
        Ok(())
    }

    async fn purge_idle(&self, cutoff: DateTime<Utc>) -> CoreResult<usize> {
        let mut sessions = self.sessions.lock();
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_idle_since(cutoff));
        Ok(before - sessions.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ridepool_core::clock::FixedClock;

    fn store() -> (Arc<FixedClock>, MemorySessionStore) {
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap().and_hms_opt(8, 0, 0).unwrap(),
        ));
        let store = MemorySessionStore::new(clock.clone(), chrono::Duration::minutes(30));
        (clock, store)
    }

    #[tokio::test]
    async fn test_seq_guard() {
        let (clock, store) = store();
        let session = WizardSession::new("u1", Uuid::new_v4(), Flow::Trip, clock.now());
        store.create(&session).await.unwrap();

        let mut next = session.clone();
        next.seq = 1;
        assert!(store.save_if_seq(&next, 0).await.unwrap());
        // Same expected seq again loses.
        assert!(!store.save_if_seq(&next, 0).await.unwrap());
        assert_eq!(store.load("u1").await.unwrap().unwrap().seq, 1);
    }

    #[tokio::test]
    async fn test_save_rejects_replaced_session() {
        let (clock, store) = store();
        let old = WizardSession::new("u1", Uuid::new_v4(), Flow::Trip, clock.now());
        store.create(&old).await.unwrap();
        let fresh = WizardSession::new("u1", old.user_id, Flow::Trip, clock.now());
        store.create(&fresh).await.unwrap();
        assert!(!store.save_if_seq(&old, 0).await.unwrap());
    }

    #[tokio::test]
    async fn test_idle_sessions_vanish() {
        let (clock, store) = store();
        store
            .create(&WizardSession::new("u1", Uuid::new_v4(), Flow::Trip, clock.now()))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(10));
        store
            .create(&WizardSession::new("u2", Uuid::new_v4(), Flow::Trip, clock.now()))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(25));

        assert!(store.load("u1").await.unwrap().is_none());
        assert!(store.load("u2").await.unwrap().is_some());
        assert_eq!(store.purge_idle(clock.now()).await.unwrap(), 1);
        assert!(store.is_empty());
    }
}
