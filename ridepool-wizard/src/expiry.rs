use crate::session::SessionStore;
use ridepool_core::clock::Clock;
use ridepool_core::CoreResult;
use std::sync::Arc;

/// Drops wizard sessions idle longer than the TTL. Persisted trips and
/// bookings are never touched.
pub struct SessionReaper {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl SessionReaper {
    pub fn new(store: Arc<dyn SessionStore>, clock: Arc<dyn Clock>, ttl: chrono::Duration) -> Self {
        Self { store, clock, ttl }
    }

    pub async fn sweep(&self) -> CoreResult<usize> {
        let cutoff = self.clock.now() - self.ttl;
        let purged = self.store.purge_idle(cutoff).await?;
        if purged > 0 {
            tracing::info!("Reaped {} idle wizard sessions", purged);
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemorySessionStore, WizardSession};
    use crate::steps::Flow;
    use chrono::NaiveDate;
    use ridepool_core::clock::FixedClock;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_sweep_only_removes_idle_sessions() {
        let clock = Arc::new(FixedClock::new(
            NaiveDate::from_ymd_opt(2026, 9, 1).unwrap().and_hms_opt(12, 0, 0).unwrap(),
        ));
        let ttl = chrono::Duration::minutes(30);
        let store = Arc::new(MemorySessionStore::new(clock.clone(), ttl));
        store
            .create(&WizardSession::new("stale", Uuid::new_v4(), Flow::Trip, clock.now()))
            .await
            .unwrap();
        clock.advance(chrono::Duration::minutes(31));
        store
            .create(&WizardSession::new("fresh", Uuid::new_v4(), Flow::Trip, clock.now()))
            .await
            .unwrap();

        let reaper = SessionReaper::new(store.clone(), clock.clone(), ttl);
        assert_eq!(reaper.sweep().await.unwrap(), 1);
        assert_eq!(reaper.sweep().await.unwrap(), 0);
        assert!(store.load("fresh").await.unwrap().is_some());
    }
}
