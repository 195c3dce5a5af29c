use crate::CoreResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use ridepool_shared::models::events::DomainEvent;

#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()>;
}

/// Drops every event. Used when no broker is configured.
#[derive(Debug, Default)]
pub struct NoopPublisher;

#[async_trait]
impl EventPublisher for NoopPublisher {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()> {
        tracing::debug!("Dropping event for topic {}", event.topic());
        Ok(())
    }
}

/// Keeps published events in memory so callers can inspect them.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<DomainEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events.lock().clone()
    }

    pub fn topics(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.topic()).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &DomainEvent) -> CoreResult<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}
