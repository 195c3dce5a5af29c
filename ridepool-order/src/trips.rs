use crate::cancellation::{CancellationOutcome, CancellationSaga};
use crate::{emit, timestamp};
use chrono::Utc;
use ridepool_core::events::EventPublisher;
use ridepool_core::repository::{BookingRepository, TripRepository};
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::models::events::{DomainEvent, TripCancelledEvent, TripPublishedEvent};
use ridepool_shared::{Booking, BookingStatus, Departure, Trip, TripPreferences, TripStatus};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Owner edits. Only allowed while the trip has no active bookings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TripUpdate {
    pub departure: Option<Departure>,
    pub seats_total: Option<i32>,
    pub price_per_seat_cents: Option<i64>,
    pub preferences: Option<TripPreferences>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TripCancellation {
    pub trip: Trip,
    pub bookings: Vec<CancellationOutcome>,
    pub refunded_cents: i64,
    pub failed_refunds: usize,
}

pub struct TripManager {
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    saga: Arc<CancellationSaga>,
    publisher: Arc<dyn EventPublisher>,
}

impl TripManager {
    pub fn new(
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        saga: Arc<CancellationSaga>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            trips,
            bookings,
            saga,
            publisher,
        }
    }

    pub async fn get(&self, trip_id: Uuid) -> CoreResult<Trip> {
        self.trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))
    }

    async fn owned(&self, trip_id: Uuid, owner_id: Uuid) -> CoreResult<Trip> {
        let trip = self.get(trip_id).await?;
        if trip.owner_id != owner_id {
            return Err(CoreError::Validation("only the trip owner can do this".to_string()));
        }
        Ok(trip)
    }

    async fn active_bookings(&self, trip_id: Uuid) -> CoreResult<Vec<Booking>> {
        Ok(self
            .bookings
            .list_by_trip(trip_id)
            .await?
            .into_iter()
            .filter(|b| b.booking_status != BookingStatus::Cancelled)
            .collect())
    }

    /// Persists freshly built drafts, publishing them straight away when
    /// `publish` is set.
    pub async fn create(&self, drafts: Vec<Trip>, publish: bool) -> CoreResult<Vec<Trip>> {
        let mut stored = Vec::with_capacity(drafts.len());
        for mut trip in drafts {
            if trip.seats_total < 1 && trip.kind == ridepool_shared::TripKind::DriverOffer {
                return Err(CoreError::Validation("a driver offer needs at least one seat".to_string()));
            }
            trip.status = TripStatus::Draft;
            trip.seats_available = trip.seats_total;
            self.trips.insert_trip(&trip).await?;
            tracing::info!("Stored trip {} ({})", trip.id, trip.summary());
            if publish {
                trip = self.publish(trip.id, trip.owner_id).await?;
            }
            stored.push(trip);
        }
        Ok(stored)
    }

    pub async fn publish(&self, trip_id: Uuid, owner_id: Uuid) -> CoreResult<Trip> {
        let mut trip = self.owned(trip_id, owner_id).await?;
        match trip.status {
            TripStatus::Published => return Ok(trip),
            TripStatus::Draft => {}
            other => return Err(CoreError::invalid_transition(other, TripStatus::Published)),
        }
        trip.status = TripStatus::Published;
        trip.updated_at = Utc::now();
        self.trips.update_trip(&trip).await?;
        tracing::info!("Trip {} published", trip.id);
        emit(
            self.publisher.as_ref(),
            DomainEvent::TripPublished(TripPublishedEvent {
                trip_id: trip.id,
                owner_id: trip.owner_id,
                recurrence_group_id: trip.recurrence_group_id,
                timestamp: timestamp(),
            }),
        )
        .await;
        Ok(trip)
    }

    pub async fn update(&self, trip_id: Uuid, owner_id: Uuid, changes: TripUpdate) -> CoreResult<Trip> {
        let mut trip = self.owned(trip_id, owner_id).await?;
        if !matches!(trip.status, TripStatus::Draft | TripStatus::Published) {
            return Err(CoreError::invalid_transition(trip.status, "edit"));
        }
        if !self.active_bookings(trip_id).await?.is_empty() {
            return Err(CoreError::Validation("trips with active bookings cannot be edited".to_string()));
        }

        if let Some(departure) = changes.departure {
            trip.departure = departure;
        }
        if let Some(price) = changes.price_per_seat_cents {
            if price < 0 {
                return Err(CoreError::Validation("price cannot be negative".to_string()));
            }
            trip.price_per_seat_cents = price;
            trip.base_price_per_seat_cents = price;
            trip.price_overridden = true;
        }
        if let Some(preferences) = changes.preferences {
            trip.preferences = preferences;
        }
        if let Some(total) = changes.seats_total {
            if total < 1 {
                return Err(CoreError::Validation("a trip needs at least one seat".to_string()));
            }
            // no active bookings, so every seat is free
            if !self
                .trips
                .compare_and_set_seats(trip_id, trip.seats_total, total)
                .await?
            {
                return Err(CoreError::InventoryConflict(trip_id));
            }
            trip.seats_total = total;
            trip.seats_available = total;
        }
        trip.updated_at = Utc::now();
        self.trips.update_trip(&trip).await?;
        tracing::info!("Trip {} updated by owner", trip_id);
        Ok(trip)
    }

    /// Owner cancels the trip: no new reservations, and every active booking
    /// goes through the cancellation saga.
    pub async fn cancel_trip(&self, trip_id: Uuid, owner_id: Uuid) -> CoreResult<TripCancellation> {
        let mut trip = self.owned(trip_id, owner_id).await?;
        if matches!(trip.status, TripStatus::Cancelled | TripStatus::Completed) {
            return Err(CoreError::invalid_transition(trip.status, TripStatus::Cancelled));
        }
        trip.status = TripStatus::Cancelled;
        trip.updated_at = Utc::now();
        self.trips.update_trip(&trip).await?;

        let mut outcomes = Vec::new();
        for booking in self.active_bookings(trip_id).await? {
            outcomes.push(self.saga.cancel_booking(booking.id, "trip cancelled by driver").await?);
        }
        let refunded_cents = outcomes.iter().map(|o| o.refunded_cents).sum();
        let failed_refunds = outcomes.iter().filter(|o| o.refund_failed).count();
        tracing::info!(
            "Trip {} cancelled, {} booking(s) refunded {} cents, {} refund failure(s)",
            trip_id,
            outcomes.len(),
            refunded_cents,
            failed_refunds
        );

        emit(
            self.publisher.as_ref(),
            DomainEvent::TripCancelled(TripCancelledEvent {
                trip_id,
                affected_bookings: outcomes.iter().map(|o| o.booking.id).collect(),
                timestamp: timestamp(),
            }),
        )
        .await;

        Ok(TripCancellation {
            trip: self.get(trip_id).await?,
            bookings: outcomes,
            refunded_cents,
            failed_refunds,
        })
    }

    pub async fn complete(&self, trip_id: Uuid) -> CoreResult<Trip> {
        let mut trip = self.get(trip_id).await?;
        if trip.status != TripStatus::Published {
            return Err(CoreError::invalid_transition(trip.status, TripStatus::Completed));
        }
        trip.status = TripStatus::Completed;
        trip.updated_at = Utc::now();
        self.trips.update_trip(&trip).await?;
        Ok(trip)
    }

    /// Explicit deletion. Trips with bookings stay as history.
    pub async fn delete(&self, trip_id: Uuid, owner_id: Uuid) -> CoreResult<()> {
        self.owned(trip_id, owner_id).await?;
        if !self.bookings.list_by_trip(trip_id).await?.is_empty() {
            return Err(CoreError::Validation("trips with bookings cannot be deleted".to_string()));
        }
        self.trips.delete_trip(trip_id).await?;
        tracing::info!("Trip {} deleted", trip_id);
        Ok(())
    }

    pub async fn list_group(&self, group_id: Uuid) -> CoreResult<Vec<Trip>> {
        self.trips.list_by_group(group_id).await
    }

    pub async fn list_for_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Trip>> {
        self.trips.list_by_owner(owner_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{draft_trip, Fixture};

    #[tokio::test]
    async fn test_create_and_publish() {
        let fx = Fixture::new(3, 2000).await;
        let owner = Uuid::new_v4();
        let stored = fx.trip_manager.create(vec![draft_trip(owner, 3)], false).await.unwrap();
        assert_eq!(stored[0].status, TripStatus::Draft);

        let published = fx.trip_manager.publish(stored[0].id, owner).await.unwrap();
        assert_eq!(published.status, TripStatus::Published);
        assert!(fx.trip_manager.publish(stored[0].id, Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn test_update_blocked_by_bookings() {
        let fx = Fixture::new(3, 2000).await;
        let owner = fx.trip().await.owner_id;
        let changes = TripUpdate {
            seats_total: Some(4),
            ..TripUpdate::default()
        };
        let updated = fx.trip_manager.update(fx.trip_id, owner, changes.clone()).await.unwrap();
        assert_eq!(updated.seats_total, 4);
        assert_eq!(fx.available().await, 4);

        fx.reserve(1).await;
        assert!(fx.trip_manager.update(fx.trip_id, owner, changes).await.is_err());
    }

    #[tokio::test]
    async fn test_cancel_trip_refunds_every_booking() {
        let fx = Fixture::new(4, 2000).await;
        let owner = fx.trip().await.owner_id;
        fx.paid(2).await;
        fx.reserve(1).await;

        let result = fx.trip_manager.cancel_trip(fx.trip_id, owner).await.unwrap();
        assert_eq!(result.bookings.len(), 2);
        assert_eq!(result.refunded_cents, 4000);
        assert_eq!(result.trip.status, TripStatus::Cancelled);
        assert_eq!(result.trip.seats_available, 4);
        assert!(fx.service.reserve(fx.trip_id, Uuid::new_v4(), 1).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_only_without_bookings() {
        let fx = Fixture::new(2, 2000).await;
        let owner = fx.trip().await.owner_id;
        fx.reserve(1).await;
        assert!(fx.trip_manager.delete(fx.trip_id, owner).await.is_err());

        let other = fx.trip_manager.create(vec![draft_trip(owner, 2)], true).await.unwrap();
        fx.trip_manager.delete(other[0].id, owner).await.unwrap();
        assert!(fx.trip_manager.get(other[0].id).await.is_err());
    }
}
