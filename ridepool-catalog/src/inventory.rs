use ridepool_core::repository::TripRepository;
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::TripStatus;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

const DEFAULT_MAX_CAS_RETRIES: u32 = 16;

/// Proof that `seats` were taken from a trip for a booking.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReservationToken {
    pub trip_id: Uuid,
    pub booking_id: Uuid,
    pub seats: i32,
    pub seats_available: i32,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum InventoryError {
    #[error("Seat count must be positive, got {0}")]
    InvalidSeatCount(i32),
    #[error("Trip {0} is not open for booking")]
    NotBookable(Uuid),
}

impl From<InventoryError> for CoreError {
    fn from(err: InventoryError) -> Self {
        CoreError::Validation(err.to_string())
    }
}

/// Seat accounting for trips. Every change to `seats_available` is a
/// compare-and-swap against the repository so concurrent callers never
/// oversell.
pub struct SeatInventory {
    trips: Arc<dyn TripRepository>,
    max_retries: u32,
}

impl SeatInventory {
    pub fn new(trips: Arc<dyn TripRepository>) -> Self {
        Self {
            trips,
            max_retries: DEFAULT_MAX_CAS_RETRIES,
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    /// Takes `seats` from the trip, all or nothing.
    pub async fn reserve(&self, trip_id: Uuid, booking_id: Uuid, seats: i32) -> CoreResult<ReservationToken> {
        if seats < 1 {
            return Err(InventoryError::InvalidSeatCount(seats).into());
        }

        for attempt in 0..self.max_retries {
            let trip = self
                .trips
                .get_trip(trip_id)
                .await?
                .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
            if trip.status != TripStatus::Published {
                return Err(InventoryError::NotBookable(trip_id).into());
            }
            if trip.seats_available < seats {
                return Err(CoreError::InsufficientSeats {
                    requested: seats,
                    available: trip.seats_available,
                });
            }

            let remaining = trip.seats_available - seats;
            if self
                .trips
                .compare_and_set_seats(trip_id, trip.seats_available, remaining)
                .await?
            {
                self.trips.clear_seats_released(booking_id).await?;
                tracing::info!(
                    "Reserved {} seat(s) on trip {} for booking {} ({} left)",
                    seats,
                    trip_id,
                    booking_id,
                    remaining
                );
                return Ok(ReservationToken {
                    trip_id,
                    booking_id,
                    seats,
                    seats_available: remaining,
                });
            }
            tracing::debug!("Seat CAS lost on trip {} (attempt {})", trip_id, attempt + 1);
            tokio::task::yield_now().await;
        }

        tracing::warn!("Giving up reserving seats on trip {} after {} attempts", trip_id, self.max_retries);
        Err(CoreError::InventoryConflict(trip_id))
    }

    /// Gives `seats` back to the trip, capped at `seats_total`. A second call
    /// for the same booking is a no-op. Returns whether seats moved.
    pub async fn release(&self, trip_id: Uuid, seats: i32, booking_id: Uuid) -> CoreResult<bool> {
        if seats < 1 {
            return Err(InventoryError::InvalidSeatCount(seats).into());
        }
        if !self.trips.mark_seats_released(booking_id).await? {
            tracing::debug!("Seats for booking {} already released", booking_id);
            return Ok(false);
        }

        match self.increment(trip_id, seats).await {
            Ok(available) => {
                tracing::info!(
                    "Released {} seat(s) on trip {} for booking {} ({} available)",
                    seats,
                    trip_id,
                    booking_id,
                    available
                );
                Ok(true)
            }
            Err(e) => {
                // undo the mark so a retry can still give the seats back
                self.trips.clear_seats_released(booking_id).await?;
                Err(e)
            }
        }
    }

    async fn increment(&self, trip_id: Uuid, seats: i32) -> CoreResult<i32> {
        for _ in 0..self.max_retries {
            let trip = self
                .trips
                .get_trip(trip_id)
                .await?
                .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
            let target = (trip.seats_available + seats).min(trip.seats_total);
            if self
                .trips
                .compare_and_set_seats(trip_id, trip.seats_available, target)
                .await?
            {
                return Ok(target);
            }
            tokio::task::yield_now().await;
        }
        Err(CoreError::InventoryConflict(trip_id))
    }

    pub async fn available(&self, trip_id: Uuid) -> CoreResult<i32> {
        self.trips
            .get_trip(trip_id)
            .await?
            .map(|t| t.seats_available)
            .ok_or_else(|| CoreError::not_found("trip", trip_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use ridepool_core::memory::MemoryTripRepository;
    use ridepool_shared::{Departure, Trip, TripKind, Waypoint};

    fn place(name: &str) -> Waypoint {
        Waypoint {
            name: name.to_string(),
            zip: "1000".to_string(),
            canton: "VD".to_string(),
            lat: 46.5,
            lon: 6.6,
        }
    }

    async fn published_trip(repo: &MemoryTripRepository, seats: i32) -> Uuid {
        let at = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let mut trip = Trip::new(
            TripKind::DriverOffer,
            Uuid::new_v4(),
            place("A"),
            place("B"),
            Departure::exact(at),
            seats,
            2000,
            "CHF",
        );
        trip.status = TripStatus::Published;
        repo.insert_trip(&trip).await.unwrap();
        trip.id
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let repo = Arc::new(MemoryTripRepository::new());
        let trip_id = published_trip(&repo, 3).await;
        let inventory = SeatInventory::new(repo.clone());

        let booking = Uuid::new_v4();
        let token = inventory.reserve(trip_id, booking, 2).await.unwrap();
        assert_eq!(token.seats_available, 1);

        let err = inventory.reserve(trip_id, Uuid::new_v4(), 2).await.unwrap_err();
        assert!(matches!(err, CoreError::InsufficientSeats { requested: 2, available: 1 }));
        assert_eq!(inventory.available(trip_id).await.unwrap(), 1);

        assert!(inventory.release(trip_id, 2, booking).await.unwrap());
        assert_eq!(inventory.available(trip_id).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_release_is_idempotent_per_booking() {
        let repo = Arc::new(MemoryTripRepository::new());
        let trip_id = published_trip(&repo, 4).await;
        let inventory = SeatInventory::new(repo.clone());

        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        inventory.reserve(trip_id, a, 2).await.unwrap();
        inventory.reserve(trip_id, b, 2).await.unwrap();

        assert!(inventory.release(trip_id, 2, a).await.unwrap());
        assert!(!inventory.release(trip_id, 2, a).await.unwrap());
        assert_eq!(inventory.available(trip_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_release_never_exceeds_total() {
        let repo = Arc::new(MemoryTripRepository::new());
        let trip_id = published_trip(&repo, 2).await;
        let inventory = SeatInventory::new(repo.clone());

        inventory.release(trip_id, 5, Uuid::new_v4()).await.unwrap();
        assert_eq!(inventory.available(trip_id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_rejects_draft_trip_and_bad_counts() {
        let repo = Arc::new(MemoryTripRepository::new());
        let trip_id = published_trip(&repo, 2).await;
        let mut trip = repo.get_trip(trip_id).await.unwrap().unwrap();
        trip.status = TripStatus::Draft;
        repo.update_trip(&trip).await.unwrap();

        let inventory = SeatInventory::new(repo.clone());
        assert!(matches!(
            inventory.reserve(trip_id, Uuid::new_v4(), 1).await,
            Err(CoreError::Validation(_))
        ));
        assert!(inventory.reserve(Uuid::new_v4(), Uuid::new_v4(), 1).await.is_err());
        assert!(inventory.reserve(trip_id, Uuid::new_v4(), 0).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_oversell() {
        let repo = Arc::new(MemoryTripRepository::new());
        let trip_id = published_trip(&repo, 5).await;
        let inventory = Arc::new(SeatInventory::new(repo.clone()).with_max_retries(1_000));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let inventory = inventory.clone();
            handles.push(tokio::spawn(async move {
                inventory.reserve(trip_id, Uuid::new_v4(), 1).await
            }));
        }

        let mut ok = 0;
        let mut insufficient = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => ok += 1,
                Err(CoreError::InsufficientSeats { .. }) => insufficient += 1,
                Err(e) => panic!("unexpected error: {}", e),
            }
        }
        assert_eq!(ok, 5);
        assert_eq!(insufficient, 7);
        assert_eq!(inventory.available(trip_id).await.unwrap(), 0);
    }
}
