use crate::CoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ridepool_shared::{Booking, RepricingRecord, Trip, User};
use uuid::Uuid;

/// Trip persistence plus the per-trip seat ledger.
#[async_trait]
pub trait TripRepository: Send + Sync {
    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()>;

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>>;

    /// Overwrites everything except `seats_available`, which only moves
    /// through `compare_and_set_seats`.
    async fn update_trip(&self, trip: &Trip) -> CoreResult<()>;

    /// Atomically sets `seats_available` to `new` if it currently equals
    /// `expected`. Returns whether the swap happened.
    async fn compare_and_set_seats(&self, id: Uuid, expected: i32, new: i32) -> CoreResult<bool>;

    async fn delete_trip(&self, id: Uuid) -> CoreResult<()>;

    async fn list_by_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Trip>>;

    async fn list_by_group(&self, group_id: Uuid) -> CoreResult<Vec<Trip>>;

    /// Records that `booking_id` gave back its seats. Returns `false` when the
    /// mark already existed.
    async fn mark_seats_released(&self, booking_id: Uuid) -> CoreResult<bool>;

    async fn clear_seats_released(&self, booking_id: Uuid) -> CoreResult<()>;

    async fn record_repricing(&self, record: &RepricingRecord) -> CoreResult<()>;

    async fn list_repricings(&self, trip_id: Uuid) -> CoreResult<Vec<RepricingRecord>>;
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>>;

    /// Unconditional write. Bumps the stored version.
    async fn update_booking(&self, booking: &Booking) -> CoreResult<()>;

    /// Writes `booking` only if the stored version still equals
    /// `expected_version`, storing `expected_version + 1`. Returns whether
    /// the write happened.
    async fn update_booking_if(&self, booking: &Booking, expected_version: i64) -> CoreResult<bool>;

    async fn list_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Booking>>;

    async fn list_by_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>>;

    /// Pending bookings created before `cutoff`.
    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get_or_create(&self, external_id: &str) -> CoreResult<User>;

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>>;

    async fn update_user(&self, user: &User) -> CoreResult<()>;

    async fn disable_user(&self, id: Uuid) -> CoreResult<()>;
}
