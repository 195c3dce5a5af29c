//! Process-local repositories backed by `parking_lot` locks.

use crate::repository::{BookingRepository, TripRepository, UserRepository};
use crate::{CoreError, CoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use ridepool_shared::{Booking, BookingStatus, RepricingRecord, Trip, User};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct MemoryTripRepository {
    trips: RwLock<HashMap<Uuid, Trip>>,
    released: RwLock<HashSet<Uuid>>,
    repricings: RwLock<Vec<RepricingRecord>>,
}

impl MemoryTripRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TripRepository for MemoryTripRepository {
    async fn insert_trip(&self, trip: &Trip) -> CoreResult<()> {
        let mut trips = self.trips.write();
        if trips.contains_key(&trip.id) {
            return Err(CoreError::Storage(format!("trip {} already exists", trip.id)));
        }
        trips.insert(trip.id, trip.clone());
        Ok(())
    }

    async fn get_trip(&self, id: Uuid) -> CoreResult<Option<Trip>> {
        Ok(self.trips.read().get(&id).cloned())
    }

    async fn update_trip(&self, trip: &Trip) -> CoreResult<()> {
        let mut trips = self.trips.write();
        let stored = trips
            .get_mut(&trip.id)
            .ok_or_else(|| CoreError::not_found("trip", trip.id))?;
        let seats_available = stored.seats_available;
        *stored = trip.clone();
        stored.seats_available = seats_available;
        Ok(())
    }

    async fn compare_and_set_seats(&self, id: Uuid, expected: i32, new: i32) -> CoreResult<bool> {
        let mut trips = self.trips.write();
        let trip = trips.get_mut(&id).ok_or_else(|| CoreError::not_found("trip", id))?;
        if trip.seats_available != expected {
            return Ok(false);
        }
        trip.seats_available = new;
        trip.updated_at = Utc::now();
        Ok(true)
    }

    async fn delete_trip(&self, id: Uuid) -> CoreResult<()> {
        self.trips
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| CoreError::not_found("trip", id))
    }

    async fn list_by_owner(&self, owner_id: Uuid) -> CoreResult<Vec<Trip>> {
        let mut out: Vec<Trip> = self
            .trips
            .read()
            .values()
            .filter(|t| t.owner_id == owner_id)
            .cloned()
            .collect();
        out.sort_by_key(|t| t.departure.at);
        Ok(out)
    }

    async fn list_by_group(&self, group_id: Uuid) -> CoreResult<Vec<Trip>> {
        let mut out: Vec<Trip> = self
            .trips
            .read()
            .values()
            .filter(|t| t.recurrence_group_id == Some(group_id))
            .cloned()
            .collect();
        out.sort_by_key(|t| t.departure.at);
        Ok(out)
    }

    async fn mark_seats_released(&self, booking_id: Uuid) -> CoreResult<bool> {
        Ok(self.released.write().insert(booking_id))
    }

    async fn clear_seats_released(&self, booking_id: Uuid) -> CoreResult<()> {
        self.released.write().remove(&booking_id);
        Ok(())
    }

    async fn record_repricing(&self, record: &RepricingRecord) -> CoreResult<()> {
        self.repricings.write().push(record.clone());
        Ok(())
    }

    async fn list_repricings(&self, trip_id: Uuid) -> CoreResult<Vec<RepricingRecord>> {
        Ok(self
            .repricings
            .read()
            .iter()
            .filter(|r| r.trip_id == trip_id)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl MemoryBookingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BookingRepository for MemoryBookingRepository {
    async fn insert_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut bookings = self.bookings.write();
        if bookings.contains_key(&booking.id) {
            return Err(CoreError::Storage(format!("booking {} already exists", booking.id)));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> CoreResult<Option<Booking>> {
        Ok(self.bookings.read().get(&id).cloned())
    }

    async fn update_booking(&self, booking: &Booking) -> CoreResult<()> {
        let mut bookings = self.bookings.write();
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| CoreError::not_found("booking", booking.id))?;
        let version = stored.version + 1;
        *stored = booking.clone();
        stored.version = version;
        Ok(())
    }

    async fn update_booking_if(&self, booking: &Booking, expected_version: i64) -> CoreResult<bool> {
        let mut bookings = self.bookings.write();
        let stored = bookings
            .get_mut(&booking.id)
            .ok_or_else(|| CoreError::not_found("booking", booking.id))?;
        if stored.version != expected_version {
            return Ok(false);
        }
        *stored = booking.clone();
        stored.version = expected_version + 1;
        Ok(true)
    }

    async fn list_by_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Booking>> {
        let mut out: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| b.trip_id == trip_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }

    async fn list_by_passenger(&self, passenger_id: Uuid) -> CoreResult<Vec<Booking>> {
        let mut out: Vec<Booking> = self
            .bookings
            .read()
            .values()
            .filter(|b| b.passenger_id == passenger_id)
            .cloned()
            .collect();
        out.sort_by_key(|b| b.created_at);
        Ok(out)
    }

    async fn list_pending_before(&self, cutoff: DateTime<Utc>) -> CoreResult<Vec<Booking>> {
        Ok(self
            .bookings
            .read()
            .values()
            .filter(|b| b.booking_status == BookingStatus::Pending && b.created_at < cutoff)
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get_or_create(&self, external_id: &str) -> CoreResult<User> {
        let mut users = self.users.write();
        if let Some(existing) = users.values().find(|u| u.external_id == external_id) {
            return Ok(existing.clone());
        }
        let user = User::new(external_id);
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> CoreResult<Option<User>> {
        Ok(self.users.read().get(&id).cloned())
    }

    async fn update_user(&self, user: &User) -> CoreResult<()> {
        let mut users = self.users.write();
        let stored = users
            .get_mut(&user.id)
            .ok_or_else(|| CoreError::not_found("user", user.id))?;
        *stored = user.clone();
        Ok(())
    }

    async fn disable_user(&self, id: Uuid) -> CoreResult<()> {
        let mut users = self.users.write();
        let user = users.get_mut(&id).ok_or_else(|| CoreError::not_found("user", id))?;
        user.disabled = true;
        user.updated_at = Utc::now();
        Ok(())
    }
}
