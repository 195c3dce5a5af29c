use crate::cancellation::{CancellationOutcome, CancellationSaga};
use crate::manager::BookingManager;
use crate::orchestrator::PaymentOrchestrator;
use crate::repricing::RepricingService;
use crate::{emit, save_if_unchanged, timestamp};
use ridepool_catalog::SeatInventory;
use ridepool_core::events::EventPublisher;
use ridepool_core::payment::ProviderOrder;
use ridepool_core::repository::{BookingRepository, TripRepository};
use ridepool_core::{CoreError, CoreResult};
use ridepool_shared::models::events::{DomainEvent, SeatsReservedEvent};
use ridepool_shared::{Booking, BookingStatus, TripKind};
use std::sync::Arc;
use uuid::Uuid;

/// Entry point for everything a passenger does with a booking.
pub struct BookingService {
    trips: Arc<dyn TripRepository>,
    bookings: Arc<dyn BookingRepository>,
    inventory: Arc<SeatInventory>,
    orchestrator: Arc<PaymentOrchestrator>,
    saga: Arc<CancellationSaga>,
    repricing: Arc<RepricingService>,
    publisher: Arc<dyn EventPublisher>,
    manager: BookingManager,
}

impl BookingService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trips: Arc<dyn TripRepository>,
        bookings: Arc<dyn BookingRepository>,
        inventory: Arc<SeatInventory>,
        orchestrator: Arc<PaymentOrchestrator>,
        saga: Arc<CancellationSaga>,
        repricing: Arc<RepricingService>,
        publisher: Arc<dyn EventPublisher>,
    ) -> Self {
        Self {
            trips,
            bookings,
            inventory,
            orchestrator,
            saga,
            repricing,
            publisher,
            manager: BookingManager::new(),
        }
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.bookings
            .get_booking(booking_id)
            .await?
            .ok_or_else(|| CoreError::not_found("booking", booking_id))
    }

    pub async fn list_for_trip(&self, trip_id: Uuid) -> CoreResult<Vec<Booking>> {
        self.bookings.list_by_trip(trip_id).await
    }

    /// Reserves seats and records a pending booking priced at the trip's
    /// current per-seat price.
    pub async fn reserve(&self, trip_id: Uuid, passenger_id: Uuid, seats: i32) -> CoreResult<Booking> {
        let trip = self
            .trips
            .get_trip(trip_id)
            .await?
            .ok_or_else(|| CoreError::not_found("trip", trip_id))?;
        if trip.kind != TripKind::DriverOffer {
            return Err(CoreError::Validation("only driver offers can be booked".to_string()));
        }
        if trip.owner_id == passenger_id {
            return Err(CoreError::Validation("drivers cannot book their own trip".to_string()));
        }

        let mut booking = Booking::new(trip.id, passenger_id, seats, trip.price_per_seat_cents, trip.currency.clone());
        let token = self.inventory.reserve(trip.id, booking.id, seats).await?;
        booking.seats_held = true;

        if let Err(e) = self.bookings.insert_booking(&booking).await {
            tracing::error!("Persisting booking {} failed, giving seats back: {}", booking.id, e);
            self.inventory.release(trip.id, seats, booking.id).await?;
            return Err(e);
        }

        emit(
            self.publisher.as_ref(),
            DomainEvent::SeatsReserved(SeatsReservedEvent {
                trip_id: trip.id,
                booking_id: booking.id,
                seats,
                seats_available: token.seats_available,
                timestamp: timestamp(),
            }),
        )
        .await;
        Ok(booking)
    }

    pub async fn start_payment(&self, booking_id: Uuid) -> CoreResult<ProviderOrder> {
        self.orchestrator.start_payment(booking_id).await
    }

    pub async fn authorize(&self, booking_id: Uuid) -> CoreResult<Booking> {
        self.orchestrator.mark_authorized(booking_id).await
    }

    pub async fn capture(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.orchestrator.capture(booking_id).await?;
        self.after_confirmation(&booking).await
    }

    pub async fn confirm_capture(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self.orchestrator.confirm_capture(booking_id).await?;
        self.after_confirmation(&booking).await
    }

    async fn after_confirmation(&self, booking: &Booking) -> CoreResult<Booking> {
        if booking.booking_status != BookingStatus::Confirmed {
            return Ok(booking.clone());
        }
        if let Err(e) = self.repricing.apply(booking.trip_id).await {
            tracing::warn!("Repricing trip {} after booking {} failed: {}", booking.trip_id, booking.id, e);
        }
        // repricing may have lowered amount_due or refunded part of it
        self.get_booking(booking.id).await
    }

    /// Starts a new payment attempt after a failed one, re-reserving seats.
    pub async fn retry_payment(&self, booking_id: Uuid) -> CoreResult<Booking> {
        let mut booking = self.get_booking(booking_id).await?;
        self.manager.restart_attempt(&mut booking)?;
        let reserved = !booking.seats_held;
        if reserved {
            self.inventory
                .reserve(booking.trip_id, booking.id, booking.seats_booked)
                .await?;
            booking.seats_held = true;
        }
        let saved = match save_if_unchanged(self.bookings.as_ref(), &mut booking).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(CoreError::BookingConflict(booking.id)),
            Err(e) => Err(e),
        };
        if let Err(e) = saved {
            if reserved {
                self.inventory
                    .release(booking.trip_id, booking.seats_booked, booking.id)
                    .await?;
            }
            return Err(e);
        }
        tracing::info!("Booking {} ready for payment attempt {}", booking.id, booking.attempt + 1);
        Ok(booking)
    }

    pub async fn cancel(&self, booking_id: Uuid, requested_by: Uuid) -> CoreResult<CancellationOutcome> {
        let booking = self.get_booking(booking_id).await?;
        if booking.passenger_id != requested_by {
            let trip = self.trips.get_trip(booking.trip_id).await?;
            if trip.map(|t| t.owner_id) != Some(requested_by) {
                return Err(CoreError::Validation("only the passenger or the driver can cancel".to_string()));
            }
        }
        self.saga.cancel_booking(booking_id, "requested").await
    }
}
