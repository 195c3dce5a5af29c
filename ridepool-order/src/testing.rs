use crate::cancellation::CancellationSaga;
use crate::mock_provider::MockPaymentProvider;
use crate::orchestrator::{PaymentOrchestrator, PaymentSettings};
use crate::repricing::RepricingService;
use crate::service::BookingService;
use crate::trips::TripManager;
use chrono::NaiveDate;
use ridepool_catalog::{NoRepricing, RepricingPolicy, SeatInventory};
use ridepool_core::events::RecordingPublisher;
use ridepool_core::memory::{MemoryBookingRepository, MemoryTripRepository};
use ridepool_core::repository::{BookingRepository, TripRepository};
use ridepool_shared::{Booking, Departure, Trip, TripKind, TripStatus, Waypoint};
use std::sync::Arc;
use uuid::Uuid;

pub fn draft_trip(owner_id: Uuid, seats: i32) -> Trip {
    let lausanne = Waypoint {
        name: "Lausanne".into(),
        zip: "1003".into(),
        canton: "VD".into(),
        lat: 46.5197,
        lon: 6.6323,
    };
    let fribourg = Waypoint {
        name: "Fribourg".into(),
        zip: "1700".into(),
        canton: "FR".into(),
        lat: 46.8063,
        lon: 7.1617,
    };
    let at = NaiveDate::from_ymd_opt(2031, 4, 2).unwrap().and_hms_opt(7, 30, 0).unwrap();
    Trip::new(
        TripKind::DriverOffer,
        owner_id,
        lausanne,
        fribourg,
        Departure::exact(at),
        seats,
        2000,
        "CHF",
    )
}

/// Fully wired booking stack over in-memory repositories with one
/// published trip.
pub struct Fixture {
    pub trips: Arc<MemoryTripRepository>,
    pub bookings: Arc<MemoryBookingRepository>,
    pub provider: Arc<MockPaymentProvider>,
    pub publisher: Arc<RecordingPublisher>,
    pub inventory: Arc<SeatInventory>,
    pub orchestrator: Arc<PaymentOrchestrator>,
    pub saga: Arc<CancellationSaga>,
    pub service: BookingService,
    pub trip_manager: TripManager,
    pub trip_id: Uuid,
}

impl Fixture {
    pub async fn new(seats: i32, price: i64) -> Self {
        Self::build(seats, price, PaymentSettings::default(), Arc::new(NoRepricing)).await
    }

    pub async fn with_settings(seats: i32, price: i64, settings: PaymentSettings) -> Self {
        Self::build(seats, price, settings, Arc::new(NoRepricing)).await
    }

    pub async fn with_policy(seats: i32, price: i64, policy: Arc<dyn RepricingPolicy>) -> Self {
        Self::build(seats, price, PaymentSettings::default(), policy).await
    }

    async fn build(seats: i32, price: i64, settings: PaymentSettings, policy: Arc<dyn RepricingPolicy>) -> Self {
        let trips = Arc::new(MemoryTripRepository::new());
        let bookings = Arc::new(MemoryBookingRepository::new());
        let provider = Arc::new(MockPaymentProvider::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let inventory = Arc::new(SeatInventory::new(trips.clone()));
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            provider.clone(),
            bookings.clone(),
            inventory.clone(),
            publisher.clone(),
            settings,
        ));
        let saga = Arc::new(CancellationSaga::new(
            bookings.clone(),
            inventory.clone(),
            orchestrator.clone(),
            publisher.clone(),
        ));
        let repricing = Arc::new(RepricingService::new(
            trips.clone(),
            bookings.clone(),
            policy,
            orchestrator.clone(),
            publisher.clone(),
        ));
        let service = BookingService::new(
            trips.clone(),
            bookings.clone(),
            inventory.clone(),
            orchestrator.clone(),
            saga.clone(),
            repricing,
            publisher.clone(),
        );
        let trip_manager = TripManager::new(trips.clone(), bookings.clone(), saga.clone(), publisher.clone());

        let mut trip = draft_trip(Uuid::new_v4(), seats);
        trip.price_per_seat_cents = price;
        trip.base_price_per_seat_cents = price;
        trip.status = TripStatus::Published;
        trips.insert_trip(&trip).await.unwrap();

        Self {
            trips,
            bookings,
            provider,
            publisher,
            inventory,
            orchestrator,
            saga,
            service,
            trip_manager,
            trip_id: trip.id,
        }
    }

    pub async fn trip(&self) -> Trip {
        self.trips.get_trip(self.trip_id).await.unwrap().unwrap()
    }

    pub async fn available(&self) -> i32 {
        self.trip().await.seats_available
    }

    pub async fn booking(&self, id: Uuid) -> Booking {
        self.bookings.get_booking(id).await.unwrap().unwrap()
    }

    pub async fn reserve(&self, seats: i32) -> Booking {
        self.service.reserve(self.trip_id, Uuid::new_v4(), seats).await.unwrap()
    }

    /// Reserved, approved and captured.
    pub async fn paid(&self, seats: i32) -> Booking {
        let booking = self.reserve(seats).await;
        self.service.start_payment(booking.id).await.unwrap();
        self.service.authorize(booking.id).await.unwrap();
        self.service.capture(booking.id).await.unwrap()
    }
}
