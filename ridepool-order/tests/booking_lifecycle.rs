use chrono::NaiveDate;
use ridepool_catalog::{NoRepricing, RepricingPolicy, SeatInventory, SplitCostPolicy};
use ridepool_core::events::RecordingPublisher;
use ridepool_core::memory::{MemoryBookingRepository, MemoryTripRepository};
use ridepool_core::repository::TripRepository;
use ridepool_core::CoreError;
use ridepool_order::mock_provider::MockPaymentProvider;
use ridepool_order::{BookingService, CancellationSaga, PaymentOrchestrator, PaymentSettings, RepricingService};
use ridepool_shared::{BookingStatus, Departure, PaymentStatus, Trip, TripKind, TripStatus, Waypoint};
use std::sync::Arc;
use uuid::Uuid;

struct Harness {
    trips: Arc<MemoryTripRepository>,
    provider: Arc<MockPaymentProvider>,
    publisher: Arc<RecordingPublisher>,
    service: BookingService,
}

fn harness() -> Harness {
    harness_with(Arc::new(NoRepricing))
}

fn harness_with(policy: Arc<dyn RepricingPolicy>) -> Harness {
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
        PaymentSettings::default(),
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
        bookings,
        inventory,
        orchestrator,
        saga,
        repricing,
        publisher.clone(),
    );
    Harness {
        trips,
        provider,
        publisher,
        service,
    }
}

async fn publish_trip(trips: &MemoryTripRepository, seats: i32, price: i64) -> Uuid {
    let bern = Waypoint {
        name: "Bern".into(),
        zip: "3011".into(),
        canton: "BE".into(),
        lat: 46.9480,
        lon: 7.4474,
    };
    let thun = Waypoint {
        name: "Thun".into(),
        zip: "3600".into(),
        canton: "BE".into(),
        lat: 46.7581,
        lon: 7.6283,
    };
    let at = NaiveDate::from_ymd_opt(2031, 9, 12).unwrap().and_hms_opt(17, 45, 0).unwrap();
    let mut trip = Trip::new(TripKind::DriverOffer, Uuid::new_v4(), bern, thun, Departure::exact(at), seats, price, "CHF");
    trip.status = TripStatus::Published;
    trips.insert_trip(&trip).await.unwrap();
    trip.id
}

async fn available(trips: &MemoryTripRepository, trip_id: Uuid) -> i32 {
    trips.get_trip(trip_id).await.unwrap().unwrap().seats_available
}

#[tokio::test]
async fn test_three_seat_trip_scenario() {
    // the shipped default policy: a lone passenger pays the solo price
    let h = harness_with(Arc::new(SplitCostPolicy::default()));
    let trip_id = publish_trip(&h.trips, 3, 2000).await;

    // A takes two seats and pays
    let a = h.service.reserve(trip_id, Uuid::new_v4(), 2).await.unwrap();
    assert_eq!(a.amount_due_cents, 4000);
    h.service.start_payment(a.id).await.unwrap();
    h.service.authorize(a.id).await.unwrap();
    let a = h.service.capture(a.id).await.unwrap();
    assert_eq!(a.payment_status, PaymentStatus::Captured);
    assert_eq!(a.booking_status, BookingStatus::Confirmed);

    // B wants two, only one is left
    let b_passenger = Uuid::new_v4();
    let err = h.service.reserve(trip_id, b_passenger, 2).await.unwrap_err();
    assert!(matches!(err, CoreError::InsufficientSeats { requested: 2, available: 1 }));
    assert_eq!(available(&h.trips, trip_id).await, 1);

    let b = h.service.reserve(trip_id, b_passenger, 1).await.unwrap();
    assert_eq!(available(&h.trips, trip_id).await, 0);
    assert_eq!(h.service.get_booking(a.id).await.unwrap().refunded_cents, 0);

    // A cancels: two seats come back, 40.00 refunded; B still holds one
    let outcome = h.service.cancel(a.id, a.passenger_id).await.unwrap();
    assert_eq!(outcome.refunded_cents, 4000);
    assert_eq!(outcome.booking.payment_status, PaymentStatus::Refunded);
    assert_eq!(available(&h.trips, trip_id).await, 2);

    h.service.cancel(b.id, b_passenger).await.unwrap();
    assert_eq!(available(&h.trips, trip_id).await, 3);

    let topics = h.publisher.topics();
    assert!(topics.contains(&"booking.reserved"));
    assert!(topics.contains(&"booking.confirmed"));
    assert!(topics.contains(&"booking.cancelled"));
    assert!(topics.contains(&"payment.refunded"));
}

#[tokio::test]
async fn test_concurrent_bookings_fill_exactly() {
    let h = Arc::new(harness());
    let trip_id = publish_trip(&h.trips, 4, 1200).await;

    let mut handles = Vec::new();
    for _ in 0..10 {
        let h = h.clone();
        handles.push(tokio::spawn(async move {
            h.service.reserve(trip_id, Uuid::new_v4(), 1).await
        }));
    }
    let mut ok = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            ok += 1;
        }
    }
    assert_eq!(ok, 4);
    assert_eq!(available(&h.trips, trip_id).await, 0);
    assert_eq!(h.provider.calls().len(), 0);
}

#[tokio::test]
async fn test_split_price_settles_booking_paid_after_reprice() {
    let h = harness_with(Arc::new(SplitCostPolicy::default()));
    let trip_id = publish_trip(&h.trips, 4, 2000).await;

    let pay = |id: Uuid| {
        let service = &h.service;
        async move {
            service.start_payment(id).await.unwrap();
            service.authorize(id).await.unwrap();
            service.capture(id).await.unwrap()
        }
    };

    let a = h.service.reserve(trip_id, Uuid::new_v4(), 1).await.unwrap();
    pay(a.id).await;

    // B's order is created at 20.00, then C confirms and the price halves
    let b = h.service.reserve(trip_id, Uuid::new_v4(), 1).await.unwrap();
    h.service.start_payment(b.id).await.unwrap();
    h.service.authorize(b.id).await.unwrap();
    let c = h.service.reserve(trip_id, Uuid::new_v4(), 1).await.unwrap();
    pay(c.id).await;
    assert_eq!(h.service.get_booking(b.id).await.unwrap().amount_due_cents, 1000);

    let b = h.service.capture(b.id).await.unwrap();
    assert_eq!(b.captured_cents, 2000);

    for id in [a.id, b.id, c.id] {
        let booking = h.service.get_booking(id).await.unwrap();
        assert_eq!(booking.amount_due_cents, 670);
        assert_eq!(booking.captured_cents - booking.refunded_cents, 670);
    }
}
