use ridepool_catalog::{Gazetteer, PricingEngine, RouteResolver, SeatInventory};
use ridepool_core::clock::Clock;
use ridepool_core::events::EventPublisher;
use ridepool_core::memory::{MemoryBookingRepository, MemoryTripRepository, MemoryUserRepository};
use ridepool_core::payment::PaymentProvider;
use ridepool_core::repository::{BookingRepository, TripRepository, UserRepository};
use ridepool_core::routing::RoutingClient;
use ridepool_order::{
    BookingService, CancellationSaga, PaymentOrchestrator, RepricingService, StaleBookingReaper, TripManager,
};
use ridepool_store::{Config, DbClient, RedisSessionStore};
use ridepool_wizard::{MemorySessionStore, SessionReaper, SessionStore, Wizard};
use std::sync::Arc;
use std::time::Duration;

/// Storage and outbound adapters the services are built on.
pub struct Backends {
    pub trips: Arc<dyn TripRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionStore>,
    pub publisher: Arc<dyn EventPublisher>,
    pub payments: Arc<dyn PaymentProvider>,
    pub routing: Arc<dyn RoutingClient>,
    pub clock: Arc<dyn Clock>,
}

impl Backends {
    /// Process-local repositories and session store.
    pub fn in_memory(
        config: &Config,
        publisher: Arc<dyn EventPublisher>,
        payments: Arc<dyn PaymentProvider>,
        routing: Arc<dyn RoutingClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            trips: Arc::new(MemoryTripRepository::new()),
            bookings: Arc::new(MemoryBookingRepository::new()),
            users: Arc::new(MemoryUserRepository::new()),
            sessions: Arc::new(MemorySessionStore::new(clock.clone(), config.wizard.session_ttl())),
            publisher,
            payments,
            routing,
            clock,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub wizard: Arc<Wizard>,
    pub bookings: Arc<BookingService>,
    pub trips: Arc<TripManager>,
    pub resolver: Arc<RouteResolver>,
    pub users: Arc<dyn UserRepository>,
    pub session_reaper: Arc<SessionReaper>,
    pub booking_reaper: Arc<StaleBookingReaper>,
    pub db: Option<Arc<DbClient>>,
    pub redis: Option<Arc<RedisSessionStore>>,
}

impl AppState {
    pub fn new(backends: Backends, config: &Config) -> Self {
        let Backends {
            trips,
            bookings,
            users,
            sessions,
            publisher,
            payments,
            routing,
            clock,
        } = backends;

        let inventory = Arc::new(SeatInventory::new(trips.clone()));
        let settings = config.payments.settings();
        let confirmation_timeout = Duration::from_secs(settings.confirmation_timeout_seconds);
        let orchestrator = Arc::new(PaymentOrchestrator::new(
            payments,
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
            config.repricing.policy(config.pricing.rounding_step_cents),
            orchestrator.clone(),
            publisher.clone(),
        ));
        let booking_service = Arc::new(BookingService::new(
            trips.clone(),
            bookings.clone(),
            inventory,
            orchestrator,
            saga.clone(),
            repricing,
            publisher.clone(),
        ));
        let trip_manager = Arc::new(TripManager::new(trips, bookings.clone(), saga.clone(), publisher));
        let resolver = Arc::new(RouteResolver::new(
            Arc::new(Gazetteer::swiss_default()),
            routing,
            PricingEngine::new(config.pricing.clone()),
            config.routing.resolver(),
        ));
        let wizard = Arc::new(Wizard::new(
            sessions.clone(),
            users.clone(),
            resolver.clone(),
            trip_manager.clone(),
            booking_service.clone(),
            clock.clone(),
            config.wizard.clone(),
        ));

        Self {
            wizard,
            bookings: booking_service,
            trips: trip_manager,
            resolver,
            users,
            session_reaper: Arc::new(SessionReaper::new(sessions, clock.clone(), config.wizard.session_ttl())),
            booking_reaper: Arc::new(StaleBookingReaper::new(bookings, saga, clock, confirmation_timeout)),
            db: None,
            redis: None,
        }
    }

    pub fn with_db(mut self, db: Arc<DbClient>) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_redis(mut self, redis: Arc<RedisSessionStore>) -> Self {
        self.redis = Some(redis);
        self
    }
}
