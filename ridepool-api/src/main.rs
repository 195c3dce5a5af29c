use anyhow::Context;
use ridepool_api::{app, worker, AppState, Backends};
use ridepool_core::clock::SystemClock;
use ridepool_core::payment::PaymentProvider;
use ridepool_core::routing::RoutingClient;
use ridepool_store::{
    run_mode, Config, DbClient, KafkaEventPublisher, OfflineRouting, OpenRouteServiceClient, PayPalProvider,
    PaymentBackend, PgBookingRepository, PgTripRepository, PgUserRepository, RedisSessionStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ridepool_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    let run_mode = run_mode();
    let payment_backend = config.payments.backend(&run_mode).context("Refusing to start")?;
    tracing::info!("Starting Ridepool API on port {} ({})", config.server.port, run_mode);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let db = Arc::new(db);

    // Redis session store
    let redis = Arc::new(
        RedisSessionStore::new(&config.redis.url, config.wizard.session_ttl_seconds)
            .context("Failed to connect to Redis")?,
    );

    // Kafka
    let publisher = Arc::new(KafkaEventPublisher::new(&config.kafka.brokers).context("Failed to create Kafka producer")?);

    let routing: Arc<dyn RoutingClient> = match &config.routing.api_key {
        Some(key) => Arc::new(
            OpenRouteServiceClient::new(
                config.routing.base_url.clone(),
                config.routing.profile.clone(),
                key.clone(),
                Duration::from_millis(config.routing.timeout_ms),
            )
            .context("Failed to build routing client")?,
        ),
        None => {
            tracing::warn!("No routing API key configured, distances use the great-circle estimate");
            Arc::new(OfflineRouting)
        }
    };

    let payments: Arc<dyn PaymentProvider> = match payment_backend {
        PaymentBackend::Provider => Arc::new(
            PayPalProvider::new(
                config.payments.base_url.clone(),
                config.payments.client_id.clone(),
                config.payments.client_secret.clone(),
                Duration::from_millis(config.payments.call_timeout_ms),
            )
            .context("Failed to build payment client")?,
        ),
        PaymentBackend::InProcess => in_process_payments()?,
    };

    let backends = Backends {
        trips: Arc::new(PgTripRepository::new(db.pool.clone())),
        bookings: Arc::new(PgBookingRepository::new(db.pool.clone())),
        users: Arc::new(PgUserRepository::new(db.pool.clone())),
        sessions: redis.clone(),
        publisher,
        payments,
        routing,
        clock: Arc::new(SystemClock),
    };
    let state = AppState::new(backends, &config).with_db(db).with_redis(redis);

    let every = Duration::from_secs(config.wizard.reaper_interval_seconds.max(1));
    tokio::spawn(worker::start_session_reaper(state.session_reaper.clone(), every));
    tokio::spawn(worker::start_booking_reaper(state.booking_reaper.clone(), every));

    let app = app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await.context("Failed to bind listener")?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

#[cfg(feature = "dev-payments")]
fn in_process_payments() -> anyhow::Result<Arc<dyn PaymentProvider>> {
    tracing::warn!("No payment credentials configured, using the in-process provider: no money moves");
    Ok(Arc::new(ridepool_order::mock_provider::MockPaymentProvider::new()))
}

#[cfg(not(feature = "dev-payments"))]
fn in_process_payments() -> anyhow::Result<Arc<dyn PaymentProvider>> {
    anyhow::bail!("no payment credentials configured and this build has no in-process provider (feature dev-payments)")
}
