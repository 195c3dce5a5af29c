use ridepool_order::StaleBookingReaper;
use ridepool_wizard::SessionReaper;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};

/// Periodically drops wizard sessions idle past their TTL.
pub async fn start_session_reaper(reaper: Arc<SessionReaper>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Session reaper started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        match reaper.sweep().await {
            Ok(0) => {}
            Ok(purged) => info!("Purged {} idle wizard sessions", purged),
            Err(e) => error!("Session sweep failed: {}", e),
        }
    }
}

/// Periodically cancels bookings whose payment never completed, releasing
/// their seats.
pub async fn start_booking_reaper(reaper: Arc<StaleBookingReaper>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Stale booking reaper started, sweeping every {:?}", every);

    loop {
        ticker.tick().await;
        match reaper.sweep().await {
            Ok(report) => {
                if report.expired > 0 || report.refunded > 0 {
                    info!(
                        "Expired {} stale bookings ({} refunded)",
                        report.expired, report.refunded
                    );
                }
                if report.errors > 0 {
                    warn!("{} stale bookings could not be expired this round", report.errors);
                }
            }
            Err(e) => error!("Booking sweep failed: {}", e),
        }
    }
}
