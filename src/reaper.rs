use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::limits::REAPER_INTERVAL;

/// One sweep: persist `completed` for elapsed bookings and drop creation
/// sessions past their retention window.
pub async fn sweep(engine: &Engine, now: DateTime<Utc>) {
    match engine.complete_elapsed_bookings(now).await {
        Ok(0) => {}
        Ok(n) => info!("reaper marked {n} bookings completed"),
        Err(e) => warn!("reaper could not complete bookings: {e}"),
    }
    match engine.purge_stale_sessions(now).await {
        Ok(0) => {}
        Ok(n) => info!("reaper purged {n} stale creation sessions"),
        Err(e) => debug!("reaper skip session purge: {e}"),
    }
}

/// Background task that periodically runs `sweep`.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(REAPER_INTERVAL);
    loop {
        interval.tick().await;
        sweep(&engine, Utc::now()).await;
    }
}
