//! Background sweep of expired and consumed pending auth sessions.
//!
//! Expiry is also checked on read; the sweep just keeps the tables from
//! accumulating dead rows.

use std::time::Duration;

use cask_db::queries::sessions;
use cask_types::now_unix;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::Db;

/// How often the sweep runs.
pub const SWEEP_INTERVAL_SECS: u64 = 60;

/// Run the sweep until shutdown is signalled.
pub async fn run(db: Db, mut shutdown_rx: broadcast::Receiver<()>) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let conn = db.lock().await;
                match sessions::sweep_expired(&conn, now_unix()) {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Swept stale pending sessions"),
                    Err(e) => error!("Pending session sweep failed: {e}"),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Pending session sweep stopping");
                return;
            }
        }
    }
}
