//! Liveness bookkeeping: the periodic idle-room sweep.
//!
//! Per-participant `last_seen` refreshes and the ping/pong probe live on the
//! hub's message path; this module owns the independent timer that reclaims
//! abandoned rooms. Rooms with participants are never reclaimed, however
//! idle.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::hub::Hub;

/// Run the reclamation sweep forever. Spawned from `main`.
pub async fn run_idle_sweep(hub: Arc<Hub>, sweep_every: Duration, max_idle: Duration) {
    let mut ticker = tokio::time::interval(sweep_every);
    // The first tick fires immediately; skip it so a freshly started server
    // doesn't sweep before anything happened.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let reaped = hub.registry().reap_idle(max_idle);
        if reaped > 0 {
            info!(
                "reclaimed {reaped} idle room(s), {} remaining",
                hub.registry().room_count()
            );
        }
    }
}
