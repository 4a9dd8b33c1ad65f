//! Timeout ticker
//!
//! The dispatch core never reads the clock on its own. This task is the
//! caller-started timer that feeds it wall-clock ticks.

use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::handle::CoordinatorHandle;

/// Send `tick(Utc::now())` every `interval` until the coordinator goes away
pub fn spawn_ticker(handle: CoordinatorHandle, interval: Duration) -> JoinHandle<()> {
    debug!(?interval, "spawn_ticker: called");
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            match handle.tick(Utc::now()).await {
                Ok(timed_out) => {
                    for session_id in timed_out {
                        warn!(%session_id, "Session timed out");
                    }
                }
                Err(_) => {
                    info!("Coordinator gone, ticker stopping");
                    break;
                }
            }
        }
    })
}
