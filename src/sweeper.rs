use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use crate::api::{DynAPI, SweepAPI};

/// Runs the stale ride request sweep every `period` until the runtime shuts down.
pub fn spawn(api: DynAPI, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            if let Err(err) = api.sweep_stale_tags().await {
                tracing::warn!("stale sweep failed: {}", err);
            }
        }
    })
}
