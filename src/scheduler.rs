// =============================================================================
// Scheduler - fixed 200 ms trigger for the evaluation cycle
// =============================================================================
//
// The tick runs regardless of the configured interval; `AppState::run_cycle`
// decides whether the instant falls in the pre-boundary window. While the
// engine is stopped the loop idles and the live plan is left as is.
// =============================================================================

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info};

use crate::app_state::AppState;
use crate::types::now_ms;

pub const TICK_MS: u64 = 200;

/// Drive `state` until `shutdown` flips to true or its sender is dropped.
pub async fn run_scheduler(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_millis(TICK_MS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    info!(tick_ms = TICK_MS, "scheduler running");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !state.is_running() {
                    continue;
                }
                let report = state.run_cycle(now_ms());
                if let Some(d) = &report.decision {
                    debug!(decision = %d.id, reason = %d.reason, "cycle evaluated");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("scheduler stopped");
}
