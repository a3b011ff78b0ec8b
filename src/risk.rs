// =============================================================================
// Performance Guard - circuit breaker on the recent outcome window
// =============================================================================
//
// Keeps the last 10 resolved outcomes across every instrument, interval and
// direction. Once the window is full and its win rate falls below 65 %, the
// breaker trips and recommendations halt for 30 minutes. The halt clears by
// itself; a further bad outcome while halted extends it.
// =============================================================================

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::storage::{keys, load_or_default, save_json, KvStore};
use crate::types::Outcome;

pub const GUARD_WINDOW: usize = 10;
pub const MIN_WIN_RATE: f64 = 0.65;
pub const COOLDOWN_MS: i64 = 30 * 60 * 1000;

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct GuardState {
    #[serde(default)]
    recent: VecDeque<Outcome>,
    #[serde(default)]
    stop_until: i64,
}

impl GuardState {
    fn wins(&self) -> usize {
        self.recent.iter().filter(|o| o.is_win()).count()
    }

    fn win_rate(&self) -> Option<f64> {
        (!self.recent.is_empty()).then(|| self.wins() as f64 / self.recent.len() as f64)
    }
}

/// Serialisable snapshot for status displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuardStatus {
    pub wins: usize,
    pub total: usize,
    pub win_rate_pct: u32,
    pub stopped: bool,
    pub stop_until: i64,
}

// ---------------------------------------------------------------------------
// Guard
// ---------------------------------------------------------------------------

pub struct PerformanceGuard {
    store: Arc<dyn KvStore>,
    state: RwLock<GuardState>,
}

impl PerformanceGuard {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let state: GuardState = load_or_default(store.as_ref(), keys::GUARD);
        Self {
            store,
            state: RwLock::new(state),
        }
    }

    /// Append an outcome to the window and trip the breaker if the full
    /// window has fallen below the minimum win rate.
    pub fn record_outcome(&self, win: bool, now_ms: i64) -> EngineResult<GuardStatus> {
        let mut s = self.state.write();
        s.recent.push_back(Outcome::from_win(win));
        while s.recent.len() > GUARD_WINDOW {
            s.recent.pop_front();
        }

        let rate = s.win_rate().unwrap_or(1.0);
        if s.recent.len() >= GUARD_WINDOW && rate < MIN_WIN_RATE {
            s.stop_until = now_ms + COOLDOWN_MS;
            warn!(
                win_rate = format!("{:.0}%", rate * 100.0),
                window = s.recent.len(),
                stop_until = s.stop_until,
                "performance guard tripped - halting recommendations"
            );
        }

        save_json(self.store.as_ref(), keys::GUARD, &*s)?;
        debug!(win, wins = s.wins(), total = s.recent.len(), "guard outcome recorded");
        Ok(Self::status_of(&s, now_ms))
    }

    pub fn is_stopped(&self, now_ms: i64) -> bool {
        now_ms < self.state.read().stop_until
    }

    pub fn status(&self, now_ms: i64) -> GuardStatus {
        Self::status_of(&self.state.read(), now_ms)
    }

    /// Human-readable window summary, e.g. `last 10: win rate 60% (halted)`.
    pub fn status_text(&self, now_ms: i64) -> String {
        let st = self.status(now_ms);
        let base = format!("last {}: win rate {}%", st.total, st.win_rate_pct);
        if st.stopped {
            format!("{base} (halted)")
        } else {
            base
        }
    }

    pub fn reset(&self) -> EngineResult<()> {
        *self.state.write() = GuardState::default();
        self.store.remove(keys::GUARD)?;
        Ok(())
    }

    fn status_of(s: &GuardState, now_ms: i64) -> GuardStatus {
        GuardStatus {
            wins: s.wins(),
            total: s.recent.len(),
            win_rate_pct: s.win_rate().map_or(0, |r| (r * 100.0).round() as u32),
            stopped: now_ms < s.stop_until,
            stop_until: s.stop_until,
        }
    }
}

impl std::fmt::Debug for PerformanceGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.read();
        f.debug_struct("PerformanceGuard")
            .field("window", &s.recent.len())
            .field("stop_until", &s.stop_until)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    const T0: i64 = 1_700_000_000_000;

    fn guard() -> PerformanceGuard {
        PerformanceGuard::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn never_trips_below_full_window() {
        let g = guard();
        for _ in 0..9 {
            g.record_outcome(false, T0).unwrap();
        }
        assert!(!g.is_stopped(T0));
        assert_eq!(g.status(T0).total, 9);
    }

    #[test]
    fn sixty_percent_trips_for_thirty_minutes() {
        let g = guard();
        for win in [true, false, true, true, false, true, false, true, false, true] {
            g.record_outcome(win, T0).unwrap();
        }
        assert!(g.is_stopped(T0));
        assert!(g.is_stopped(T0 + COOLDOWN_MS - 1));
        assert!(!g.is_stopped(T0 + COOLDOWN_MS));
    }

    #[test]
    fn seventy_percent_does_not_trip() {
        let g = guard();
        for i in 0..10 {
            g.record_outcome(i < 7, T0).unwrap();
        }
        assert!(!g.is_stopped(T0));
    }

    #[test]
    fn window_is_bounded_to_last_ten() {
        let g = guard();
        for _ in 0..5 {
            g.record_outcome(false, T0).unwrap();
        }
        // Five early losses roll out of the window.
        let mut last = None;
        for _ in 0..10 {
            last = Some(g.record_outcome(true, T0).unwrap());
        }
        let st = last.unwrap();
        assert_eq!(st.total, 10);
        assert_eq!(st.wins, 10);
    }

    #[test]
    fn status_text_reports_halt() {
        let g = guard();
        assert_eq!(g.status_text(T0), "last 0: win rate 0%");
        for i in 0..10 {
            g.record_outcome(i < 6, T0).unwrap();
        }
        assert_eq!(g.status_text(T0), "last 10: win rate 60% (halted)");
        assert_eq!(g.status_text(T0 + COOLDOWN_MS), "last 10: win rate 60%");
    }

    #[test]
    fn survives_restart_and_resets() {
        let mem = Arc::new(MemoryStore::new());
        let g = PerformanceGuard::new(mem.clone());
        for _ in 0..10 {
            g.record_outcome(false, T0).unwrap();
        }
        let reopened = PerformanceGuard::new(mem.clone());
        assert!(reopened.is_stopped(T0 + 1));
        reopened.reset().unwrap();
        assert!(!reopened.is_stopped(T0 + 1));
        assert!(!PerformanceGuard::new(mem).is_stopped(T0 + 1));
    }
}
