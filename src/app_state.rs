// =============================================================================
// Central Application State
// =============================================================================
//
// Ties the decision engine, the live entry plan, the runtime configuration
// and the event bus together, and provides the status snapshot served by the
// REST API and WebSocket feed.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking and the running flag.
//   - parking_lot::RwLock for mutable shared collections.
//   - The engine's stores manage their own interior mutability.
// =============================================================================

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{info, warn};

use crate::decision_envelope::Decision;
use crate::entry_plan::{EntryPlan, PlanSlot, PlanTransition, ProposeOutcome};
use crate::error::{EngineError, EngineResult};
use crate::events::{events_for_cycle, EngineEvent, EventBus};
use crate::risk::GuardStatus;
use crate::runtime_config::{ConfigUpdate, DecisionConfig, RuntimeConfig};
use crate::storage::KvStore;
use crate::strategy::{in_evaluation_window, DecisionEngine, OutcomeReport};
use crate::types::{format_countdown, next_boundary_ms};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the status error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;
/// Maximum number of recent decisions to retain.
const MAX_RECENT_DECISIONS: usize = 100;

/// What a single scheduler tick did.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub transitions: Vec<PlanTransition>,
    pub decision: Option<Decision>,
    pub scheduled: Option<EntryPlan>,
}

// =============================================================================
// AppState
// =============================================================================

pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every meaningful state mutation. The WebSocket feed
    /// uses this to detect changes and push updates.
    pub state_version: AtomicU64,

    /// WebSocket message sequence number (incremented per message sent).
    pub ws_sequence_number: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    config_path: Option<PathBuf>,

    // ── Engine ──────────────────────────────────────────────────────────
    pub engine: Arc<DecisionEngine>,
    pub plan: RwLock<PlanSlot>,
    pub running: AtomicBool,

    // ── Outbound ────────────────────────────────────────────────────────
    pub events: EventBus,

    // ── Audit ───────────────────────────────────────────────────────────
    pub recent_decisions: RwLock<Vec<Decision>>,
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Auth ────────────────────────────────────────────────────────────
    admin_token: Option<String>,

    /// Instant when the engine was started. Used for uptime calculations.
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(config: RuntimeConfig, store: Arc<dyn KvStore>, admin_token: Option<String>) -> Self {
        let running = config.autostart;
        Self {
            state_version: AtomicU64::new(1),
            ws_sequence_number: AtomicU64::new(0),

            runtime_config: Arc::new(RwLock::new(config)),
            config_path: None,

            engine: Arc::new(DecisionEngine::open(store)),
            plan: RwLock::new(PlanSlot::new()),
            running: AtomicBool::new(running),

            events: EventBus::new(),

            recent_decisions: RwLock::new(Vec::new()),
            recent_errors: RwLock::new(Vec::new()),

            admin_token: admin_token.filter(|t| !t.is_empty()),
            start_time: std::time::Instant::now(),
        }
    }

    /// Persist accepted config updates to `path`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref()
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }

        self.increment_version();
    }

    // ── Decision Audit ──────────────────────────────────────────────────

    pub fn push_decision(&self, decision: Decision) {
        let mut decisions = self.recent_decisions.write();
        decisions.push(decision);
        while decisions.len() > MAX_RECENT_DECISIONS {
            decisions.remove(0);
        }

        self.increment_version();
    }

    pub fn last_decision(&self) -> Option<Decision> {
        self.recent_decisions.read().last().cloned()
    }

    // ── Configuration ───────────────────────────────────────────────────

    pub fn decision_config(&self) -> DecisionConfig {
        self.runtime_config.read().decision_config()
    }

    /// Apply a partial update. The new values take effect from the next
    /// evaluation; saving to disk is best effort.
    pub fn update_config(&self, update: ConfigUpdate) -> EngineResult<Vec<String>> {
        let changes = self.runtime_config.write().apply(update)?;
        if changes.is_empty() {
            return Ok(changes);
        }
        info!(?changes, "runtime config updated");
        if let Some(path) = &self.config_path {
            if let Err(e) = self.runtime_config.read().save(path) {
                warn!(error = %e, "failed to save runtime config");
                self.push_error(format!("config save failed: {e}"));
            }
        }
        self.increment_version();
        Ok(changes)
    }

    // ── Control ─────────────────────────────────────────────────────────

    /// Returns false if already running.
    pub fn start(&self) -> bool {
        let started = !self.running.swap(true, Ordering::SeqCst);
        if started {
            info!("evaluation loop started");
            self.increment_version();
        }
        started
    }

    /// Halts evaluation. A live entry plan is kept.
    pub fn stop(&self) -> bool {
        let stopped = self.running.swap(false, Ordering::SeqCst);
        if stopped {
            info!("evaluation loop stopped");
            self.increment_version();
        }
        stopped
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ── Inputs ──────────────────────────────────────────────────────────

    /// Record a price for `instrument`, or the configured one when absent.
    pub fn add_observation(&self, instrument: Option<&str>, price: f64, now_ms: i64) -> EngineResult<usize> {
        let instrument = match instrument.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_uppercase(),
            None => self.runtime_config.read().instrument.clone(),
        };
        let count = self.engine.ticks().add_observation(&instrument, price, now_ms)?;
        self.increment_version();
        Ok(count)
    }

    /// Attach an outcome to the live entry plan.
    pub fn report_outcome(&self, win: bool, now_ms: i64) -> EngineResult<OutcomeReport> {
        let plan = self
            .plan
            .read()
            .current()
            .cloned()
            .ok_or(EngineError::NoPendingPlan)?;
        let guard_mode = self.runtime_config.read().guard_mode;

        let result = self.engine.report_outcome(&plan, win, guard_mode, now_ms);
        self.increment_version();
        match result {
            Ok(report) => {
                self.events.publish(EngineEvent::LearningUpdated {
                    win,
                    guard_status: report.guard_text.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                self.push_error(format!("outcome not persisted: {e}"));
                Err(e)
            }
        }
    }

    pub fn reset_learning(&self) -> EngineResult<()> {
        let result = self.engine.reset_learning();
        self.increment_version();
        match result {
            Ok(()) => {
                self.events.publish(EngineEvent::LearningReset);
                Ok(())
            }
            Err(e) => {
                self.push_error(format!("reset incomplete: {e}"));
                Err(e)
            }
        }
    }

    // ── Cycle ───────────────────────────────────────────────────────────

    /// One scheduler tick: advance the live plan, and evaluate if `now_ms`
    /// falls in the pre-boundary window.
    pub fn run_cycle(&self, now_ms: i64) -> CycleReport {
        let cfg = self.decision_config();
        let mut report = CycleReport {
            transitions: self.plan.write().advance(now_ms),
            ..Default::default()
        };

        let ms_left = next_boundary_ms(now_ms, cfg.interval_secs) - now_ms;
        if in_evaluation_window(ms_left) {
            let (decision, candidate) = self.engine.evaluate(&cfg, now_ms);
            if let Some(candidate) = candidate {
                if let ProposeOutcome::Scheduled(plan) = self.plan.write().propose(candidate, now_ms) {
                    report.scheduled = Some(plan);
                }
            }
            self.push_decision(decision.clone());
            report.decision = Some(decision);
        }

        let events = events_for_cycle(
            &report.transitions,
            report.decision.as_ref(),
            report.scheduled.as_ref(),
            now_ms,
        );
        if !report.transitions.is_empty() {
            self.increment_version();
        }
        self.events.publish_all(events);
        report
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn build_snapshot(&self, now_ms: i64) -> StateSnapshot {
        let config = self.runtime_config.read().clone();
        let running = self.is_running();
        let ms_left = next_boundary_ms(now_ms, config.interval_secs) - now_ms;

        let plan = self.plan.read().current().cloned().map(|p| PlanSnapshot {
            secs_until_entry: p.secs_until_entry(now_ms),
            due: p.is_due(now_ms),
            plan: p,
        });

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: now_ms,
            uptime_secs: self.start_time.elapsed().as_secs(),
            running,
            countdown: if running {
                format_countdown(ms_left)
            } else {
                "--".to_string()
            },
            observation_count: self.engine.ticks().count(&config.instrument),
            guard: self.engine.guard().status(now_ms),
            guard_text: self.engine.guard().status_text(now_ms),
            learned_cells: self.engine.learner().cells(),
            plan,
            last_decision: self.last_decision(),
            recent_errors: self.recent_errors.read().clone(),
            config,
        }
    }
}

// =============================================================================
// Snapshot types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PlanSnapshot {
    #[serde(flatten)]
    pub plan: EntryPlan,
    pub secs_until_entry: i64,
    pub due: bool,
}

/// Full engine state for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub running: bool,
    /// `MM:SS` to the next interval boundary, `--` when stopped.
    pub countdown: String,
    pub observation_count: usize,
    pub guard: GuardStatus,
    pub guard_text: String,
    pub learned_cells: usize,
    pub config: RuntimeConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<PlanSnapshot>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_decision: Option<Decision>,

    pub recent_errors: Vec<ErrorRecord>,
}
