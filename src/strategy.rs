// =============================================================================
// Decision Engine - one evaluation per interval, just before the boundary
// =============================================================================
//
// Pipeline:
//   1. Guard halted (and guard mode on)   → abstain, nothing else is read
//   2. Bucket key for the current instant
//   3. Smoothed win probability for HIGH and LOW; HIGH wins ties
//   4. Bucket sample count below the class/interval minimum → abstain
//   5. Smoothed probability below 80 %                      → abstain
//   6. Confluence mode on: score < threshold                → abstain
//   7. Otherwise recommend the selected direction
//   8. Recommendation → entry candidate at boundary - learned lead
//
// The engine only decides. Whether a candidate becomes the live plan, and
// which events go out, is the caller's concern.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::decision_envelope::{AbstainReason, Decision, NEUTRAL_CONFIDENCE, SHORTFALL_CONFIDENCE_CAP};
use crate::entry_plan::EntryPlan;
use crate::error::{EngineError, EngineResult};
use crate::instrument::{min_candles, min_samples, InstrumentClass};
use crate::learning::{BucketKey, LeadTimeOptimizer, WinEstimate, WinProbabilityLearner, WinRecord};
use crate::market_data::TickStore;
use crate::risk::{GuardStatus, PerformanceGuard};
use crate::runtime_config::DecisionConfig;
use crate::signals::score_confluence;
use crate::storage::KvStore;
use crate::types::{next_boundary_ms, Direction};

pub const PROBABILITY_THRESHOLD: f64 = 0.80;

/// Evaluation fires once the boundary is this close...
pub const PRE_SIGNAL_MS: i64 = 3_250;
/// ...and stays open for this long, a little over one scheduler tick. The
/// band closes above 3 s so the longest lead still lands in the future.
pub const EVALUATION_WINDOW_MS: i64 = 250;

/// True when `ms_left` to the next boundary falls inside the evaluation band.
pub fn in_evaluation_window(ms_left: i64) -> bool {
    ms_left <= PRE_SIGNAL_MS && ms_left > PRE_SIGNAL_MS - EVALUATION_WINDOW_MS
}

/// Everything a recorded outcome touched.
#[derive(Debug, Clone, Serialize)]
pub struct OutcomeReport {
    pub win: bool,
    pub stats: WinEstimate,
    pub lead: WinRecord,
    pub guard: GuardStatus,
    pub guard_text: String,
}

// =============================================================================
// Decision Engine
// =============================================================================

pub struct DecisionEngine {
    ticks: Arc<TickStore>,
    learner: Arc<WinProbabilityLearner>,
    guard: Arc<PerformanceGuard>,
    leads: Arc<LeadTimeOptimizer>,
}

impl DecisionEngine {
    pub fn new(
        ticks: Arc<TickStore>,
        learner: Arc<WinProbabilityLearner>,
        guard: Arc<PerformanceGuard>,
        leads: Arc<LeadTimeOptimizer>,
    ) -> Self {
        Self {
            ticks,
            learner,
            guard,
            leads,
        }
    }

    /// Engine whose four stores share one backend.
    pub fn open(store: Arc<dyn KvStore>) -> Self {
        Self::new(
            Arc::new(TickStore::new(store.clone())),
            Arc::new(WinProbabilityLearner::new(store.clone())),
            Arc::new(PerformanceGuard::new(store.clone())),
            Arc::new(LeadTimeOptimizer::new(store)),
        )
    }

    pub fn ticks(&self) -> &TickStore {
        &self.ticks
    }

    pub fn learner(&self) -> &WinProbabilityLearner {
        &self.learner
    }

    pub fn guard(&self) -> &PerformanceGuard {
        &self.guard
    }

    pub fn leads(&self) -> &LeadTimeOptimizer {
        &self.leads
    }

    /// Decide and, for a recommendation, propose an entry.
    pub fn evaluate(&self, cfg: &DecisionConfig, now_ms: i64) -> (Decision, Option<EntryPlan>) {
        let decision = self.decide(cfg, now_ms);
        let candidate = self.plan_entry(cfg, &decision, now_ms);
        (decision, candidate)
    }

    pub fn decide(&self, cfg: &DecisionConfig, now_ms: i64) -> Decision {
        let instrument = cfg.instrument.as_str();
        let interval = cfg.interval_secs;

        // ── 1. Guard ─────────────────────────────────────────────────────
        if cfg.guard_mode && self.guard.is_stopped(now_ms) {
            let status = self.guard.status_text(now_ms);
            debug!(instrument, %status, "guard active; skipping evaluation");
            return Decision::abstain(
                instrument,
                interval,
                AbstainReason::GuardActive { status },
                NEUTRAL_CONFIDENCE,
                None,
                now_ms,
            );
        }

        // ── 2-3. Bucket and best direction ───────────────────────────────
        let bucket = BucketKey::at(instrument, interval, now_ms);
        let high = self.learner.estimate(&bucket, Direction::High);
        let low = self.learner.estimate(&bucket, Direction::Low);
        let (direction, best) = if high.p >= low.p {
            (Direction::High, high)
        } else {
            (Direction::Low, low)
        };

        // ── 4. Sample size ───────────────────────────────────────────────
        let need = min_samples(interval, InstrumentClass::of(instrument));
        if best.total < need {
            debug!(bucket = %bucket, %direction, have = best.total, need, "insufficient sample");
            return Decision::abstain(
                instrument,
                interval,
                AbstainReason::InsufficientSample {
                    have: best.total,
                    need,
                },
                NEUTRAL_CONFIDENCE,
                Some(bucket),
                now_ms,
            );
        }

        // ── 5. Probability ───────────────────────────────────────────────
        if best.p < PROBABILITY_THRESHOLD {
            debug!(bucket = %bucket, %direction, p = best.p, "probability below threshold");
            return Decision::abstain(
                instrument,
                interval,
                AbstainReason::ProbabilityBelowThreshold { p: best.p },
                best.p,
                Some(bucket),
                now_ms,
            );
        }

        // ── 6-7. Confluence ──────────────────────────────────────────────
        let reason = if cfg.confluence_mode {
            let ticks = self.ticks.observations(instrument);
            let capped = best.p.min(SHORTFALL_CONFIDENCE_CAP);
            match score_confluence(&ticks, instrument, interval, direction, now_ms) {
                Ok(c) if c.score < cfg.confluence_threshold => {
                    debug!(bucket = %bucket, score = c.score, threshold = cfg.confluence_threshold, "confluence shortfall");
                    return Decision::abstain(
                        instrument,
                        interval,
                        AbstainReason::ConfluenceShortfall {
                            score: c.score,
                            threshold: cfg.confluence_threshold,
                            reasons: c.reasons,
                        },
                        capped,
                        Some(bucket),
                        now_ms,
                    );
                }
                Ok(c) => format!(
                    "win rate {:.0}% & confluence ok: {}",
                    best.p * 100.0,
                    c.reasons.join(", ")
                ),
                Err(err) => {
                    let (have, need) = match err {
                        EngineError::InsufficientData { have, need } => (have, need),
                        other => {
                            warn!(error = %other, "confluence scoring failed");
                            (0, min_candles(interval))
                        }
                    };
                    return Decision::abstain(
                        instrument,
                        interval,
                        AbstainReason::InsufficientData { have, need },
                        capped,
                        Some(bucket),
                        now_ms,
                    );
                }
            }
        } else {
            format!("win rate {:.0}% (smoothed)", best.p * 100.0)
        };

        info!(
            instrument,
            interval,
            %direction,
            confidence = format!("{:.2}", best.p),
            bucket = %bucket,
            "recommendation"
        );
        Decision::recommend(instrument, interval, direction, best.p, reason, bucket, now_ms)
    }

    /// Step 8: an entry candidate for a recommendation, if its entry time is
    /// still ahead.
    pub fn plan_entry(&self, cfg: &DecisionConfig, decision: &Decision, now_ms: i64) -> Option<EntryPlan> {
        let direction = decision.direction()?;
        let bucket = decision.bucket_key.clone()?;
        let lead_secs = self.leads.pick_lead(&bucket, direction, cfg.default_lead_secs);
        let entry_at_ms = next_boundary_ms(now_ms, cfg.interval_secs) - i64::from(lead_secs) * 1000;
        if entry_at_ms <= now_ms {
            debug!(entry_at_ms, now_ms, lead_secs, "entry time already passed");
            return None;
        }
        Some(EntryPlan {
            id: uuid::Uuid::new_v4().to_string(),
            entry_at_ms,
            direction,
            instrument: decision.instrument.clone(),
            interval_secs: decision.interval_secs,
            confidence: decision.confidence,
            reason: decision.reason.clone(),
            bucket_key: bucket,
            lead_secs,
            notified: false,
        })
    }

    /// Feed a resolved outcome for `plan` into every learner. All stores are
    /// updated in memory even when one of them fails to persist; the first
    /// persistence error is returned.
    pub fn report_outcome(
        &self,
        plan: &EntryPlan,
        win: bool,
        guard_mode: bool,
        now_ms: i64,
    ) -> EngineResult<OutcomeReport> {
        let stats = self.learner.record_outcome(&plan.bucket_key, plan.direction, win);
        let guard = if guard_mode {
            self.guard.record_outcome(win, now_ms).map(|_| ())
        } else {
            Ok(())
        };
        let lead = self
            .leads
            .record_outcome(&plan.bucket_key, plan.direction, plan.lead_secs, win);

        let stats = stats?;
        guard?;
        let lead = lead?;

        let guard_text = self.guard.status_text(now_ms);
        info!(plan = %plan.id, win, guard = %guard_text, "outcome recorded");
        Ok(OutcomeReport {
            win,
            stats,
            lead,
            guard: self.guard.status(now_ms),
            guard_text,
        })
    }

    /// Clear every learned table. Observations are kept.
    pub fn reset_learning(&self) -> EngineResult<()> {
        let results = [self.learner.reset(), self.guard.reset(), self.leads.reset()];
        for r in results {
            r?;
        }
        info!("learning state reset");
        Ok(())
    }
}
