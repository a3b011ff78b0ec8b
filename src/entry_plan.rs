// =============================================================================
// Entry Plan - the single scheduled entry and its lifecycle
// =============================================================================
//
//   none ──propose──▶ pending ──entry time elapses──▶ due (notified once)
//                                                       │
//                                   10 s after entry ───▶ cleared (none)
//
// At most one plan is live. Any proposal made while a plan is live, due or
// not, is dropped; a new plan only takes the slot once `advance` has cleared
// the previous one.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::learning::BucketKey;
use crate::types::Direction;

/// How long a plan stays visible after its entry time.
pub const CLEAR_AFTER_MS: i64 = 10_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryPlan {
    pub id: String,
    pub entry_at_ms: i64,
    pub direction: Direction,
    pub instrument: String,
    pub interval_secs: u32,
    pub confidence: f64,
    pub reason: String,
    pub bucket_key: BucketKey,
    pub lead_secs: u8,
    pub notified: bool,
}

impl EntryPlan {
    pub fn ms_until_entry(&self, now_ms: i64) -> i64 {
        self.entry_at_ms - now_ms
    }

    /// Whole seconds until entry, rounded up; zero once due.
    pub fn secs_until_entry(&self, now_ms: i64) -> i64 {
        (self.ms_until_entry(now_ms).max(0) + 999) / 1000
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.entry_at_ms <= now_ms
    }
}

/// Result of offering a new plan to the slot.
#[derive(Debug, Clone, PartialEq)]
pub enum ProposeOutcome {
    Scheduled(EntryPlan),
    AlreadyPlanned,
    EntryPassed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlanTransition {
    /// Entry time elapsed. Emitted once per plan.
    Due(EntryPlan),
    Cleared(EntryPlan),
}

#[derive(Debug, Clone, Default)]
pub struct PlanSlot {
    current: Option<EntryPlan>,
}

impl PlanSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<&EntryPlan> {
        self.current.as_ref()
    }

    pub fn propose(&mut self, candidate: EntryPlan, now_ms: i64) -> ProposeOutcome {
        if candidate.is_due(now_ms) {
            return ProposeOutcome::EntryPassed;
        }
        if let Some(existing) = &self.current {
            debug!(
                existing = %existing.id,
                bucket = %candidate.bucket_key,
                "entry plan already live; proposal dropped"
            );
            return ProposeOutcome::AlreadyPlanned;
        }

        info!(
            id = %candidate.id,
            instrument = %candidate.instrument,
            direction = %candidate.direction,
            lead_secs = candidate.lead_secs,
            entry_at_ms = candidate.entry_at_ms,
            "entry plan scheduled"
        );
        self.current = Some(candidate.clone());
        ProposeOutcome::Scheduled(candidate)
    }

    /// Move the live plan along its lifecycle. A long gap between calls can
    /// yield both transitions at once.
    pub fn advance(&mut self, now_ms: i64) -> Vec<PlanTransition> {
        let mut out = Vec::new();
        let Some(plan) = self.current.as_mut() else {
            return out;
        };
        let ms = plan.ms_until_entry(now_ms);
        if ms > 0 {
            return out;
        }

        if !plan.notified {
            plan.notified = true;
            info!(id = %plan.id, direction = %plan.direction, "entry due");
            out.push(PlanTransition::Due(plan.clone()));
        }
        if ms < -CLEAR_AFTER_MS {
            if let Some(done) = self.current.take() {
                debug!(id = %done.id, "entry plan cleared");
                out.push(PlanTransition::Cleared(done));
            }
        }
        out
    }

    pub fn clear(&mut self) -> Option<EntryPlan> {
        self.current.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bucket(slot: u8) -> BucketKey {
        BucketKey {
            instrument: "EURUSD".into(),
            interval_secs: 60,
            weekday: 1,
            hour: 9,
            slot,
        }
    }

    fn plan(id: &str, entry_at_ms: i64, slot: u8) -> EntryPlan {
        EntryPlan {
            id: id.into(),
            entry_at_ms,
            direction: Direction::High,
            instrument: "EURUSD".into(),
            interval_secs: 60,
            confidence: 0.85,
            reason: "test".into(),
            bucket_key: bucket(slot),
            lead_secs: 1,
            notified: false,
        }
    }

    #[test]
    fn same_bucket_yields_one_plan() {
        let mut slot = PlanSlot::new();
        assert!(matches!(slot.propose(plan("a", 5_000, 0), 0), ProposeOutcome::Scheduled(_)));
        assert_eq!(slot.propose(plan("b", 5_000, 0), 100), ProposeOutcome::AlreadyPlanned);
        assert_eq!(slot.current().unwrap().id, "a");
    }

    #[test]
    fn past_entry_is_rejected() {
        let mut slot = PlanSlot::new();
        assert_eq!(slot.propose(plan("a", 1_000, 0), 1_000), ProposeOutcome::EntryPassed);
        assert!(slot.current().is_none());
    }

    #[test]
    fn other_bucket_waits_until_plan_clears() {
        let mut slot = PlanSlot::new();
        slot.propose(plan("a", 9_000, 0), 0);
        assert_eq!(slot.propose(plan("b", 30_000, 1), 1_000), ProposeOutcome::AlreadyPlanned);

        // Due but still inside its clear window: `a` keeps the slot.
        assert!(matches!(slot.advance(9_000).as_slice(), [PlanTransition::Due(_)]));
        assert_eq!(slot.propose(plan("b", 30_000, 1), 17_000), ProposeOutcome::AlreadyPlanned);
        assert_eq!(slot.current().unwrap().id, "a");

        // Cleared: the slot is free again.
        assert!(matches!(slot.advance(19_001).as_slice(), [PlanTransition::Cleared(_)]));
        assert!(matches!(slot.propose(plan("b", 30_000, 1), 19_001), ProposeOutcome::Scheduled(_)));
        assert_eq!(slot.current().unwrap().id, "b");
    }

    #[test]
    fn due_fires_once_then_clears() {
        let mut slot = PlanSlot::new();
        slot.propose(plan("a", 5_000, 0), 0);

        assert!(slot.advance(4_999).is_empty());
        let t = slot.advance(5_000);
        assert!(matches!(t.as_slice(), [PlanTransition::Due(p)] if p.notified));
        assert!(slot.advance(5_200).is_empty());
        assert!(slot.advance(15_000).is_empty());

        let t = slot.advance(15_001);
        assert!(matches!(t.as_slice(), [PlanTransition::Cleared(_)]));
        assert!(slot.current().is_none());
    }

    #[test]
    fn long_gap_yields_both_transitions() {
        let mut slot = PlanSlot::new();
        slot.propose(plan("a", 5_000, 0), 0);
        let t = slot.advance(60_000);
        assert_eq!(t.len(), 2);
        assert!(matches!(t[0], PlanTransition::Due(_)));
        assert!(matches!(t[1], PlanTransition::Cleared(_)));
    }

    #[test]
    fn seconds_until_entry_round_up() {
        let p = plan("a", 2_001, 0);
        assert_eq!(p.secs_until_entry(0), 3);
        assert_eq!(p.secs_until_entry(3_000), 0);
    }
}
