// =============================================================================
// Outbound events
// =============================================================================
//
// The engine never notifies anyone directly. Each cycle's results are turned
// into `EngineEvent`s by `events_for_cycle`, and the bus fans them out to
// whoever subscribed (WebSocket clients, the log).
// =============================================================================

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::decision_envelope::Decision;
use crate::entry_plan::{EntryPlan, PlanTransition};
use crate::types::Direction;

const BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Recommendation {
        decision_id: String,
        instrument: String,
        direction: Direction,
        confidence: f64,
        reason: String,
    },
    EntryScheduled {
        plan_id: String,
        instrument: String,
        direction: Direction,
        entry_at_ms: i64,
        secs_until_entry: i64,
    },
    EntryDue {
        plan_id: String,
        instrument: String,
        direction: Direction,
    },
    LearningUpdated {
        win: bool,
        guard_status: String,
    },
    LearningReset,
}

impl EngineEvent {
    pub fn title(&self) -> &'static str {
        match self {
            Self::Recommendation { .. } => "Recommendation",
            Self::EntryScheduled { .. } => "Entry scheduled",
            Self::EntryDue { .. } => "Entry",
            Self::LearningUpdated { .. } => "Learning updated",
            Self::LearningReset => "Reset",
        }
    }

    /// One-line notification body.
    pub fn message(&self) -> String {
        match self {
            Self::Recommendation {
                instrument,
                direction,
                confidence,
                ..
            } => format!("{direction} {instrument} (confidence {:.0}%)", confidence * 100.0),
            Self::EntryScheduled {
                instrument,
                direction,
                secs_until_entry,
                ..
            } => format!("in {secs_until_entry}s: {direction} ({instrument})"),
            Self::EntryDue {
                instrument,
                direction,
                ..
            } => format!("{direction} ({instrument}) enter now"),
            Self::LearningUpdated { win, guard_status } => {
                format!("recorded {} / {guard_status}", if *win { "win" } else { "loss" })
            }
            Self::LearningReset => "learning data cleared".to_string(),
        }
    }
}

/// Translate one cycle's results into events, in the order they happened:
/// plan transitions first, then the decision and any plan it scheduled.
pub fn events_for_cycle(
    transitions: &[PlanTransition],
    decision: Option<&Decision>,
    scheduled: Option<&EntryPlan>,
    now_ms: i64,
) -> Vec<EngineEvent> {
    let mut out = Vec::new();

    for t in transitions {
        if let PlanTransition::Due(plan) = t {
            out.push(EngineEvent::EntryDue {
                plan_id: plan.id.clone(),
                instrument: plan.instrument.clone(),
                direction: plan.direction,
            });
        }
    }

    if let Some(d) = decision {
        if let Some(direction) = d.direction() {
            out.push(EngineEvent::Recommendation {
                decision_id: d.id.clone(),
                instrument: d.instrument.clone(),
                direction,
                confidence: d.confidence,
                reason: d.reason.clone(),
            });
        }
    }

    if let Some(plan) = scheduled {
        out.push(EngineEvent::EntryScheduled {
            plan_id: plan.id.clone(),
            instrument: plan.instrument.clone(),
            direction: plan.direction,
            entry_at_ms: plan.entry_at_ms,
            secs_until_entry: plan.secs_until_entry(now_ms),
        });
    }

    out
}

// =============================================================================
// Bus
// =============================================================================

#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(BUS_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    /// Deliver to current subscribers. Having none is not an error.
    pub fn publish(&self, event: EngineEvent) {
        debug!(event = event.title(), message = %event.message(), "event");
        let _ = self.tx.send(event);
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = EngineEvent>) {
        for e in events {
            self.publish(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::BucketKey;

    fn plan(id: &str) -> EntryPlan {
        EntryPlan {
            id: id.into(),
            entry_at_ms: 10_000,
            direction: Direction::Low,
            instrument: "BTCUSD".into(),
            interval_secs: 30,
            confidence: 0.9,
            reason: "r".into(),
            bucket_key: BucketKey {
                instrument: "BTCUSD".into(),
                interval_secs: 30,
                weekday: 0,
                hour: 0,
                slot: 0,
            },
            lead_secs: 2,
            notified: true,
        }
    }

    #[test]
    fn abstain_emits_nothing() {
        let d = Decision::abstain(
            "BTCUSD",
            30,
            crate::decision_envelope::AbstainReason::InsufficientSample { have: 0, need: 80 },
            0.5,
            None,
            0,
        );
        assert!(events_for_cycle(&[], Some(&d), None, 0).is_empty());
    }

    #[test]
    fn cycle_order_is_due_then_recommendation_then_schedule() {
        let old = plan("old");
        let new = plan("new");
        let d = Decision::recommend("BTCUSD", 30, Direction::Low, 0.9, "ok", new.bucket_key.clone(), 7_000);
        let events = events_for_cycle(
            &[PlanTransition::Due(old.clone()), PlanTransition::Cleared(old)],
            Some(&d),
            Some(&new),
            7_000,
        );
        assert_eq!(events.len(), 3);
        assert!(matches!(&events[0], EngineEvent::EntryDue { plan_id, .. } if plan_id == "old"));
        assert!(matches!(events[1], EngineEvent::Recommendation { direction: Direction::Low, .. }));
        assert!(matches!(events[2], EngineEvent::EntryScheduled { secs_until_entry: 3, .. }));
    }

    #[test]
    fn messages_read_naturally() {
        let e = EngineEvent::LearningUpdated {
            win: false,
            guard_status: "last 3: win rate 67%".into(),
        };
        assert_eq!(e.message(), "recorded loss / last 3: win rate 67%");
        let json = serde_json::to_value(&EngineEvent::LearningReset).unwrap();
        assert_eq!(json["type"], "learning_reset");
    }

    #[tokio::test]
    async fn bus_delivers_to_subscribers() {
        let bus = EventBus::new();
        bus.publish(EngineEvent::LearningReset);
        let mut rx = bus.subscribe();
        bus.publish_all([EngineEvent::LearningReset]);
        assert_eq!(rx.recv().await.unwrap(), EngineEvent::LearningReset);
    }
}
