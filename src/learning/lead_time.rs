// =============================================================================
// Lead-Time Optimizer - learns how many seconds before the boundary to enter
// =============================================================================
//
// Each (bucket, direction) row holds one win counter per lead option 0..=3 s.
// A lead only competes once it has MIN_LEAD_SAMPLES resolved trades; the best
// smoothed probability wins, ties keep the earlier (shorter) lead. With no
// qualifying lead the caller's default is used.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{cell_key, BucketKey, WinRecord};
use crate::error::{EngineError, EngineResult};
use crate::storage::{keys, load_or_default, save_json, KvStore};
use crate::types::Direction;

pub const LEAD_OPTIONS: [u8; 4] = [0, 1, 2, 3];
pub const MAX_LEAD_SECS: u8 = 3;
pub const MIN_LEAD_SAMPLES: u32 = 10;

/// Counters for every lead option of one (bucket, direction).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRow {
    pub cells: [WinRecord; LEAD_OPTIONS.len()],
}

impl LeadRow {
    pub fn best_lead(&self) -> Option<u8> {
        let mut best: Option<(u8, f64)> = None;
        for (lead, cell) in LEAD_OPTIONS.iter().zip(self.cells.iter()) {
            if cell.total < MIN_LEAD_SAMPLES {
                continue;
            }
            let p = cell.p();
            if best.map_or(true, |(_, best_p)| p > best_p) {
                best = Some((*lead, p));
            }
        }
        best.map(|(lead, _)| lead)
    }
}

pub struct LeadTimeOptimizer {
    store: Arc<dyn KvStore>,
    rows: RwLock<HashMap<String, LeadRow>>,
}

impl LeadTimeOptimizer {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let rows = load_or_default(store.as_ref(), keys::LEAD);
        Self {
            store,
            rows: RwLock::new(rows),
        }
    }

    pub fn pick_lead(&self, bucket: &BucketKey, direction: Direction, default_lead: u8) -> u8 {
        let picked = self
            .rows
            .read()
            .get(&cell_key(bucket, direction))
            .and_then(LeadRow::best_lead);
        debug!(bucket = %bucket, %direction, ?picked, default_lead, "lead picked");
        picked.unwrap_or(default_lead)
    }

    pub fn record_outcome(
        &self,
        bucket: &BucketKey,
        direction: Direction,
        lead_secs: u8,
        win: bool,
    ) -> EngineResult<WinRecord> {
        if lead_secs > MAX_LEAD_SECS {
            return Err(EngineError::InvalidInput(format!(
                "lead must be within 0..={MAX_LEAD_SECS} s, got {lead_secs}"
            )));
        }

        let mut rows = self.rows.write();
        let row = rows.entry(cell_key(bucket, direction)).or_default();
        let cell = &mut row.cells[usize::from(lead_secs)];
        cell.record(win);
        let updated = *cell;

        save_json(self.store.as_ref(), keys::LEAD, &*rows)?;
        info!(
            bucket = %bucket,
            %direction,
            lead_secs,
            win,
            wins = updated.wins,
            total = updated.total,
            "lead statistics updated"
        );
        Ok(updated)
    }

    pub fn row(&self, bucket: &BucketKey, direction: Direction) -> LeadRow {
        self.rows
            .read()
            .get(&cell_key(bucket, direction))
            .copied()
            .unwrap_or_default()
    }

    pub fn reset(&self) -> EngineResult<()> {
        self.rows.write().clear();
        self.store.remove(keys::LEAD)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn key() -> BucketKey {
        BucketKey {
            instrument: "USDJPY".into(),
            interval_secs: 30,
            weekday: 5,
            hour: 22,
            slot: 4,
        }
    }

    fn optimizer() -> LeadTimeOptimizer {
        LeadTimeOptimizer::new(Arc::new(MemoryStore::new()))
    }

    fn feed(o: &LeadTimeOptimizer, lead: u8, wins: u32, losses: u32) {
        for _ in 0..wins {
            o.record_outcome(&key(), Direction::High, lead, true).unwrap();
        }
        for _ in 0..losses {
            o.record_outcome(&key(), Direction::High, lead, false).unwrap();
        }
    }

    #[test]
    fn default_when_nothing_recorded() {
        assert_eq!(optimizer().pick_lead(&key(), Direction::High, 2), 2);
    }

    #[test]
    fn default_while_every_lead_is_under_threshold() {
        let o = optimizer();
        feed(&o, 0, 9, 0);
        feed(&o, 3, 9, 0);
        assert_eq!(o.pick_lead(&key(), Direction::High, 1), 1);
    }

    #[test]
    fn qualifying_lead_is_selected() {
        let o = optimizer();
        feed(&o, 1, 5, 5);
        feed(&o, 2, 9, 1);
        feed(&o, 3, 9, 0);
        assert_eq!(o.pick_lead(&key(), Direction::High, 0), 2);
        // The other direction is untouched.
        assert_eq!(o.pick_lead(&key(), Direction::Low, 0), 0);
    }

    #[test]
    fn ties_keep_the_earlier_lead() {
        let o = optimizer();
        feed(&o, 1, 8, 2);
        feed(&o, 3, 8, 2);
        assert_eq!(o.pick_lead(&key(), Direction::High, 0), 1);
    }

    #[test]
    fn loss_only_touches_its_cell() {
        let o = optimizer();
        feed(&o, 2, 3, 0);
        o.record_outcome(&key(), Direction::High, 2, false).unwrap();
        let row = o.row(&key(), Direction::High);
        assert_eq!(row.cells[2], WinRecord { wins: 3, total: 4 });
        for lead in [0usize, 1, 3] {
            assert_eq!(row.cells[lead], WinRecord::default());
        }
    }

    #[test]
    fn rejects_out_of_range_lead() {
        let err = optimizer().record_outcome(&key(), Direction::High, 4, true).unwrap_err();
        assert!(matches!(err, EngineError::InvalidInput(_)));
    }

    #[test]
    fn persists_and_resets() {
        let mem = Arc::new(MemoryStore::new());
        let o = LeadTimeOptimizer::new(mem.clone());
        o.record_outcome(&key(), Direction::Low, 0, true).unwrap();
        let reopened = LeadTimeOptimizer::new(mem.clone());
        assert_eq!(reopened.row(&key(), Direction::Low).cells[0].total, 1);
        reopened.reset().unwrap();
        assert_eq!(LeadTimeOptimizer::new(mem).row(&key(), Direction::Low).cells[0].total, 0);
    }
}
