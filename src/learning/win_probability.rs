// =============================================================================
// Win-Probability Learner - smoothed win rate per (bucket, direction)
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{cell_key, BucketKey, WinRecord};
use crate::error::EngineResult;
use crate::storage::{keys, load_or_default, save_json, KvStore};
use crate::types::Direction;

/// Read-only view of one cell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WinEstimate {
    pub wins: u32,
    pub total: u32,
    pub p: f64,
}

impl From<WinRecord> for WinEstimate {
    fn from(r: WinRecord) -> Self {
        Self {
            wins: r.wins,
            total: r.total,
            p: r.p(),
        }
    }
}

pub struct WinProbabilityLearner {
    store: Arc<dyn KvStore>,
    records: RwLock<HashMap<String, WinRecord>>,
}

impl WinProbabilityLearner {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let records = load_or_default(store.as_ref(), keys::STATS);
        Self {
            store,
            records: RwLock::new(records),
        }
    }

    pub fn estimate(&self, bucket: &BucketKey, direction: Direction) -> WinEstimate {
        self.records
            .read()
            .get(&cell_key(bucket, direction))
            .copied()
            .unwrap_or_default()
            .into()
    }

    /// Count one resolved trade. Unknown cells start at zero. Only a failed
    /// write can make this return an error.
    pub fn record_outcome(&self, bucket: &BucketKey, direction: Direction, win: bool) -> EngineResult<WinEstimate> {
        let mut records = self.records.write();
        let cell = records.entry(cell_key(bucket, direction)).or_default();
        cell.record(win);
        let updated = *cell;

        save_json(self.store.as_ref(), keys::STATS, &*records)?;
        info!(
            bucket = %bucket,
            %direction,
            win,
            wins = updated.wins,
            total = updated.total,
            "win statistics updated"
        );
        Ok(updated.into())
    }

    pub fn reset(&self) -> EngineResult<()> {
        self.records.write().clear();
        self.store.remove(keys::STATS)?;
        Ok(())
    }

    /// Number of populated cells.
    pub fn cells(&self) -> usize {
        self.records.read().len()
    }
}
