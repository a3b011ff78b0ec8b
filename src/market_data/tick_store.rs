// =============================================================================
// Tick Store - append/prune log of manual price observations
// =============================================================================
//
// Observations are kept per instrument for a rolling two-hour horizon and
// persisted as a single document. Input order is not guaranteed to be
// monotonic; readers always get a timestamp-sorted copy.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, EngineResult};
use crate::storage::{keys, load_or_default, save_json, KvStore};

/// Retention horizon for raw observations.
pub const RETENTION_MS: i64 = 2 * 60 * 60 * 1000;

/// A single price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub timestamp: i64,
    pub price: f64,
}

pub struct TickStore {
    store: Arc<dyn KvStore>,
    ticks: RwLock<HashMap<String, Vec<Tick>>>,
}

impl TickStore {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        let ticks: HashMap<String, Vec<Tick>> = load_or_default(store.as_ref(), keys::PRICES);
        Self {
            store,
            ticks: RwLock::new(ticks),
        }
    }

    /// Record `price` as observed at `now_ms`. Returns the retained count.
    pub fn add_observation(&self, instrument: &str, price: f64, now_ms: i64) -> EngineResult<usize> {
        self.insert(instrument, Tick { timestamp: now_ms, price }, now_ms)
    }

    /// Append `tick` and prune everything older than the retention horizon,
    /// measured from `now_ms` rather than the tick's own timestamp.
    pub fn insert(&self, instrument: &str, tick: Tick, now_ms: i64) -> EngineResult<usize> {
        let price = tick.price;
        if instrument.trim().is_empty() {
            return Err(EngineError::InvalidInput("instrument must not be empty".into()));
        }
        if !price.is_finite() || price <= 0.0 {
            warn!(instrument, price, "rejected observation");
            return Err(EngineError::InvalidInput(format!(
                "price must be a positive finite number, got {price}"
            )));
        }

        let mut map = self.ticks.write();
        let series = map.entry(instrument.to_string()).or_default();
        series.push(tick);

        let cutoff = now_ms - RETENTION_MS;
        series.retain(|t| t.timestamp >= cutoff);
        let count = series.len();

        save_json(self.store.as_ref(), keys::PRICES, &*map)?;
        debug!(instrument, price, count, "observation added");
        Ok(count)
    }

    /// Observations for `instrument`, sorted ascending by timestamp.
    pub fn observations(&self, instrument: &str) -> Vec<Tick> {
        let mut out = self.ticks.read().get(instrument).cloned().unwrap_or_default();
        out.sort_by_key(|t| t.timestamp);
        out
    }

    pub fn count(&self, instrument: &str) -> usize {
        self.ticks.read().get(instrument).map_or(0, Vec::len)
    }
}
