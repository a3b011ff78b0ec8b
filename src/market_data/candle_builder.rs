// =============================================================================
// Candle Builder - tick to fixed-interval OHLC aggregation
// =============================================================================
//
// Buckets are aligned to the epoch:
//   bucket_start = floor(t / interval_ms) * interval_ms
//
// One candle per populated bucket, chronological. Empty buckets produce no
// candle, so consecutive candles may be more than one interval apart.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::Tick;

/// A single OHLC candle derived from observations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub bucket_start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Candle {
    fn seed(bucket_start: i64, price: f64) -> Self {
        Self {
            bucket_start,
            open: price,
            high: price,
            low: price,
            close: price,
        }
    }

    fn absorb(&mut self, price: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
    }
}

/// Start of the bucket containing `t_ms` for the given interval length.
pub fn bucket_start(t_ms: i64, interval_ms: i64) -> i64 {
    t_ms.div_euclid(interval_ms) * interval_ms
}

/// Aggregate `ticks` into candles of `interval_secs` seconds.
///
/// Ticks are expected in ascending timestamp order (as returned by
/// [`TickStore::observations`](super::TickStore::observations)); unsorted
/// input is sorted on a copy first so open/close always follow time order.
pub fn build_candles(ticks: &[Tick], interval_secs: u32) -> Vec<Candle> {
    if ticks.is_empty() || interval_secs == 0 {
        return Vec::new();
    }

    let sorted;
    let ticks = if ticks.windows(2).all(|w| w[0].timestamp <= w[1].timestamp) {
        ticks
    } else {
        let mut copy = ticks.to_vec();
        copy.sort_by_key(|t| t.timestamp);
        sorted = copy;
        &sorted[..]
    };

    let interval_ms = i64::from(interval_secs) * 1000;
    let mut candles = Vec::new();
    let mut current = Candle::seed(bucket_start(ticks[0].timestamp, interval_ms), ticks[0].price);

    for tick in &ticks[1..] {
        let b = bucket_start(tick.timestamp, interval_ms);
        if b != current.bucket_start {
            candles.push(current);
            current = Candle::seed(b, tick.price);
        } else {
            current.absorb(tick.price);
        }
    }
    candles.push(current);
    candles
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(timestamp: i64, price: f64) -> Tick {
        Tick { timestamp, price }
    }

    #[test]
    fn empty_input_yields_no_candles() {
        assert!(build_candles(&[], 60).is_empty());
    }

    #[test]
    fn zero_interval_yields_no_candles() {
        assert!(build_candles(&[tick(0, 1.0)], 0).is_empty());
    }

    #[test]
    fn single_tick_is_degenerate_candle() {
        let c = build_candles(&[tick(61_500, 1.25)], 60);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].bucket_start, 60_000);
        assert_eq!((c[0].open, c[0].high, c[0].low, c[0].close), (1.25, 1.25, 1.25, 1.25));
    }

    #[test]
    fn ohlc_per_bucket() {
        let ticks = vec![
            tick(0, 10.0),
            tick(10_000, 12.0),
            tick(20_000, 9.0),
            tick(29_999, 11.0),
            tick(30_000, 20.0),
            tick(45_000, 19.0),
        ];
        let c = build_candles(&ticks, 30);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0], Candle { bucket_start: 0, open: 10.0, high: 12.0, low: 9.0, close: 11.0 });
        assert_eq!(c[1], Candle { bucket_start: 30_000, open: 20.0, high: 20.0, low: 19.0, close: 19.0 });
    }

    #[test]
    fn gaps_do_not_create_empty_candles() {
        let ticks = vec![tick(0, 1.0), tick(600_000, 2.0)];
        let c = build_candles(&ticks, 60);
        assert_eq!(c.len(), 2);
        assert_eq!(c[1].bucket_start, 600_000);
    }

    #[test]
    fn unsorted_input_follows_time_order() {
        let ticks = vec![tick(50_000, 3.0), tick(5_000, 1.0), tick(30_000, 2.0)];
        let c = build_candles(&ticks, 60);
        assert_eq!(c.len(), 1);
        assert_eq!(c[0].open, 1.0);
        assert_eq!(c[0].close, 3.0);
    }

    #[test]
    fn candle_count_matches_distinct_buckets_and_bounds_hold() {
        let ticks: Vec<Tick> = (0..500)
            .map(|i| tick(i * 7_331, 100.0 + ((i * 37) % 17) as f64 * 0.1))
            .collect();
        let interval_ms = 15_000;
        let candles = build_candles(&ticks, 15);

        let mut buckets: Vec<i64> = ticks.iter().map(|t| bucket_start(t.timestamp, interval_ms)).collect();
        buckets.dedup();
        assert_eq!(candles.len(), buckets.len());

        for c in &candles {
            let inside: Vec<&Tick> = ticks
                .iter()
                .filter(|t| bucket_start(t.timestamp, interval_ms) == c.bucket_start)
                .collect();
            assert_eq!(c.open, inside.first().unwrap().price);
            assert_eq!(c.close, inside.last().unwrap().price);
            for t in inside {
                assert!(c.high >= t.price && t.price >= c.low);
            }
        }
    }

    #[test]
    fn negative_timestamps_floor_correctly() {
        assert_eq!(bucket_start(-1, 1000), -1000);
        assert_eq!(bucket_start(999, 1000), 0);
    }
}
