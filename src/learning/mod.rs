// =============================================================================
// Learning - persistent outcome statistics keyed by time-of-week bucket
// =============================================================================
//
// Both learners smooth raw win counts with a uniform Beta(1, 1) prior:
//
//   p = (wins + 1) / (total + 2)
//
// so an empty cell reads 0.5 and small samples cannot claim certainty.

pub mod bucket;
pub mod lead_time;
pub mod win_probability;

use serde::{Deserialize, Serialize};

pub use bucket::BucketKey;
pub use lead_time::LeadTimeOptimizer;
pub use win_probability::{WinEstimate, WinProbabilityLearner};

/// Laplace-smoothed win probability.
pub fn bayes_p(wins: u32, total: u32) -> f64 {
    (f64::from(wins) + 1.0) / (f64::from(total) + 2.0)
}

/// Win/total counter shared by both learners.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WinRecord {
    pub wins: u32,
    pub total: u32,
}

impl WinRecord {
    pub fn record(&mut self, win: bool) {
        self.total += 1;
        if win {
            self.wins += 1;
        }
    }

    pub fn p(&self) -> f64 {
        bayes_p(self.wins, self.total)
    }
}

/// Storage key for a (bucket, direction) cell.
pub(crate) fn cell_key(bucket: &BucketKey, direction: crate::types::Direction) -> String {
    format!("{bucket}|{direction}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_record_is_even_odds() {
        assert!((bayes_p(0, 0) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn smoothing_examples() {
        assert!((bayes_p(10, 12) - 11.0 / 14.0).abs() < 1e-12);
        assert!((bayes_p(0, 10) - 1.0 / 12.0).abs() < 1e-12);
    }

    #[test]
    fn strictly_inside_unit_interval() {
        for total in 0..200u32 {
            for wins in 0..=total {
                let p = bayes_p(wins, total);
                assert!(p > 0.0 && p < 1.0, "p({wins},{total}) = {p}");
            }
        }
    }

    #[test]
    fn monotone_in_wins() {
        for total in 0..100u32 {
            let mut prev = 0.0;
            for wins in 0..=total {
                let p = bayes_p(wins, total);
                assert!(p >= prev);
                prev = p;
            }
        }
    }

    #[test]
    fn record_counts() {
        let mut r = WinRecord::default();
        r.record(true);
        r.record(false);
        r.record(true);
        assert_eq!(r, WinRecord { wins: 2, total: 3 });
        assert!((r.p() - 0.6).abs() < 1e-12);
    }
}
