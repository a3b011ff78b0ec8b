// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
//   multiplier = 2 / (period + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// Seeded with the SMA of the first `period` closes.
// =============================================================================

/// Most recent EMA value of `closes`, or `None` when there are fewer closes
/// than `period` (or `period` is zero, or the series goes non-finite).
pub fn ema_last(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut ema = closes[..period].iter().sum::<f64>() / period as f64;
    for &close in &closes[period..] {
        ema = close * k + ema * (1.0 - k);
    }

    ema.is_finite().then_some(ema)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input() {
        assert!(ema_last(&[], 5).is_none());
    }

    #[test]
    fn period_zero() {
        assert!(ema_last(&[1.0, 2.0, 3.0], 0).is_none());
    }

    #[test]
    fn insufficient_data() {
        assert!(ema_last(&[1.0, 2.0], 5).is_none());
    }

    #[test]
    fn period_equals_length_is_sma() {
        let ema = ema_last(&[2.0, 4.0, 6.0], 3).unwrap();
        assert!((ema - 4.0).abs() < 1e-10);
    }

    #[test]
    fn known_values() {
        // SMA of 1..=5 = 3.0, k = 1/3, then fold 6..=10.
        let closes: Vec<f64> = (1..=10).map(f64::from).collect();
        let mut expected = 3.0;
        for &c in &closes[5..] {
            expected = c * (1.0 / 3.0) + expected * (2.0 / 3.0);
        }
        let got = ema_last(&closes, 5).unwrap();
        assert!((got - expected).abs() < 1e-10, "got {got}, expected {expected}");
    }

    #[test]
    fn fast_leads_slow_on_rising_series() {
        let closes: Vec<f64> = (1..=60).map(f64::from).collect();
        let fast = ema_last(&closes, 10).unwrap();
        let slow = ema_last(&closes, 30).unwrap();
        assert!(fast > slow);
    }

    #[test]
    fn nan_input_returns_none() {
        assert!(ema_last(&[1.0, 2.0, 3.0, f64::NAN, 5.0], 3).is_none());
    }
}
