// =============================================================================
// Average True Range (ATR) as a fraction of price
// =============================================================================
//
//   TR  = max(H - L, |H - prevClose|, |L - prevClose|)
//   ATR = simple mean of the last `period` TR values
//
// The engine compares ATR across instruments with very different price
// scales, so the public entry point normalises by the last close.
// =============================================================================

use crate::market_data::Candle;

fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .windows(2)
        .map(|w| {
            let (prev, cur) = (&w[0], &w[1]);
            (cur.high - cur.low)
                .max((cur.high - prev.close).abs())
                .max((cur.low - prev.close).abs())
        })
        .collect()
}

/// Mean true range over the trailing `period` candles.
///
/// `None` when `period` is zero or there are fewer than `period + 1` candles.
pub fn calculate_atr(candles: &[Candle], period: usize) -> Option<f64> {
    if period == 0 || candles.len() < period + 1 {
        return None;
    }
    let trs = true_ranges(candles);
    let window = &trs[trs.len() - period..];
    let atr = window.iter().sum::<f64>() / period as f64;
    atr.is_finite().then_some(atr)
}

/// ATR divided by the most recent close.
pub fn atr_fraction(candles: &[Candle], period: usize) -> Option<f64> {
    let atr = calculate_atr(candles, period)?;
    let last_close = candles.last()?.close;
    if last_close == 0.0 {
        return None;
    }
    Some(atr / last_close)
}
