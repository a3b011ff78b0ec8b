// =============================================================================
// Market Regime Detector
// =============================================================================
//
//   fast  = EMA(10) of closes        slow = EMA(30) of closes
//   vol   = ATR(14) / last close
//   trend = (fast - slow) / last close
//
//   high_volatility = vol >= params.vol_high
//   kind            = TREND if |trend| >= params.trend_strong else RANGE
//
// Any metric lacking history makes the regime UNKNOWN.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::indicators::atr::atr_fraction;
use crate::indicators::ema::ema_last;
use crate::instrument::InstrumentParams;
use crate::market_data::Candle;

pub const FAST_PERIOD: usize = 10;
pub const SLOW_PERIOD: usize = 30;
pub const ATR_PERIOD: usize = 14;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegimeKind {
    Trend,
    Range,
    Unknown,
}

impl std::fmt::Display for RegimeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trend => write!(f, "trend"),
            Self::Range => write!(f, "range"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Regime snapshot for one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Regime {
    pub kind: RegimeKind,
    pub high_volatility: bool,
    /// ATR as a fraction of the last close.
    pub volatility: Option<f64>,
    /// Signed, price-normalised EMA spread. Positive means up-trend.
    pub trend_strength: f64,
}

impl Regime {
    pub fn unknown() -> Self {
        Self {
            kind: RegimeKind::Unknown,
            high_volatility: false,
            volatility: None,
            trend_strength: 0.0,
        }
    }
}

pub fn detect_regime(candles: &[Candle], params: &InstrumentParams) -> Regime {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let (Some(fast), Some(slow), Some(vol)) = (
        ema_last(&closes, FAST_PERIOD),
        ema_last(&closes, SLOW_PERIOD),
        atr_fraction(candles, ATR_PERIOD),
    ) else {
        trace!(candles = candles.len(), "regime unknown: not enough history");
        return Regime::unknown();
    };

    let Some(&last) = closes.last().filter(|c| **c != 0.0) else {
        return Regime::unknown();
    };

    let trend_strength = (fast - slow) / last;
    let high_volatility = vol >= params.vol_high;
    let kind = if trend_strength.abs() >= params.trend_strong {
        RegimeKind::Trend
    } else {
        RegimeKind::Range
    };

    debug!(
        regime = %kind,
        volatility = format!("{:.6}", vol),
        trend = format!("{:.6}", trend_strength),
        high_volatility,
        "Regime detected"
    );

    Regime {
        kind,
        high_volatility,
        volatility: Some(vol),
        trend_strength,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::params_for;

    fn series(closes: &[f64], half_range: f64) -> Vec<Candle> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Candle {
                bucket_start: i as i64 * 60_000,
                open: c,
                high: c + half_range,
                low: c - half_range,
                close: c,
            })
            .collect()
    }

    #[test]
    fn unknown_below_slow_period() {
        let candles = series(&[1.1; 29], 0.0001);
        let r = detect_regime(&candles, &params_for("EURUSD"));
        assert_eq!(r.kind, RegimeKind::Unknown);
        assert!(r.volatility.is_none());
        assert!(!r.high_volatility);
    }

    #[test]
    fn flat_forex_is_quiet_range() {
        let closes: Vec<f64> = (0..30)
            .map(|i| if i % 2 == 0 { 1.1001 } else { 1.0999 })
            .collect();
        let candles = series(&closes, 0.00005);
        let r = detect_regime(&candles, &params_for("EURUSD"));
        assert_eq!(r.kind, RegimeKind::Range);
        assert!(!r.high_volatility);
        assert!(r.trend_strength.abs() < 0.0002);
        assert!(r.volatility.unwrap() < 0.0008);
    }

    #[test]
    fn rising_series_is_up_trend() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let candles = series(&closes, 0.5);
        let r = detect_regime(&candles, &params_for("EURUSD"));
        assert_eq!(r.kind, RegimeKind::Trend);
        assert!(r.trend_strength > 0.0);
    }

    #[test]
    fn falling_series_is_down_trend() {
        let closes: Vec<f64> = (0..40).map(|i| 200.0 - i as f64).collect();
        let candles = series(&closes, 0.5);
        let r = detect_regime(&candles, &params_for("EURUSD"));
        assert_eq!(r.kind, RegimeKind::Trend);
        assert!(r.trend_strength < 0.0);
    }

    #[test]
    fn wide_candles_flag_high_volatility() {
        let candles = series(&[50_000.0; 40], 200.0);
        let r = detect_regime(&candles, &params_for("BTCUSD"));
        // ATR = 400 / 50_000 = 0.008 >= 0.002
        assert!(r.high_volatility);
        assert_eq!(r.kind, RegimeKind::Range);
    }

    #[test]
    fn display_is_lowercase() {
        assert_eq!(RegimeKind::Trend.to_string(), "trend");
        assert_eq!(RegimeKind::Unknown.to_string(), "unknown");
    }
}
