// =============================================================================
// Instrument classes and their fixed parameter tables
// =============================================================================
//
// Thresholds are a pure configuration lookup keyed on instrument class, never
// learned. Classification is by symbol substring: anything mentioning BTC is
// Bitcoin, ETH is Ether, everything else is treated as a forex-style pair.
//
//   class     round_step  swing_near  spike  vol_high  trend_strong
//   Forex        0.05        0.06      0.06   0.0008     0.0002
//   Bitcoin    100.0       150.0     150.0    0.0020     0.0006
//   Ether       10.0        12.0      12.0    0.0020     0.0006
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentClass {
    Forex,
    Bitcoin,
    Ether,
}

impl InstrumentClass {
    pub fn of(instrument: &str) -> Self {
        let upper = instrument.to_ascii_uppercase();
        if upper.contains("BTC") {
            Self::Bitcoin
        } else if upper.contains("ETH") {
            Self::Ether
        } else {
            Self::Forex
        }
    }

    pub fn is_crypto(self) -> bool {
        matches!(self, Self::Bitcoin | Self::Ether)
    }
}

impl std::fmt::Display for InstrumentClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Forex => write!(f, "FOREX"),
            Self::Bitcoin => write!(f, "BTC"),
            Self::Ether => write!(f, "ETH"),
        }
    }
}

/// Per-class thresholds used by the regime detector and confluence scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParams {
    /// Spacing of "round" price levels.
    pub round_step: f64,
    /// Maximum distance from a swing extreme to count as near it.
    pub swing_near: f64,
    /// Absolute move within the spike window that counts as a spike.
    pub spike_threshold: f64,
    /// ATR fraction at or above which volatility is high.
    pub vol_high: f64,
    /// Normalised EMA spread at or above which the market is trending.
    pub trend_strong: f64,
    /// Fraction of `round_step` within which a price is near a round level.
    pub round_tolerance: f64,
}

pub fn params_for(instrument: &str) -> InstrumentParams {
    params_for_class(InstrumentClass::of(instrument))
}

pub fn params_for_class(class: InstrumentClass) -> InstrumentParams {
    match class {
        InstrumentClass::Forex => InstrumentParams {
            round_step: 0.05,
            swing_near: 0.06,
            spike_threshold: 0.06,
            vol_high: 0.0008,
            trend_strong: 0.0002,
            round_tolerance: 0.30,
        },
        InstrumentClass::Bitcoin => InstrumentParams {
            round_step: 100.0,
            swing_near: 150.0,
            spike_threshold: 150.0,
            vol_high: 0.0020,
            trend_strong: 0.0006,
            round_tolerance: 0.15,
        },
        InstrumentClass::Ether => InstrumentParams {
            round_step: 10.0,
            swing_near: 12.0,
            spike_threshold: 12.0,
            vol_high: 0.0020,
            trend_strong: 0.0006,
            round_tolerance: 0.15,
        },
    }
}

/// Minimum candle count before confluence is scored. Shorter intervals need
/// more history.
pub fn min_candles(interval_secs: u32) -> usize {
    match interval_secs {
        0..=30 => 60,
        60 => 40,
        _ => 30,
    }
}

/// Minimum resolved trades in a bucket before its win estimate is trusted.
pub fn min_samples(interval_secs: u32, class: InstrumentClass) -> u32 {
    let crypto = class.is_crypto();
    match interval_secs {
        0..=30 => if crypto { 80 } else { 50 },
        60 => if crypto { 50 } else { 30 },
        _ => if crypto { 30 } else { 20 },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_by_symbol() {
        assert_eq!(InstrumentClass::of("EURUSD"), InstrumentClass::Forex);
        assert_eq!(InstrumentClass::of("BTCUSD"), InstrumentClass::Bitcoin);
        assert_eq!(InstrumentClass::of("ethjpy"), InstrumentClass::Ether);
        assert!(!InstrumentClass::Forex.is_crypto());
        assert!(InstrumentClass::Ether.is_crypto());
    }

    #[test]
    fn params_are_deterministic() {
        for sym in ["EURUSD", "USDJPY", "BTCUSD", "ETHUSD", "XAUUSD"] {
            assert_eq!(params_for(sym), params_for(sym));
        }
        assert_eq!(params_for("EURUSD"), params_for("GBPUSD"));
    }

    #[test]
    fn forex_row() {
        let p = params_for("EURUSD");
        assert!((p.round_step - 0.05).abs() < f64::EPSILON);
        assert!((p.round_tolerance - 0.30).abs() < f64::EPSILON);
        assert!((p.vol_high - 0.0008).abs() < f64::EPSILON);
    }

    #[test]
    fn crypto_rows_use_tighter_round_tolerance() {
        assert!((params_for("BTCUSD").round_tolerance - 0.15).abs() < f64::EPSILON);
        assert!((params_for("ETHUSD").round_tolerance - 0.15).abs() < f64::EPSILON);
        assert!((params_for("BTCUSD").round_step - 100.0).abs() < f64::EPSILON);
        assert!((params_for("ETHUSD").round_step - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn min_candles_stricter_for_short_intervals() {
        assert_eq!(min_candles(15), 60);
        assert_eq!(min_candles(30), 60);
        assert_eq!(min_candles(60), 40);
        assert_eq!(min_candles(300), 30);
    }

    #[test]
    fn min_samples_table() {
        assert_eq!(min_samples(30, InstrumentClass::Bitcoin), 80);
        assert_eq!(min_samples(30, InstrumentClass::Forex), 50);
        assert_eq!(min_samples(60, InstrumentClass::Ether), 50);
        assert_eq!(min_samples(60, InstrumentClass::Forex), 30);
        assert_eq!(min_samples(180, InstrumentClass::Bitcoin), 30);
        assert_eq!(min_samples(180, InstrumentClass::Forex), 20);
    }
}
