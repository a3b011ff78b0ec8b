// =============================================================================
// Regime Detection
// =============================================================================
//
// Trend vs. range classification with a volatility flag, from EMA spread and
// ATR on the candle series.

pub mod detector;

pub use detector::{detect_regime, Regime, RegimeKind};
