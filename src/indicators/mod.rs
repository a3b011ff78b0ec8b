// =============================================================================
// Technical Indicators
// =============================================================================
//
// Pure functions over candle closes. Each returns `Option` so callers handle
// the insufficient-history case explicitly.

pub mod atr;
pub mod ema;
