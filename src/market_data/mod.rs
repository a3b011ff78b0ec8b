// =============================================================================
// Market Data - manually supplied observations and the candles built from them
// =============================================================================

pub mod candle_builder;
pub mod tick_store;

pub use candle_builder::{build_candles, Candle};
pub use tick_store::{Tick, TickStore};
