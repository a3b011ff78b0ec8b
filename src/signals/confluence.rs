// =============================================================================
// Confluence Scorer - four boolean checks against the latest close
// =============================================================================
//
//   1. near swing    - within swing_near of the 40-candle high or low
//   2. near round    - within round_tolerance * round_step of a step multiple
//   3. no spike      - |move| over the last 5 s (and 1 s for intervals <= 30 s)
//                      stays below spike_threshold
//   4. regime aligned - in a trend, direction must match the trend sign;
//                      voided by high volatility on intervals <= 30 s
//
// Score = number of checks that pass. Reasons are display labels only.
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::instrument::{min_candles, params_for, InstrumentParams};
use crate::market_data::{build_candles, Candle, Tick};
use crate::regime::{detect_regime, Regime, RegimeKind};
use crate::types::Direction;

pub const SWING_LOOKBACK: usize = 40;
const SWING_MIN_CANDLES: usize = 5;
const SPIKE_WINDOW_SECS: i64 = 5;
const FAST_SPIKE_WINDOW_SECS: i64 = 1;
const SHORT_INTERVAL_SECS: u32 = 30;

pub const LABEL_NEAR_SWING: &str = "near swing";
pub const LABEL_NEAR_ROUND: &str = "near round number";
pub const LABEL_NO_SPIKE: &str = "no recent spike";
pub const LABEL_REGIME_ALIGNED: &str = "regime aligned";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingLevels {
    pub high: f64,
    pub low: f64,
}

/// Raw outcome of each check plus the context it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceSignals {
    pub near_swing: bool,
    pub near_round: bool,
    pub no_spike: bool,
    pub regime_aligned: bool,
    pub price: f64,
    pub round_level: f64,
    pub swing: Option<SwingLevels>,
    pub regime: Regime,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceScore {
    pub score: u8,
    pub reasons: Vec<String>,
    pub signals: ConfluenceSignals,
}

/// Highest high and lowest low of the trailing `lookback` candles. `None`
/// with fewer than five candles in the window.
pub fn swing_levels(candles: &[Candle], lookback: usize) -> Option<SwingLevels> {
    let window = &candles[candles.len().saturating_sub(lookback)..];
    if window.len() < SWING_MIN_CANDLES {
        return None;
    }
    let high = window.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    Some(SwingLevels { high, low })
}

/// Closest multiple of `step` to `price`.
pub fn nearest_round(price: f64, step: f64) -> f64 {
    (price / step).round() * step
}

/// True when the first and last observation inside the trailing window differ
/// by at least `threshold`. Fewer than two observations never spike.
pub fn detect_spike(ticks: &[Tick], window_secs: i64, threshold: f64, now_ms: i64) -> bool {
    let since = now_ms - window_secs * 1000;
    let mut recent = ticks.iter().filter(|t| t.timestamp >= since);
    let Some(first) = recent.next() else {
        return false;
    };
    let Some(last) = recent.last() else {
        return false;
    };
    (last.price - first.price).abs() >= threshold
}

fn regime_alignment(regime: &Regime, direction: Direction, interval_secs: u32) -> bool {
    let aligned = match regime.kind {
        RegimeKind::Trend => match direction {
            Direction::High => regime.trend_strength > 0.0,
            Direction::Low => regime.trend_strength < 0.0,
        },
        RegimeKind::Range | RegimeKind::Unknown => true,
    };
    let volatility_block = regime.high_volatility && interval_secs <= SHORT_INTERVAL_SECS;
    aligned && !volatility_block
}

/// Evaluate the four confluence checks for `direction`.
///
/// `ticks` must be the timestamp-sorted observations of `instrument`.
/// Fails with `InsufficientData` when fewer candles exist than the interval
/// requires.
pub fn evaluate_signals(
    ticks: &[Tick],
    instrument: &str,
    interval_secs: u32,
    direction: Direction,
    now_ms: i64,
) -> EngineResult<ConfluenceSignals> {
    let candles = build_candles(ticks, interval_secs);
    let need = min_candles(interval_secs);
    let Some(last) = candles.last().filter(|_| candles.len() >= need) else {
        return Err(EngineError::InsufficientData {
            have: candles.len(),
            need,
        });
    };

    let params: InstrumentParams = params_for(instrument);
    let price = last.close;
    let regime = detect_regime(&candles, &params);
    let swing = swing_levels(&candles, SWING_LOOKBACK);

    let near_swing = swing.is_some_and(|s| {
        (price - s.high).abs().min((price - s.low).abs()) <= params.swing_near
    });

    let round_level = nearest_round(price, params.round_step);
    let near_round = (price - round_level).abs() <= params.round_step * params.round_tolerance;

    let spike_slow = detect_spike(ticks, SPIKE_WINDOW_SECS, params.spike_threshold, now_ms);
    let spike_fast = interval_secs <= SHORT_INTERVAL_SECS
        && detect_spike(ticks, FAST_SPIKE_WINDOW_SECS, params.spike_threshold, now_ms);
    let no_spike = !(spike_slow || spike_fast);

    let regime_aligned = regime_alignment(&regime, direction, interval_secs);

    debug!(
        instrument,
        %direction,
        price,
        near_swing,
        near_round,
        no_spike,
        regime_aligned,
        regime = %regime.kind,
        "confluence evaluated"
    );

    Ok(ConfluenceSignals {
        near_swing,
        near_round,
        no_spike,
        regime_aligned,
        price,
        round_level,
        swing,
        regime,
    })
}

/// Count passing checks and collect their labels.
pub fn score_confluence(
    ticks: &[Tick],
    instrument: &str,
    interval_secs: u32,
    direction: Direction,
    now_ms: i64,
) -> EngineResult<ConfluenceScore> {
    let signals = evaluate_signals(ticks, instrument, interval_secs, direction, now_ms)?;

    let reasons: Vec<String> = [
        (signals.near_swing, LABEL_NEAR_SWING),
        (signals.near_round, LABEL_NEAR_ROUND),
        (signals.no_spike, LABEL_NO_SPIKE),
        (signals.regime_aligned, LABEL_REGIME_ALIGNED),
    ]
    .into_iter()
    .filter(|(ok, _)| *ok)
    .map(|(_, label)| label.to_string())
    .collect();

    Ok(ConfluenceScore {
        score: reasons.len() as u8,
        reasons,
        signals,
    })
}
