// =============================================================================
// Shared types used across the signal engine
// =============================================================================

use serde::{Deserialize, Serialize};

/// Direction of a binary-outcome call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    High,
    Low,
}

impl Direction {
    /// Evaluation order. HIGH comes first and wins probability ties.
    pub const ALL: [Direction; 2] = [Direction::High, Direction::Low];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Low => "LOW",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved result of a recommended trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    pub fn from_win(win: bool) -> Self {
        if win {
            Self::Win
        } else {
            Self::Loss
        }
    }

    pub fn is_win(self) -> bool {
        self == Self::Win
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Win => write!(f, "win"),
            Self::Loss => write!(f, "loss"),
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// First interval boundary at or after `now_ms`, aligned to the epoch.
pub fn next_boundary_ms(now_ms: i64, interval_secs: u32) -> i64 {
    let step = i64::from(interval_secs.max(1)) * 1000;
    now_ms.div_euclid(step) * step + if now_ms.rem_euclid(step) == 0 { 0 } else { step }
}

/// Render a remaining duration as `MM:SS`, rounding seconds up and clamping
/// negative durations to zero.
pub fn format_countdown(ms: i64) -> String {
    let secs = (ms.max(0) + 999) / 1000;
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_serialises_uppercase() {
        assert_eq!(serde_json::to_string(&Direction::High).unwrap(), "\"HIGH\"");
        let d: Direction = serde_json::from_str("\"LOW\"").unwrap();
        assert_eq!(d, Direction::Low);
    }

    #[test]
    fn high_is_evaluated_first() {
        assert_eq!(Direction::ALL[0], Direction::High);
    }

    #[test]
    fn boundary_rounds_up_to_interval() {
        assert_eq!(next_boundary_ms(60_000, 60), 60_000);
        assert_eq!(next_boundary_ms(60_001, 60), 120_000);
        assert_eq!(next_boundary_ms(119_999, 60), 120_000);
        assert_eq!(next_boundary_ms(1_000, 15), 15_000);
    }

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(-5_000), "00:00");
        assert_eq!(format_countdown(1), "00:01");
        assert_eq!(format_countdown(59_001), "01:00");
        assert_eq!(format_countdown(125_000), "02:05");
    }

    #[test]
    fn outcome_from_bool() {
        assert!(Outcome::from_win(true).is_win());
        assert!(!Outcome::from_win(false).is_win());
    }
}
