// =============================================================================
// Decision Envelope - Auditable record of every evaluation cycle
// =============================================================================
//
// Every cycle inside the pre-boundary window yields exactly one Decision:
// either a directional recommendation or an abstain carrying the gate that
// stopped it. Insufficiency never surfaces as an error; it lands here as an
// `AbstainReason`.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::learning::BucketKey;
use crate::types::Direction;

/// Confidence reported when abstaining for lack of history.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

/// Ceiling on the confidence of a confluence-rejected candidate, so it never
/// reads as a passing probability.
pub const SHORTFALL_CONFIDENCE_CAP: f64 = 0.79;

/// Gate that stopped a cycle short of a recommendation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbstainReason {
    GuardActive {
        status: String,
    },
    InsufficientSample {
        have: u32,
        need: u32,
    },
    ProbabilityBelowThreshold {
        p: f64,
    },
    InsufficientData {
        have: usize,
        need: usize,
    },
    ConfluenceShortfall {
        score: u8,
        threshold: u8,
        reasons: Vec<String>,
    },
}

impl std::fmt::Display for AbstainReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GuardActive { status } => write!(f, "guard active: {status}"),
            Self::InsufficientSample { have, need } => {
                write!(f, "insufficient sample ({have}/{need})")
            }
            Self::ProbabilityBelowThreshold { p } => {
                write!(f, "probability below threshold ({:.0}% < 80%)", p * 100.0)
            }
            Self::InsufficientData { have, need } => {
                write!(f, "insufficient data ({have}/{need} candles)")
            }
            Self::ConfluenceShortfall {
                score,
                threshold,
                reasons,
            } => {
                write!(f, "confluence shortfall ({score}/{threshold})")?;
                if !reasons.is_empty() {
                    write!(f, ": {}", reasons.join(", "))?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Recommend { direction: Direction },
    Abstain { why: AbstainReason },
}

/// Complete record of one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Unique identifier for this decision (UUID v4).
    pub id: String,

    pub instrument: String,

    pub interval_secs: u32,

    #[serde(flatten)]
    pub verdict: Verdict,

    /// Smoothed win probability backing the verdict, in [0, 1].
    pub confidence: f64,

    /// Human-readable summary of the verdict.
    pub reason: String,

    /// Absent only when the guard short-circuits before the bucket is read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket_key: Option<BucketKey>,

    /// Epoch milliseconds of the evaluation instant.
    pub created_at: i64,
}

impl Decision {
    pub fn recommend(
        instrument: impl Into<String>,
        interval_secs: u32,
        direction: Direction,
        confidence: f64,
        reason: impl Into<String>,
        bucket_key: BucketKey,
        created_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.into(),
            interval_secs,
            verdict: Verdict::Recommend { direction },
            confidence,
            reason: reason.into(),
            bucket_key: Some(bucket_key),
            created_at,
        }
    }

    pub fn abstain(
        instrument: impl Into<String>,
        interval_secs: u32,
        why: AbstainReason,
        confidence: f64,
        bucket_key: Option<BucketKey>,
        created_at: i64,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            instrument: instrument.into(),
            interval_secs,
            reason: why.to_string(),
            verdict: Verdict::Abstain { why },
            confidence,
            bucket_key,
            created_at,
        }
    }

    /// Direction when this is a recommendation.
    pub fn direction(&self) -> Option<Direction> {
        match self.verdict {
            Verdict::Recommend { direction } => Some(direction),
            Verdict::Abstain { .. } => None,
        }
    }

    pub fn abstain_reason(&self) -> Option<&AbstainReason> {
        match &self.verdict {
            Verdict::Recommend { .. } => None,
            Verdict::Abstain { why } => Some(why),
        }
    }
}
