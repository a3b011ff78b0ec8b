// =============================================================================
// Engine error taxonomy
// =============================================================================
//
// Insufficiency of samples, candles or confluence never surfaces as an error
// from the decision engine; those become abstain verdicts. `InsufficientData`
// exists for the lower-level scorers that the engine folds into an abstain.

use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient data: {have}/{need} candles")]
    InsufficientData { have: usize, need: usize },

    #[error("no pending entry plan to attach the outcome to")]
    NoPendingPlan,

    #[error("storage unavailable for '{key}': {reason}")]
    StorageUnavailable { key: String, reason: String },
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        Self::StorageUnavailable {
            key: err.key().to_string(),
            reason: err.to_string(),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
