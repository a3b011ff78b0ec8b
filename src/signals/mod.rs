// =============================================================================
// Signals Module
// =============================================================================
//
// Confluence scoring: independent technical checks that must agree before a
// statistically favoured direction is recommended.

pub mod confluence;

pub use confluence::{score_confluence, ConfluenceScore, ConfluenceSignals};
