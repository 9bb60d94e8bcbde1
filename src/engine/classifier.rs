//! Error classifier: decides whether a batch failure stops the run.
//!
//! The asymmetry is deliberate. A hard wallet-balance failure is the one
//! condition that cannot self-correct: every retry would burn a full
//! confirmation-wait cycle against a run that cannot succeed. Everything
//! else is assumed transient given the inter-batch delay.

use crate::chain::ChainError;

/// What the execution loop should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Pause the campaign; operator intervention required.
    Stop,
    /// Mark the batch FAILED and move on to the next one.
    Continue,
}

/// Classify a chain failure. Returns the disposition and a stable category
/// tag for logs and metrics.
pub fn classify(error: &ChainError) -> (Disposition, &'static str) {
    match error {
        ChainError::InsufficientFunds(_) => (Disposition::Stop, "insufficient-funds"),
        ChainError::FeePricing(_) => (Disposition::Continue, "fee-pricing"),
        ChainError::Sequencing(_) => (Disposition::Continue, "sequencing"),
        ChainError::Network(_) | ChainError::Timeout(_) => (Disposition::Continue, "network"),
        // Flagged for manual inspection by the runner's logging.
        ChainError::ProgramRejected(_) => (Disposition::Continue, "program-rejected"),
        ChainError::InvalidInput(_) => (Disposition::Continue, "invalid-input"),
        // Conservative default: keep going, but logged distinctly.
        ChainError::Wallet(_) | ChainError::Other(_) => (Disposition::Continue, "unrecognized"),
    }
}
