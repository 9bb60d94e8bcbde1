//! Allowance guarantor for fungible-token campaigns.
//!
//! Runs once per run, before the first batch. Idempotent: an allowance
//! already covering the campaign (e.g. granted by a previous aborted run)
//! is a distinct no-op outcome, so the caller never waits on a transaction
//! that was never sent.

use crate::chain::{ChainAdapter, ChainError, TokenId};
use crate::engine::waiter::{wait_for_transfer, PollPolicy, WaitOutcome};
use crate::engine::EngineError;

/// How the allowance requirement was satisfied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllowanceOutcome {
    /// A sufficient allowance already stood; nothing was sent.
    Sufficient,
    /// An approval was submitted and confirmed, with its observed cost.
    Approved {
        tx_ref: String,
        fee_used: String,
        block_ref: Option<String>,
    },
}

/// Ensure a standing allowance covers `required` (base-unit decimal
/// string) before any transfer batch proceeds.
pub async fn ensure_allowance(
    adapter: &dyn ChainAdapter,
    token: &TokenId,
    required: &str,
    policy: &PollPolicy,
) -> Result<AllowanceOutcome, EngineError> {
    if matches!(token, TokenId::Native) {
        return Ok(AllowanceOutcome::Sufficient);
    }

    if adapter.check_allowance(token, required).await? {
        tracing::debug!("Standing allowance already covers the campaign");
        return Ok(AllowanceOutcome::Sufficient);
    }

    let tx_ref = adapter.approve_allowance(token, required).await?;
    tracing::info!(tx_ref = %tx_ref, "Approval submitted; waiting for confirmation");

    match wait_for_transfer(adapter, &tx_ref, policy).await {
        WaitOutcome::Confirmed { fee_used, block_ref } => Ok(AllowanceOutcome::Approved {
            tx_ref,
            fee_used,
            block_ref,
        }),
        WaitOutcome::Failed(reason) => Err(EngineError::Chain(ChainError::ProgramRejected(
            format!("approval failed: {reason}"),
        ))),
        WaitOutcome::TimedOut => Err(EngineError::Chain(ChainError::Other(
            "approval confirmation timed out".to_string(),
        ))),
    }
}
