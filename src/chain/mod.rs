//! Chain adapters: the only surface through which the engine touches a
//! ledger.
//!
//! # Data Flow
//! ```text
//! engine/runner.rs
//!     → submit_batch_transfer (one atomic multi-recipient operation)
//!     → transfer_status       (polled by the confirmation waiter)
//!     → check/approve_allowance (token campaigns, once per run)
//!
//! evm.rs    → alloy provider + disperse contract
//! solana.rs → solana RPC client + batched instructions
//! ```
//!
//! # Design Decisions
//! - The engine never branches on chain family beyond choosing which
//!   adapter instance to inject
//! - Adapters map raw RPC failures into the `ChainError` taxonomy; the
//!   classifier decides retry/continue/abort from the variant alone
//! - Resubmission is always a fresh, distinct attempt; the engine never
//!   relies on adapter-level idempotency

pub mod evm;
pub mod solana;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::model::ChainFamily;

/// Token being distributed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenId {
    /// The chain's native token.
    Native,
    /// A fungible token identified by contract (EVM) or mint (Solana).
    Contract(String),
}

impl TokenId {
    pub fn from_optional(address: Option<&str>) -> Self {
        match address {
            Some(a) => TokenId::Contract(a.to_string()),
            None => TokenId::Native,
        }
    }
}

/// One payout within a batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferItem {
    pub address: String,
    /// Base-unit amount, decimal string.
    pub amount: String,
}

/// Settlement status of a submitted transfer, as observed on-ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Not yet final at the required depth/commitment.
    Pending,
    /// Finalized successfully.
    Confirmed {
        /// Fee paid, base-unit decimal string.
        fee_used: String,
        /// Block number or slot, when known.
        block_ref: Option<String>,
    },
    /// Definitively failed on-ledger; no further polling is useful.
    Failed(String),
}

/// Errors raised by chain adapters.
///
/// The variant is the classification input: the error classifier maps it to
/// retry/continue/abort without inspecting messages.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Wallet balance cannot cover principal or fees.
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    /// Fee/gas pricing rejected or over the configured cap.
    #[error("fee pricing rejected: {0}")]
    FeePricing(String),

    /// Nonce/blockhash sequencing conflict.
    #[error("sequencing conflict: {0}")]
    Sequencing(String),

    /// Transport-level failure talking to the RPC endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// RPC request exceeded the adapter timeout.
    #[error("rpc timeout after {0:?}")]
    Timeout(Duration),

    /// The ledger program rejected the operation (revert / instruction
    /// error).
    #[error("program rejected operation: {0}")]
    ProgramRejected(String),

    /// Malformed address or amount in the submitted batch.
    #[error("invalid transfer input: {0}")]
    InvalidInput(String),

    /// Signing key missing or malformed.
    #[error("wallet error: {0}")]
    Wallet(String),

    /// Anything the adapter could not recognize.
    #[error("{0}")]
    Other(String),
}

impl ChainError {
    /// Map a raw RPC error message onto the taxonomy.
    ///
    /// Both families report most conditions only as strings, so this is
    /// substring matching over the well-known phrasings.
    pub fn from_rpc_message(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        let lower = msg.to_lowercase();

        if lower.contains("insufficient funds")
            || lower.contains("insufficient lamports")
            || lower.contains("insufficient balance")
            || lower.contains("would exceed the account balance")
        {
            ChainError::InsufficientFunds(msg)
        } else if lower.contains("underpriced")
            || lower.contains("fee cap")
            || lower.contains("max fee per gas")
            || lower.contains("gas price")
            || lower.contains("priority fee")
        {
            ChainError::FeePricing(msg)
        } else if lower.contains("nonce")
            || lower.contains("blockhash not found")
            || lower.contains("already known")
            || lower.contains("replacement transaction")
        {
            ChainError::Sequencing(msg)
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("transport")
            || lower.contains("reset by peer")
            || lower.contains("too many requests")
            || lower.contains("unavailable")
        {
            ChainError::Network(msg)
        } else if lower.contains("revert")
            || lower.contains("custom program error")
            || lower.contains("instruction error")
            || lower.contains("program failed")
        {
            ChainError::ProgramRejected(msg)
        } else {
            ChainError::Other(msg)
        }
    }
}

/// Black-box interface to one chain family.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// The family this adapter serves.
    fn family(&self) -> ChainFamily;

    /// Submit one atomic multi-recipient transfer. Returns the chain-native
    /// transfer reference. Calling again is a fresh, distinct attempt.
    async fn submit_batch_transfer(
        &self,
        items: &[TransferItem],
        token: &TokenId,
    ) -> Result<String, ChainError>;

    /// Observe a submitted transfer's settlement status.
    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus, ChainError>;

    /// Whether a standing allowance already covers `required`. Families
    /// without an allowance model answer true.
    async fn check_allowance(&self, token: &TokenId, required: &str) -> Result<bool, ChainError>;

    /// Grant a standing allowance; returns the approval's transfer
    /// reference.
    async fn approve_allowance(&self, token: &TokenId, amount: &str) -> Result<String, ChainError>;
}
