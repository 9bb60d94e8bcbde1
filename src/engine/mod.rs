//! Batch campaign execution engine.
//!
//! # Data Flow
//! ```text
//! runner.rs (per-campaign sequential loop)
//!     → control.rs    (pause/resume/cancel checkpoints, run guard)
//!     → claimer.rs    (atomic PENDING → PROCESSING claim)
//!     → chain adapter (submit batch transfer)
//!     → waiter.rs     (poll until confirmed/failed/timed out)
//!     → store/        (settle recipients, recompute aggregates)
//!     → progress.rs   (best-effort snapshot broadcast)
//!
//! classifier.rs decides per failure: retry next batch, or stop the run.
//! allowance.rs runs once per token-campaign run, before the first batch.
//! ```
//!
//! # Design Decisions
//! - One logical worker per campaign; batches strictly sequential
//! - The ledger store is the only shared mutable state; in-memory flags
//!   are a cache over the status column
//! - A batch already submitted always runs to confirmation; pause and
//!   cancel only prevent the next claim

pub mod allowance;
pub mod claimer;
pub mod classifier;
pub mod control;
pub mod progress;
pub mod runner;
pub mod waiter;

pub use progress::ProgressSnapshot;
pub use runner::Engine;

use thiserror::Error;

use crate::chain::ChainError;
use crate::model::{CampaignStatus, ChainFamily};
use crate::store::StoreError;

/// Errors surfaced by the engine's public operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A run is already active for this campaign in this process.
    #[error("campaign {0} is already executing")]
    AlreadyRunning(String),

    /// An administrative operation's status precondition failed.
    #[error("cannot {op}: campaign {id} is {actual}")]
    InvalidStatus {
        op: &'static str,
        id: String,
        actual: CampaignStatus,
    },

    /// Manual retry refused while submitted transfers are unreconciled.
    #[error(
        "campaign {0} has pending transaction records; reconcile them before retrying failed recipients"
    )]
    UnreconciledTransactions(String),

    /// No adapter registered for the campaign's chain family.
    #[error("no chain adapter registered for family {0}")]
    NoAdapter(ChainFamily),

    /// Ledger store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Chain adapter failure that escaped classification handling.
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
}
