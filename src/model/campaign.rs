//! Campaign row and lifecycle state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Supported ledger families, each served by its own chain adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Account/nonce-based ledgers (EVM).
    Evm,
    /// Signature/slot-based ledger with sub-second finality.
    Solana,
}

impl std::fmt::Display for ChainFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainFamily::Evm => write!(f, "evm"),
            ChainFamily::Solana => write!(f, "solana"),
        }
    }
}

/// Campaign lifecycle status.
///
/// # State Transitions
/// ```text
/// CREATED → READY → SENDING → {PAUSED, COMPLETED, FAILED}
/// PAUSED → SENDING            (resume)
/// PAUSED → COMPLETED          (resume with zero pending)
/// {COMPLETED, FAILED} → PAUSED (administrative retry of failed recipients)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum CampaignStatus {
    Created,
    Ready,
    Sending,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    /// Whether `self → next` is a legal lifecycle transition.
    pub fn can_transition(self, next: CampaignStatus) -> bool {
        use CampaignStatus::*;
        matches!(
            (self, next),
            (Created, Ready)
                | (Ready, Sending)
                | (Sending, Paused)
                | (Sending, Completed)
                | (Sending, Failed)
                | (Paused, Sending)
                | (Paused, Completed)
                | (Completed, Paused)
                | (Failed, Paused)
        )
    }
}

impl std::fmt::Display for CampaignStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CampaignStatus::Created => "CREATED",
            CampaignStatus::Ready => "READY",
            CampaignStatus::Sending => "SENDING",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Completed => "COMPLETED",
            CampaignStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One airdrop run targeting a fixed recipient list.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub chain_family: ChainFamily,
    /// Numeric chain id for EVM, cluster moniker for Solana.
    pub chain_id: String,
    /// Contract/mint address, or NULL for the native token.
    pub token_address: Option<String>,
    /// Custodial wallet the transfers are paid from.
    pub wallet_address: String,
    pub batch_size: i64,
    /// Fixed delay between settled batches.
    pub batch_delay_ms: i64,
    pub status: CampaignStatus,
    pub total_recipients: i64,
    pub completed_recipients: i64,
    pub failed_recipients: i64,
    /// Cumulative fee usage in base units, decimal string.
    pub fee_spent: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    /// Total number of batches the recipient list was split into.
    pub fn total_batches(&self) -> i64 {
        if self.batch_size <= 0 {
            return 0;
        }
        (self.total_recipients + self.batch_size - 1) / self.batch_size
    }

    /// Whether this campaign pays out a fungible token rather than the
    /// native one.
    pub fn is_token_campaign(&self) -> bool {
        self.token_address.is_some()
    }
}
