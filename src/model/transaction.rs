//! Transaction record: one row per submitted on-chain operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Kind of on-chain operation the record tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxKind {
    Approval,
    BatchTransfer,
}

impl std::fmt::Display for TxKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxKind::Approval => "APPROVAL",
            TxKind::BatchTransfer => "BATCH_TRANSFER",
        };
        f.write_str(s)
    }
}

/// Settlement status of a submitted operation.
///
/// Created PENDING at submission time, mutated exactly once by the
/// confirmation waiter's terminal observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TxStatus::Pending => "PENDING",
            TxStatus::Confirmed => "CONFIRMED",
            TxStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One submitted on-chain operation. `tx_ref` is globally unique; a
/// resubmission of semantically the same payment is a fresh row with a
/// fresh reference.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TxRecord {
    pub id: String,
    pub campaign_id: String,
    /// Chain-native transfer reference (tx hash / signature).
    pub tx_ref: String,
    pub kind: TxKind,
    pub sender: String,
    pub recipient_count: i64,
    /// Sum of covered amounts, base-unit decimal string.
    pub total_amount: String,
    pub fee_used: Option<String>,
    pub status: TxStatus,
    pub block_ref: Option<String>,
    pub batch_number: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
