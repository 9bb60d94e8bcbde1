//! Recipient row: one (campaign, address) pair.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Recipient payout status.
///
/// PENDING → PROCESSING only via the atomic claim; PROCESSING → SENT|FAILED
/// only once a submission outcome is known; FAILED → PENDING only via the
/// administrative retry. PROCESSING rows older than the staleness window are
/// requeued to PENDING by the next claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(rename_all = "UPPERCASE")]
pub enum RecipientStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl std::fmt::Display for RecipientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecipientStatus::Pending => "PENDING",
            RecipientStatus::Processing => "PROCESSING",
            RecipientStatus::Sent => "SENT",
            RecipientStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One payout destination within a campaign.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Recipient {
    pub id: String,
    pub campaign_id: String,
    pub address: String,
    /// Exact base-unit amount as a decimal string.
    pub amount: String,
    pub status: RecipientStatus,
    /// Reference of the last transfer that covered this recipient.
    pub tx_ref: Option<String>,
    /// Batch assigned at campaign creation, in insertion order.
    pub batch_number: i64,
    /// Set when claimed; used for the staleness requeue.
    pub processing_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
