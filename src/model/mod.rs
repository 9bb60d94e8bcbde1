//! Domain rows and status state machines.
//!
//! # Data Flow
//! ```text
//! store/ reads and writes these rows:
//!     campaign.rs    → one airdrop run, aggregate counters, lifecycle status
//!     recipient.rs   → one (campaign, address) pair with its batch number
//!     transaction.rs → one submitted on-chain operation
//! ```
//!
//! # Design Decisions
//! - Statuses are TEXT-backed enums; transitions go through explicit guards
//! - Amounts are exact base-unit decimal strings, never floats
//! - Aggregate counters on the campaign are a display cache; the recipients
//!   table is the source of truth

pub mod campaign;
pub mod recipient;
pub mod transaction;

pub use campaign::{Campaign, CampaignStatus, ChainFamily};
pub use recipient::{Recipient, RecipientStatus};
pub use transaction::{TxKind, TxRecord, TxStatus};
