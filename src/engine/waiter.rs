//! Confirmation waiter: polls a submitted transfer until it settles.
//!
//! The poll interval starts sub-second and widens with jitter towards a
//! cap; the overall wait is bounded by a family-specific ceiling. A
//! definitive on-ledger failure terminates the wait immediately.

use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, Instant};

use crate::chain::{ChainAdapter, ChainFamily, TransferStatus};
use crate::config::EngineConfig;

/// Family-specific polling schedule.
#[derive(Debug, Clone)]
pub struct PollPolicy {
    /// First interval after submission.
    pub initial: Duration,
    /// Cap the interval widens towards.
    pub max_interval: Duration,
    /// Total wait ceiling; breach yields `TimedOut`.
    pub ceiling: Duration,
}

impl PollPolicy {
    pub fn for_family(family: ChainFamily, config: &EngineConfig) -> Self {
        let ceiling = match family {
            ChainFamily::Evm => Duration::from_secs(config.evm_confirm_ceiling_secs),
            ChainFamily::Solana => Duration::from_secs(config.solana_confirm_ceiling_secs),
        };
        Self {
            initial: Duration::from_millis(config.poll_initial_ms),
            max_interval: Duration::from_millis(config.poll_max_ms),
            ceiling,
        }
    }
}

/// Terminal outcome of one confirmation wait.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome {
    Confirmed {
        fee_used: String,
        block_ref: Option<String>,
    },
    /// Definitively failed on-ledger.
    Failed(String),
    /// Ceiling breached. The transfer may still land later; recipients are
    /// marked FAILED but the transaction record stays PENDING so a manual
    /// retry is blocked until the reference is reconciled.
    TimedOut,
}

/// Poll `tx_ref` until it settles or the policy ceiling is reached.
///
/// Status-poll errors are logged and absorbed: a flaky RPC read must not
/// fail a transfer that is still confirming.
pub async fn wait_for_transfer(
    adapter: &dyn ChainAdapter,
    tx_ref: &str,
    policy: &PollPolicy,
) -> WaitOutcome {
    let started = Instant::now();
    let mut interval = policy.initial;

    loop {
        if started.elapsed() >= policy.ceiling {
            return WaitOutcome::TimedOut;
        }
        sleep(interval).await;

        match adapter.transfer_status(tx_ref).await {
            Ok(TransferStatus::Pending) => {}
            Ok(TransferStatus::Confirmed { fee_used, block_ref }) => {
                return WaitOutcome::Confirmed { fee_used, block_ref };
            }
            Ok(TransferStatus::Failed(reason)) => return WaitOutcome::Failed(reason),
            Err(e) => {
                tracing::warn!(tx_ref = %tx_ref, error = %e, "Status poll failed; will retry");
            }
        }

        interval = next_interval(interval, policy.max_interval);
    }
}

/// Widen the interval by half again, capped, with up to 10% jitter.
fn next_interval(current: Duration, max: Duration) -> Duration {
    let grown_ms = (current.as_millis() as u64).saturating_mul(3) / 2;
    let capped_ms = grown_ms.min(max.as_millis() as u64).max(1);

    let jitter_range = capped_ms / 10;
    let jitter = if jitter_range > 0 {
        rand::thread_rng().gen_range(0..jitter_range)
    } else {
        0
    };
    Duration::from_millis(capped_ms.saturating_add(jitter)).min(max)
}
