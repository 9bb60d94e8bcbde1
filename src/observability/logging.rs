//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber exactly once
//! - Default filter from config, environment override wins
//!
//! # Design Decisions
//! - Uses the tracing crate for structured logging
//! - `RUST_LOG` overrides the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the global tracing subscriber.
///
/// `log_level` is used when `RUST_LOG` is not set.
pub fn init(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("airdrop_engine={log_level}").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
