//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! engine + store + adapters produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging with campaign/batch fields on every engine event
//! - Metrics are cheap (atomic increments); exporter is opt-in via config
//! - The progress stream is NOT observability: it is a best-effort
//!   notification surface, the ledger store stays the source of truth

pub mod logging;
pub mod metrics;
