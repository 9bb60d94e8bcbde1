//! Batch airdrop campaign execution engine.
//!
//! Distributes tokens from a custodial wallet to large recipient lists in
//! bounded batches, across EVM and Solana chain families, with durable
//! resumability and no double payment.

pub mod chain;
pub mod config;
pub mod engine;
pub mod model;
pub mod observability;
pub mod store;

pub use config::schema::AppConfig;
pub use engine::Engine;
pub use store::Store;
