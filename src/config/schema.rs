//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the airdrop engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Ledger store settings.
    pub database: DatabaseConfig,

    /// Execution loop tuning.
    pub engine: EngineConfig,

    /// EVM chain family adapter settings.
    pub evm: EvmConfig,

    /// Solana chain family adapter settings.
    pub solana: SolanaConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Ledger store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite connection URL (e.g., "sqlite://airdrop.db?mode=rwc").
    pub url: String,

    /// Maximum pooled connections.
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://airdrop.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// Execution loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Recipients stuck in PROCESSING longer than this are requeued to
    /// PENDING by the next claim.
    pub stale_after_secs: u64,

    /// First confirmation poll interval after submission.
    pub poll_initial_ms: u64,

    /// Ceiling the poll interval widens towards.
    pub poll_max_ms: u64,

    /// Confirmation wait ceiling for the EVM family.
    pub evm_confirm_ceiling_secs: u64,

    /// Confirmation wait ceiling for the Solana family.
    pub solana_confirm_ceiling_secs: u64,

    /// Buffered progress snapshots per subscriber.
    pub progress_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 600,
            poll_initial_ms: 500,
            poll_max_ms: 5_000,
            evm_confirm_ceiling_secs: 300,
            solana_confirm_ceiling_secs: 90,
            progress_capacity: 64,
        }
    }
}

/// EVM chain adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EvmConfig {
    /// Enable the EVM adapter.
    pub enabled: bool,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    #[serde(default)]
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 1 for Ethereum mainnet, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Number of block confirmations required for finality.
    pub confirmation_blocks: u32,

    /// Gas price multiplier (1.0 = estimated, 1.2 = 20% buffer).
    pub gas_price_multiplier: f64,

    /// Maximum gas price in gwei (protection against spikes).
    pub max_gas_price_gwei: u64,

    /// Address of the deployed disperse contract used for batch transfers.
    pub disperse_address: String,
}

impl Default for EvmConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 1,
            rpc_timeout_secs: 10,
            confirmation_blocks: 3,
            gas_price_multiplier: 1.2,
            max_gas_price_gwei: 500,
            disperse_address: String::new(),
        }
    }
}

/// Solana chain adapter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SolanaConfig {
    /// Enable the Solana adapter.
    pub enabled: bool,

    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,

    /// Commitment level transfers must reach ("processed", "confirmed",
    /// "finalized").
    pub commitment: String,

    /// Path to the payer keypair file (standard JSON byte array).
    pub keypair_path: String,
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            rpc_url: "https://api.devnet.solana.com".to_string(),
            rpc_timeout_secs: 30,
            commitment: "confirmed".to_string(),
            keypair_path: String::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.stale_after_secs, 600);
        assert!(config.engine.evm_confirm_ceiling_secs > config.engine.solana_confirm_ceiling_secs);
        assert!(!config.evm.enabled);
        assert!(!config.solana.enabled);
        assert_eq!(config.database.max_connections, 5);
    }

    #[test]
    fn test_minimal_toml() {
        let config: AppConfig = toml::from_str(
            r#"
            [evm]
            enabled = true
            chain_id = 31337
            disperse_address = "0xD152f549545093347A162Dce210e7293f1452150"
            "#,
        )
        .unwrap();
        assert!(config.evm.enabled);
        assert_eq!(config.evm.chain_id, 31337);
        // Untouched sections keep their defaults.
        assert_eq!(config.solana.commitment, "confirmed");
    }
}
