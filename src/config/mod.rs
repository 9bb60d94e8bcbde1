//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared by the store, engine, and chain adapters
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Wallet keys never live in the config file; adapters load them from
//!   the environment or a keypair file path

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AppConfig;
pub use schema::EngineConfig;
pub use schema::EvmConfig;
pub use schema::SolanaConfig;
