//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, multipliers sane)
//! - Check adapter settings are complete when the adapter is enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use crate::config::schema::AppConfig;

/// A single semantic validation failure.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn err(field: &str, message: impl Into<String>) -> ValidationError {
    ValidationError {
        field: field.to_string(),
        message: message.into(),
    }
}

/// Validate the full configuration, collecting every failure.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.database.url.is_empty() {
        errors.push(err("database.url", "must not be empty"));
    }
    if config.database.max_connections == 0 {
        errors.push(err("database.max_connections", "must be at least 1"));
    }

    if config.engine.stale_after_secs == 0 {
        errors.push(err("engine.stale_after_secs", "must be greater than zero"));
    }
    if config.engine.poll_initial_ms == 0 {
        errors.push(err("engine.poll_initial_ms", "must be greater than zero"));
    }
    if config.engine.poll_max_ms < config.engine.poll_initial_ms {
        errors.push(err(
            "engine.poll_max_ms",
            "must be at least engine.poll_initial_ms",
        ));
    }
    if config.engine.evm_confirm_ceiling_secs == 0 {
        errors.push(err("engine.evm_confirm_ceiling_secs", "must be greater than zero"));
    }
    if config.engine.solana_confirm_ceiling_secs == 0 {
        errors.push(err(
            "engine.solana_confirm_ceiling_secs",
            "must be greater than zero",
        ));
    }

    if config.evm.enabled {
        if config.evm.rpc_url.parse::<url::Url>().is_err() {
            errors.push(err("evm.rpc_url", "not a valid URL"));
        }
        for (i, failover) in config.evm.failover_urls.iter().enumerate() {
            if failover.parse::<url::Url>().is_err() {
                errors.push(err(&format!("evm.failover_urls[{i}]"), "not a valid URL"));
            }
        }
        if config.evm.gas_price_multiplier < 1.0 {
            errors.push(err("evm.gas_price_multiplier", "must be at least 1.0"));
        }
        if config.evm.max_gas_price_gwei == 0 {
            errors.push(err("evm.max_gas_price_gwei", "must be greater than zero"));
        }
        if config.evm.disperse_address.is_empty() {
            errors.push(err("evm.disperse_address", "required when evm is enabled"));
        }
    }

    if config.solana.enabled {
        if config.solana.rpc_url.parse::<url::Url>().is_err() {
            errors.push(err("solana.rpc_url", "not a valid URL"));
        }
        if !matches!(
            config.solana.commitment.as_str(),
            "processed" | "confirmed" | "finalized"
        ) {
            errors.push(err(
                "solana.commitment",
                "must be one of processed, confirmed, finalized",
            ));
        }
        if config.solana.keypair_path.is_empty() {
            errors.push(err("solana.keypair_path", "required when solana is enabled"));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_enabled_evm_requires_disperse_address() {
        let mut config = AppConfig::default();
        config.evm.enabled = true;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "evm.disperse_address"));
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = AppConfig::default();
        config.database.url = String::new();
        config.engine.stale_after_secs = 0;
        config.solana.enabled = true;
        config.solana.commitment = "instant".to_string();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.len() >= 4, "got: {errors:?}");
    }
}
