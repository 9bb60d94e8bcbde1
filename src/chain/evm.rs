//! EVM chain adapter: disperse-contract batch transfers over alloy.
//!
//! # Responsibilities
//! - Submit batch transfers through a deployed disperse contract
//! - Observe receipts at the configured confirmation depth
//! - Manage the ERC-20 allowance the disperse contract spends
//! - Handle RPC timeouts and failover for read paths
//!
//! # Security
//! - The private key is loaded ONLY from the environment
//! - Keys are never logged or serialized

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alloy::network::{EthereumWallet, TransactionBuilder};
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use tokio::time::timeout;

use crate::chain::{ChainAdapter, ChainError, ChainFamily, TokenId, TransferItem, TransferStatus};
use crate::config::EvmConfig;

/// Environment variable name for the custodial wallet's private key.
pub const PRIVATE_KEY_ENV_VAR: &str = "AIRDROP_EVM_PRIVATE_KEY";

sol! {
    function disperseEther(address[] recipients, uint256[] values) external payable;
    function disperseToken(address token, address[] recipients, uint256[] values) external;
    function allowance(address owner, address spender) external view returns (uint256);
    function approve(address spender, uint256 amount) external returns (bool);
}

/// Adapter for account/nonce-based EVM ledgers.
pub struct EvmAdapter {
    /// Primary provider carries the signer; failovers are read-only.
    providers: Vec<Arc<dyn Provider + Send + Sync>>,
    disperse: Address,
    wallet_address: Address,
    config: EvmConfig,
    timeout_duration: Duration,
}

impl EvmAdapter {
    /// Create an adapter, loading the signing key from
    /// `AIRDROP_EVM_PRIVATE_KEY`.
    pub fn from_env(config: EvmConfig) -> Result<Self, ChainError> {
        let private_key = std::env::var(PRIVATE_KEY_ENV_VAR).map_err(|_| {
            ChainError::Wallet(format!("environment variable {PRIVATE_KEY_ENV_VAR} not set"))
        })?;
        Self::new(config, &private_key)
    }

    /// Create an adapter from a hex private key (with or without 0x prefix).
    pub fn new(config: EvmConfig, private_key_hex: &str) -> Result<Self, ChainError> {
        let key_hex = private_key_hex
            .strip_prefix("0x")
            .unwrap_or(private_key_hex);
        let signer: PrivateKeySigner = key_hex
            .parse()
            .map_err(|e| ChainError::Wallet(format!("invalid private key format: {e}")))?;
        let wallet_address = signer.address();
        let wallet = EthereumWallet::from(signer);

        let disperse: Address = config
            .disperse_address
            .parse()
            .map_err(|e| ChainError::InvalidInput(format!("disperse address: {e}")))?;

        let primary: url::Url = config
            .rpc_url
            .parse()
            .map_err(|e| ChainError::InvalidInput(format!("rpc url '{}': {e}", config.rpc_url)))?;
        let mut providers: Vec<Arc<dyn Provider + Send + Sync>> = vec![Arc::new(
            ProviderBuilder::new()
                .wallet(wallet)
                .connect_http(primary),
        )];
        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)));
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        tracing::info!(
            address = %wallet_address,
            chain_id = config.chain_id,
            disperse = %disperse,
            "EVM adapter initialized"
        );

        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        Ok(Self {
            providers,
            disperse,
            wallet_address,
            config,
            timeout_duration,
        })
    }

    /// The custodial wallet address transfers are paid from.
    pub fn wallet_address(&self) -> Address {
        self.wallet_address
    }

    /// Current gas price, checked against the configured cap and scaled by
    /// the configured multiplier.
    async fn priced_gas(&self) -> Result<u128, ChainError> {
        let gas_price = self.read(|p| async move { p.get_gas_price().await }).await?;
        let gas_price_gwei = gas_price / 1_000_000_000;
        if gas_price_gwei > self.config.max_gas_price_gwei as u128 {
            return Err(ChainError::FeePricing(format!(
                "gas price {gas_price_gwei} gwei exceeds maximum {} gwei",
                self.config.max_gas_price_gwei
            )));
        }
        Ok((gas_price as f64 * self.config.gas_price_multiplier) as u128)
    }

    /// Run a read-only call against each provider in turn until one answers
    /// within the timeout.
    async fn read<'a, T, F, Fut>(&'a self, call: F) -> Result<T, ChainError>
    where
        F: Fn(&'a (dyn Provider + Send + Sync)) -> Fut,
        Fut: std::future::Future<Output = Result<T, alloy::transports::TransportError>> + 'a,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, call(provider.as_ref())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, "RPC timeout, trying next provider");
                }
            }
        }
        Err(ChainError::Network("all RPC providers failed".to_string()))
    }

    /// Submit a transaction through the primary (signing) provider.
    async fn send(&self, tx: TransactionRequest) -> Result<String, ChainError> {
        let fut = self.providers[0].send_transaction(tx);
        let pending = match timeout(self.timeout_duration, fut).await {
            Ok(Ok(pending)) => pending,
            Ok(Err(e)) => return Err(ChainError::from_rpc_message(e.to_string())),
            Err(_) => return Err(ChainError::Timeout(self.timeout_duration)),
        };
        Ok(format!("{:#x}", pending.tx_hash()))
    }
}

/// Parse payout items into address/value vectors plus their sum.
fn parse_items(items: &[TransferItem]) -> Result<(Vec<Address>, Vec<U256>, U256), ChainError> {
    let mut recipients = Vec::with_capacity(items.len());
    let mut values = Vec::with_capacity(items.len());
    let mut total = U256::ZERO;
    for item in items {
        let address = Address::from_str(&item.address)
            .map_err(|e| ChainError::InvalidInput(format!("address '{}': {e}", item.address)))?;
        let value = U256::from_str(&item.amount)
            .map_err(|e| ChainError::InvalidInput(format!("amount '{}': {e}", item.amount)))?;
        total = total
            .checked_add(value)
            .ok_or_else(|| ChainError::InvalidInput("amount sum overflow".to_string()))?;
        recipients.push(address);
        values.push(value);
    }
    Ok((recipients, values, total))
}

#[async_trait::async_trait]
impl ChainAdapter for EvmAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn submit_batch_transfer(
        &self,
        items: &[TransferItem],
        token: &TokenId,
    ) -> Result<String, ChainError> {
        if items.is_empty() {
            return Err(ChainError::InvalidInput("empty batch".to_string()));
        }
        let (recipients, values, total) = parse_items(items)?;
        let gas_price = self.priced_gas().await?;

        let tx = match token {
            TokenId::Native => {
                let call = disperseEtherCall { recipients, values };
                TransactionRequest::default()
                    .with_to(self.disperse)
                    .with_value(total)
                    .with_input(call.abi_encode())
            }
            TokenId::Contract(address) => {
                let token: Address = address
                    .parse()
                    .map_err(|e| ChainError::InvalidInput(format!("token '{address}': {e}")))?;
                let call = disperseTokenCall {
                    token,
                    recipients,
                    values,
                };
                TransactionRequest::default()
                    .with_to(self.disperse)
                    .with_input(call.abi_encode())
            }
        }
        .with_gas_price(gas_price);

        self.send(tx).await
    }

    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus, ChainError> {
        let tx_hash = TxHash::from_str(tx_ref)
            .map_err(|e| ChainError::InvalidInput(format!("transfer ref '{tx_ref}': {e}")))?;

        let receipt = self
            .read(move |p| async move { p.get_transaction_receipt(tx_hash).await })
            .await?;
        let Some(receipt) = receipt else {
            return Ok(TransferStatus::Pending);
        };

        if !receipt.status() {
            return Ok(TransferStatus::Failed("execution reverted".to_string()));
        }

        let current_block = self
            .read(|p| async move { p.get_block_number().await })
            .await?;
        let tx_block = receipt.block_number.unwrap_or(current_block);
        let confirmations = current_block.saturating_sub(tx_block) as u32;
        if confirmations < self.config.confirmation_blocks {
            return Ok(TransferStatus::Pending);
        }

        let fee_used = (receipt.gas_used as u128).saturating_mul(receipt.effective_gas_price);
        Ok(TransferStatus::Confirmed {
            fee_used: fee_used.to_string(),
            block_ref: Some(tx_block.to_string()),
        })
    }

    async fn check_allowance(&self, token: &TokenId, required: &str) -> Result<bool, ChainError> {
        let TokenId::Contract(address) = token else {
            return Ok(true);
        };
        let token: Address = address
            .parse()
            .map_err(|e| ChainError::InvalidInput(format!("token '{address}': {e}")))?;
        let required = U256::from_str(required)
            .map_err(|e| ChainError::InvalidInput(format!("required '{required}': {e}")))?;

        let call = allowanceCall {
            owner: self.wallet_address,
            spender: self.disperse,
        };
        let request = TransactionRequest::default()
            .with_to(token)
            .with_input(call.abi_encode());
        let bytes = self
            .read(move |p| {
                let request = request.clone();
                async move { p.call(request).await }
            })
            .await?;
        let granted = allowanceCall::abi_decode_returns(&bytes)
            .map_err(|e| ChainError::Other(format!("allowance decode: {e}")))?;

        Ok(granted >= required)
    }

    async fn approve_allowance(&self, token: &TokenId, amount: &str) -> Result<String, ChainError> {
        let TokenId::Contract(address) = token else {
            return Err(ChainError::InvalidInput(
                "native token needs no allowance".to_string(),
            ));
        };
        let token: Address = address
            .parse()
            .map_err(|e| ChainError::InvalidInput(format!("token '{address}': {e}")))?;
        let amount = U256::from_str(amount)
            .map_err(|e| ChainError::InvalidInput(format!("amount '{amount}': {e}")))?;

        let call = approveCall {
            spender: self.disperse,
            amount,
        };
        let gas_price = self.priced_gas().await?;
        let tx = TransactionRequest::default()
            .with_to(token)
            .with_input(call.abi_encode())
            .with_gas_price(gas_price);

        self.send(tx).await
    }
}

impl std::fmt::Debug for EvmAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvmAdapter")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("disperse", &self.disperse)
            .finish()
    }
}
