//! Solana chain adapter: batched instructions in one transaction.
//!
//! # Responsibilities
//! - Submit one transaction carrying every payout of a batch
//! - Observe signature status at the configured commitment
//! - Derive and create recipient token accounts idempotently
//!
//! SPL instructions are built directly against the well-known program ids
//! so the token path needs no dependencies beyond the SDK. There is no
//! allowance model on this family: the payer signs transfers directly, so
//! `check_allowance` always answers true.

use std::str::FromStr;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{read_keypair_file, Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::system_program;
use solana_sdk::transaction::Transaction;
use solana_transaction_status::UiTransactionEncoding;
use tokio::time::timeout;

use crate::chain::{ChainAdapter, ChainError, ChainFamily, TokenId, TransferItem, TransferStatus};
use crate::config::SolanaConfig;

const TOKEN_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA");
const ATA_PROGRAM_ID: Pubkey =
    solana_sdk::pubkey!("ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL");

/// SPL Token `Transfer` instruction discriminant.
const TOKEN_IX_TRANSFER: u8 = 3;
/// Associated-token-account `CreateIdempotent` instruction discriminant.
const ATA_IX_CREATE_IDEMPOTENT: u8 = 1;

/// Base fee charged per signature, used when the fee cannot be fetched.
const LAMPORTS_PER_SIGNATURE: u64 = 5_000;

/// Adapter for the Solana chain family.
pub struct SolanaAdapter {
    rpc: RpcClient,
    payer: Keypair,
    commitment: CommitmentConfig,
    timeout_duration: Duration,
}

impl SolanaAdapter {
    /// Create an adapter, loading the payer keypair from the configured
    /// keypair file.
    pub fn new(config: &SolanaConfig) -> Result<Self, ChainError> {
        let payer = read_keypair_file(&config.keypair_path).map_err(|e| {
            ChainError::Wallet(format!("keypair file '{}': {e}", config.keypair_path))
        })?;
        let commitment = parse_commitment(&config.commitment)?;
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let rpc = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            timeout_duration,
            commitment,
        );

        tracing::info!(
            payer = %payer.pubkey(),
            rpc_url = %config.rpc_url,
            commitment = %config.commitment,
            "Solana adapter initialized"
        );

        Ok(Self {
            rpc,
            payer,
            commitment,
            timeout_duration,
        })
    }

    /// The payer public key transfers are funded from.
    pub fn payer_pubkey(&self) -> Pubkey {
        self.payer.pubkey()
    }

    fn build_instructions(
        &self,
        items: &[TransferItem],
        token: &TokenId,
    ) -> Result<Vec<Instruction>, ChainError> {
        let payer = self.payer.pubkey();
        let mut instructions = Vec::new();

        match token {
            TokenId::Native => {
                for item in items {
                    let destination = parse_pubkey(&item.address)?;
                    let lamports = parse_amount(&item.amount)?;
                    instructions.push(system_instruction::transfer(
                        &payer,
                        &destination,
                        lamports,
                    ));
                }
            }
            TokenId::Contract(mint) => {
                let mint = parse_pubkey(mint)?;
                let source = derive_ata(&payer, &mint);
                for item in items {
                    let owner = parse_pubkey(&item.address)?;
                    let amount = parse_amount(&item.amount)?;
                    let destination = derive_ata(&owner, &mint);
                    instructions.push(create_ata_idempotent(&payer, &owner, &mint));
                    instructions.push(token_transfer(&source, &destination, &payer, amount));
                }
            }
        }
        Ok(instructions)
    }
}

fn parse_commitment(s: &str) -> Result<CommitmentConfig, ChainError> {
    match s {
        "processed" => Ok(CommitmentConfig::processed()),
        "confirmed" => Ok(CommitmentConfig::confirmed()),
        "finalized" => Ok(CommitmentConfig::finalized()),
        other => Err(ChainError::InvalidInput(format!(
            "unknown commitment '{other}'"
        ))),
    }
}

fn parse_pubkey(s: &str) -> Result<Pubkey, ChainError> {
    Pubkey::from_str(s).map_err(|e| ChainError::InvalidInput(format!("address '{s}': {e}")))
}

fn parse_amount(s: &str) -> Result<u64, ChainError> {
    s.parse()
        .map_err(|e| ChainError::InvalidInput(format!("amount '{s}': {e}")))
}

/// Associated token account for `owner` and `mint`.
fn derive_ata(owner: &Pubkey, mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[owner.as_ref(), TOKEN_PROGRAM_ID.as_ref(), mint.as_ref()],
        &ATA_PROGRAM_ID,
    )
    .0
}

fn create_ata_idempotent(payer: &Pubkey, owner: &Pubkey, mint: &Pubkey) -> Instruction {
    let ata = derive_ata(owner, mint);
    Instruction {
        program_id: ATA_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*payer, true),
            AccountMeta::new(ata, false),
            AccountMeta::new_readonly(*owner, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(TOKEN_PROGRAM_ID, false),
        ],
        data: vec![ATA_IX_CREATE_IDEMPOTENT],
    }
}

fn token_transfer(source: &Pubkey, destination: &Pubkey, owner: &Pubkey, amount: u64) -> Instruction {
    let mut data = Vec::with_capacity(9);
    data.push(TOKEN_IX_TRANSFER);
    data.extend_from_slice(&amount.to_le_bytes());
    Instruction {
        program_id: TOKEN_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*source, false),
            AccountMeta::new(*destination, false),
            AccountMeta::new_readonly(*owner, true),
        ],
        data,
    }
}

#[async_trait::async_trait]
impl ChainAdapter for SolanaAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    async fn submit_batch_transfer(
        &self,
        items: &[TransferItem],
        token: &TokenId,
    ) -> Result<String, ChainError> {
        if items.is_empty() {
            return Err(ChainError::InvalidInput("empty batch".to_string()));
        }
        let instructions = self.build_instructions(items, token)?;

        let blockhash = match timeout(self.timeout_duration, self.rpc.get_latest_blockhash()).await
        {
            Ok(Ok(hash)) => hash,
            Ok(Err(e)) => return Err(ChainError::from_rpc_message(e.to_string())),
            Err(_) => return Err(ChainError::Timeout(self.timeout_duration)),
        };

        let transaction = Transaction::new_signed_with_payer(
            &instructions,
            Some(&self.payer.pubkey()),
            &[&self.payer],
            blockhash,
        );

        let signature = match timeout(
            self.timeout_duration,
            self.rpc.send_transaction(&transaction),
        )
        .await
        {
            Ok(Ok(sig)) => sig,
            Ok(Err(e)) => return Err(ChainError::from_rpc_message(e.to_string())),
            Err(_) => return Err(ChainError::Timeout(self.timeout_duration)),
        };

        Ok(signature.to_string())
    }

    async fn transfer_status(&self, tx_ref: &str) -> Result<TransferStatus, ChainError> {
        let signature = Signature::from_str(tx_ref)
            .map_err(|e| ChainError::InvalidInput(format!("transfer ref '{tx_ref}': {e}")))?;

        let statuses = match timeout(
            self.timeout_duration,
            self.rpc.get_signature_statuses(&[signature]),
        )
        .await
        {
            Ok(Ok(response)) => response.value,
            Ok(Err(e)) => return Err(ChainError::from_rpc_message(e.to_string())),
            Err(_) => return Err(ChainError::Timeout(self.timeout_duration)),
        };

        let Some(Some(status)) = statuses.into_iter().next() else {
            // Unknown to the cluster: still in flight or dropped. The
            // waiter's ceiling decides when to give up.
            return Ok(TransferStatus::Pending);
        };

        if let Some(err) = status.err {
            return Ok(TransferStatus::Failed(err.to_string()));
        }
        if !status.satisfies_commitment(self.commitment) {
            return Ok(TransferStatus::Pending);
        }

        // Fee lives on the transaction meta; fall back to the base
        // per-signature fee when the lookup fails.
        let fee = match self
            .rpc
            .get_transaction(&signature, UiTransactionEncoding::Base64)
            .await
        {
            Ok(tx) => tx
                .transaction
                .meta
                .map(|meta| meta.fee)
                .unwrap_or(LAMPORTS_PER_SIGNATURE),
            Err(_) => LAMPORTS_PER_SIGNATURE,
        };

        Ok(TransferStatus::Confirmed {
            fee_used: fee.to_string(),
            block_ref: Some(status.slot.to_string()),
        })
    }

    async fn check_allowance(&self, _token: &TokenId, _required: &str) -> Result<bool, ChainError> {
        // The payer signs transfers directly; no delegation is involved.
        Ok(true)
    }

    async fn approve_allowance(&self, _token: &TokenId, _amount: &str) -> Result<String, ChainError> {
        Err(ChainError::InvalidInput(
            "allowance model not used on this family".to_string(),
        ))
    }
}

impl std::fmt::Debug for SolanaAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaAdapter")
            .field("payer", &self.payer.pubkey())
            .field("commitment", &self.commitment)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commitment() {
        assert_eq!(
            parse_commitment("confirmed").unwrap(),
            CommitmentConfig::confirmed()
        );
        assert!(parse_commitment("instant").is_err());
    }

    #[test]
    fn test_token_transfer_instruction_layout() {
        let source = Pubkey::new_unique();
        let destination = Pubkey::new_unique();
        let owner = Pubkey::new_unique();
        let ix = token_transfer(&source, &destination, &owner, 1_000_000);

        assert_eq!(ix.program_id, TOKEN_PROGRAM_ID);
        assert_eq!(ix.data[0], TOKEN_IX_TRANSFER);
        assert_eq!(u64::from_le_bytes(ix.data[1..9].try_into().unwrap()), 1_000_000);
        assert!(ix.accounts[2].is_signer, "owner must sign");
        assert!(!ix.accounts[0].is_signer);
    }

    #[test]
    fn test_ata_derivation_is_deterministic() {
        let owner = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        assert_eq!(derive_ata(&owner, &mint), derive_ata(&owner, &mint));
        assert_ne!(derive_ata(&owner, &mint), derive_ata(&mint, &owner));
    }

    #[test]
    fn test_amount_must_be_integral() {
        assert_eq!(parse_amount("1000").unwrap(), 1000);
        assert!(parse_amount("1.5").is_err());
        assert!(parse_amount("-3").is_err());
    }
}
