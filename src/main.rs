//! Airdrop engine CLI.
//!
//! # Architecture Overview
//!
//! ```text
//!  create ──▶ store (campaign + recipients, batches assigned)
//!
//!  run/resume ──▶ engine loop ──▶ claim batch ──▶ chain adapter
//!                     ▲               │               │ submit
//!                     │               ▼               ▼
//!                 control           store ◀── settle ── waiter (poll)
//!               (ctrl-c → pause)
//!
//!  retry-failed ──▶ store (FAILED → PENDING, guarded by pending tx refs)
//!  status ──▶ store (campaign, counts, transactions)
//! ```
//!
//! One process runs one campaign at a time; everything the loop needs to
//! resume after a crash lives in the SQLite ledger store.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use airdrop_engine::chain::evm::EvmAdapter;
use airdrop_engine::chain::solana::SolanaAdapter;
use airdrop_engine::config::loader::load_config;
use airdrop_engine::model::ChainFamily;
use airdrop_engine::observability;
use airdrop_engine::store::NewCampaign;
use airdrop_engine::{AppConfig, Engine, Store};

#[derive(Parser)]
#[command(name = "airdrop-engine", about = "Batch airdrop campaign execution engine", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a campaign and seed its recipient list.
    Create {
        /// Human-readable campaign name.
        #[arg(long)]
        name: String,

        /// Chain family the campaign executes on.
        #[arg(long, value_enum)]
        family: ChainFamily,

        /// Chain identifier (e.g. "1", "31337", "devnet", "mainnet-beta").
        #[arg(long)]
        chain_id: String,

        /// Token contract or mint address; omit for native transfers.
        #[arg(long)]
        token: Option<String>,

        /// Custodial wallet address funds are sent from.
        #[arg(long)]
        wallet: String,

        /// Recipients per batch.
        #[arg(long, default_value_t = 100)]
        batch_size: i64,

        /// Delay between batches in milliseconds.
        #[arg(long, default_value_t = 1000)]
        batch_delay_ms: i64,

        /// CSV file of `address,amount` lines (base-unit amounts).
        #[arg(long)]
        recipients: PathBuf,
    },

    /// Execute a campaign until it completes, pauses, or fails.
    /// Ctrl-C requests a pause at the next batch boundary.
    Run {
        campaign_id: String,
    },

    /// Resume a paused campaign.
    Resume {
        campaign_id: String,
    },

    /// Requeue FAILED recipients and park the campaign in PAUSED.
    RetryFailed {
        campaign_id: String,
    },

    /// Show a campaign's status, recipient counts, and transactions.
    Status {
        campaign_id: String,

        /// Emit machine-readable JSON instead of the text summary.
        #[arg(long)]
        json: bool,
    },

    /// List all campaigns.
    List,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    observability::logging::init(&config.observability.log_level);
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => observability::metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = Store::connect(&config.database.url, config.database.max_connections).await?;

    match cli.command {
        Command::Create {
            name,
            family,
            chain_id,
            token,
            wallet,
            batch_size,
            batch_delay_ms,
            recipients,
        } => {
            let entries = read_recipients(&recipients)?;
            let campaign = store
                .create_campaign(NewCampaign {
                    name,
                    chain_family: family,
                    chain_id,
                    token_address: token,
                    wallet_address: wallet,
                    batch_size,
                    batch_delay_ms,
                })
                .await?;
            store.insert_recipients(&campaign.id, &entries).await?;
            let campaign = store.get_campaign(&campaign.id).await?;
            println!("created campaign {}", campaign.id);
            println!(
                "  {} recipients in {} batches of up to {}",
                campaign.total_recipients,
                campaign.total_batches(),
                campaign.batch_size
            );
        }

        Command::Run { campaign_id } => {
            let engine = build_engine(store, &config)?;
            run_with_ctrl_c(engine, &campaign_id, false).await?;
        }

        Command::Resume { campaign_id } => {
            let engine = build_engine(store, &config)?;
            run_with_ctrl_c(engine, &campaign_id, true).await?;
        }

        Command::RetryFailed { campaign_id } => {
            let engine = Arc::new(Engine::new(store, config.engine.clone()));
            let reset = engine.retry_failed(&campaign_id).await?;
            println!("requeued {reset} failed recipients; resume the campaign to send them");
        }

        Command::Status { campaign_id, json } => {
            let campaign = store.get_campaign(&campaign_id).await?;
            let counts = store.recipient_counts(&campaign_id).await?;
            let txs = store.transactions_for_campaign(&campaign_id).await?;
            if json {
                let doc = serde_json::json!({
                    "campaign": campaign,
                    "recipients": {
                        "pending": counts.pending,
                        "processing": counts.processing,
                        "sent": counts.sent,
                        "failed": counts.failed,
                    },
                    "transactions": txs,
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
                return Ok(());
            }
            println!("{} ({})", campaign.name, campaign.id);
            println!("  family:  {} / chain {}", campaign.chain_family, campaign.chain_id);
            println!("  status:  {}", campaign.status);
            println!(
                "  recipients: {} total, {} pending, {} processing, {} sent, {} failed",
                counts.total(),
                counts.pending,
                counts.processing,
                counts.sent,
                counts.failed
            );
            println!("  fee spent: {}", campaign.fee_spent);
            println!("  transactions: {}", txs.len());
            for tx in txs {
                println!(
                    "    [{}] {} {} batch={}",
                    tx.status,
                    tx.kind,
                    tx.tx_ref,
                    tx.batch_number.map_or("-".to_string(), |b| b.to_string())
                );
            }
        }

        Command::List => {
            for campaign in store.list_campaigns().await? {
                println!(
                    "{}  {}  {}  {}/{} sent",
                    campaign.id,
                    campaign.status,
                    campaign.name,
                    campaign.completed_recipients,
                    campaign.total_recipients
                );
            }
        }
    }

    Ok(())
}

/// Build an engine with every enabled chain adapter registered.
fn build_engine(store: Store, config: &AppConfig) -> Result<Arc<Engine>, Box<dyn std::error::Error>> {
    let mut engine = Engine::new(store, config.engine.clone());
    if config.evm.enabled {
        engine = engine.with_adapter(Arc::new(EvmAdapter::from_env(config.evm.clone())?));
    }
    if config.solana.enabled {
        engine = engine.with_adapter(Arc::new(SolanaAdapter::new(&config.solana)?));
    }
    Ok(Arc::new(engine))
}

/// Drive a run (or resume) while translating Ctrl-C into a pause request,
/// so the in-flight batch settles before the process exits.
async fn run_with_ctrl_c(
    engine: Arc<Engine>,
    campaign_id: &str,
    resume: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let signal_engine = engine.clone();
    let signal_id = campaign_id.to_string();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!(campaign_id = %signal_id, "Ctrl-C received; requesting pause");
            signal_engine.control().request_pause(&signal_id);
        }
    });

    let result = if resume {
        engine.resume(campaign_id).await
    } else {
        engine.run(campaign_id).await
    };
    signal.abort();
    result?;

    let campaign = engine.store().get_campaign(campaign_id).await?;
    println!(
        "campaign {} finished run in status {} ({} sent, {} failed of {})",
        campaign.id,
        campaign.status,
        campaign.completed_recipients,
        campaign.failed_recipients,
        campaign.total_recipients
    );
    Ok(())
}

/// Parse a recipients CSV: one `address,amount` pair per line, `#` for
/// comments, blank lines ignored.
fn read_recipients(path: &PathBuf) -> Result<Vec<(String, String)>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (address, amount) = line
            .split_once(',')
            .ok_or_else(|| format!("line {}: expected `address,amount`", lineno + 1))?;
        entries.push((address.trim().to_string(), amount.trim().to_string()));
    }
    if entries.is_empty() {
        return Err("recipients file contained no entries".into());
    }
    Ok(entries)
}
