//! CareChain Ledger Synchronizer - chain to relational store projection
//!
//! This binary provides:
//! - Live event listening from the medicine-inventory ledger (`listen`)
//! - One-shot historical backfill (`backfill`)
//! - Operator tooling: `status`, `init-db`, `verify-tx`

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};

use carechain_sync::config::Config;
use carechain_sync::listener::{BackfillDriver, HttpLedgerRpc, LedgerRpc};
use carechain_sync::retry::RetryPolicy;
use carechain_sync::storage::Storage;
use carechain_sync::supervisor::Supervisor;
use carechain_sync::SyncError;

#[derive(Parser)]
#[command(name = "carechain-sync")]
#[command(version, about = "CareChain medicine-inventory ledger synchronizer", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "sync.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the synchronizer service (default)
    Listen,

    /// Reprocess history from a starting block, then exit
    Backfill {
        /// Block number to scan from
        from_block: u64,
    },

    /// Show sync progress and database statistics
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://carechain.db")]
        database_url: String,
    },

    /// Probe the receipt of a ledger transaction
    VerifyTx {
        /// Transaction hash (0x-prefixed)
        tx_hash: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.debug);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{:#}", err);
            match err.downcast_ref::<SyncError>() {
                Some(SyncError::Config(_)) => ExitCode::from(2),
                _ => ExitCode::from(1),
            }
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("carechain_sync=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("carechain_sync=info"))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_line_number(true))
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command.unwrap_or(Commands::Listen) {
        Commands::Listen => run_listen(&cli.config).await,
        Commands::Backfill { from_block } => run_backfill(&cli.config, from_block).await,
        Commands::Status => show_status(&cli.config).await,
        Commands::InitDb { database_url } => init_database(&database_url).await,
        Commands::VerifyTx { tx_hash } => verify_tx(&cli.config, &tx_hash).await,
    }
}

/// Open storage per configuration and bring the schema up to date.
async fn open_storage(config: &Config) -> Result<Storage> {
    let storage = Storage::new(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await
    .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Build the HTTP RPC adapter per configuration.
fn build_rpc(config: &Config) -> Result<HttpLedgerRpc> {
    let retry = RetryPolicy::with_max_attempts(config.sync.rpc_max_attempts);
    let rpc = HttpLedgerRpc::new(
        &config.network.rpc_url,
        config.contract.address,
        config.sync.rpc_call_timeout(),
        retry,
    )?;
    Ok(rpc)
}

/// Main service: supervised poller until Ctrl+C or fatal failure.
async fn run_listen(config_path: &str) -> Result<()> {
    info!("Starting synchronizer with config: {}", config_path);

    let config = Config::from_file(config_path)?;

    info!("  RPC URL: {}", config.network.rpc_url);
    info!("  Contract: {}", config.contract.address);
    info!("  Database: {}", config.database.url);
    info!("  Start block: {}", config.sync.start_block);

    let storage = open_storage(&config).await?;

    // Seed the cursor on a fresh database so the first window begins at
    // the configured start block.
    let cursor = storage.get_cursor().await?;
    if cursor.last_processed_block == 0 && config.sync.start_block > 1 {
        info!(
            start_block = config.sync.start_block,
            "Fresh database detected, seeding cursor"
        );
        storage.initialize_cursor(config.sync.start_block).await?;
    } else {
        info!(
            last_processed_block = cursor.last_processed_block,
            "Existing cursor found"
        );
    }

    let rpc = Arc::new(build_rpc(&config)?);
    let mut supervisor = Supervisor::new(rpc, storage.clone(), config.sync.clone());
    supervisor.start();

    info!("Synchronizer is running. Press Ctrl+C to stop.");

    let terminal = tokio::select! {
        result = supervisor.join() => Some(result),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            None
        }
    };

    match terminal {
        Some(result) => {
            storage.close().await;
            match result {
                Ok(()) => {
                    info!("Synchronizer exited");
                    Ok(())
                }
                Err(e) => Err(e).context("Synchronizer failed"),
            }
        }
        None => {
            info!("Received shutdown signal, gracefully shutting down...");
            let stopped = supervisor.stop().await;
            storage.close().await;
            stopped.context("Shutdown failed")?;
            Ok(())
        }
    }
}

/// One-shot backfill from `from_block` to the current safe head.
async fn run_backfill(config_path: &str, from_block: u64) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let storage = open_storage(&config).await?;
    let rpc = Arc::new(build_rpc(&config)?);

    let driver = BackfillDriver::new(rpc, storage.clone(), config.sync.clone());
    let report = driver
        .run(from_block)
        .await
        .context("Backfill failed")?;

    println!("\n=== Backfill Report ===\n");
    println!("Scanned blocks: {} to {}", report.from_block, report.to_block);
    println!("Windows fetched: {}", report.windows);
    println!("Logs fetched: {}", report.fetched);
    println!("Events applied: {}", report.applied);
    println!("Events deduped: {}", report.deduped);
    println!("Decode skips: {}", report.decode_skipped);

    storage.close().await;
    Ok(())
}

/// Show sync progress and database statistics
async fn show_status(config_path: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let storage = open_storage(&config).await?;

    let cursor = storage.get_cursor().await?;
    let stats = storage.stats().await?;

    // Head lookup is best effort; status still prints when the node is down.
    let head = match build_rpc(&config) {
        Ok(rpc) => rpc.head_block().await.ok(),
        Err(_) => None,
    };

    println!("\n=== CareChain Synchronizer Status ===\n");
    println!("Sync Progress:");
    println!("  Last Block: {}", cursor.last_processed_block);
    match head {
        Some(head) => {
            println!("  Head Block: {}", head);
            println!("  Lag: {}", head.saturating_sub(cursor.last_processed_block));
        }
        None => println!("  Head Block: unavailable"),
    }
    println!(
        "  Started: {}",
        chrono::DateTime::from_timestamp(cursor.started_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );
    println!(
        "  Last Advance: {}",
        chrono::DateTime::from_timestamp(cursor.updated_at, 0)
            .map(|dt| dt.to_rfc3339())
            .unwrap_or_else(|| "unknown".to_string())
    );

    println!("\nDatabase Statistics:");
    println!("  Ledger Records: {}", stats.ledger_record_count);
    println!("  Inventory Items: {}", stats.inventory_count);
    println!("  Audit Entries: {}", stats.audit_count);
    println!();

    storage.close().await;
    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = Storage::new(database_url, None, None)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    let stats = storage.stats().await?;
    info!("Database initialized successfully!");
    info!("  Ledger records: {}", stats.ledger_record_count);
    info!("  Inventory items: {}", stats.inventory_count);
    info!("  Audit entries: {}", stats.audit_count);
    info!("  Last block: {}", stats.last_processed_block);

    storage.close().await;
    Ok(())
}

/// Probe the receipt of a ledger transaction
async fn verify_tx(config_path: &str, tx_hash: &str) -> Result<()> {
    let config = Config::from_file(config_path)?;
    let rpc = build_rpc(&config)?;

    let hash = tx_hash
        .parse()
        .with_context(|| format!("Invalid transaction hash: {}", tx_hash))?;

    match rpc.tx_receipt(hash).await.context("Receipt lookup failed")? {
        Some(receipt) => {
            let head = rpc.head_block().await.ok();
            println!("Transaction: 0x{}", hex::encode(hash));
            println!("  Included: {}", receipt.status());
            match receipt.block_number {
                Some(block) => {
                    println!("  Block: {}", block);
                    if let Some(head) = head {
                        println!("  Confirmations: {}", head.saturating_sub(block) + 1);
                    }
                }
                None => println!("  Block: pending"),
            }
        }
        None => println!("Transaction 0x{} not found", hex::encode(hash)),
    }

    Ok(())
}
