//! rollscan indexer - block ingestion for Cosmos-SDK rollups
//!
//! This binary provides:
//! - Block scraping from CometBFT RPC (fast sync, then head following)
//! - Out-of-order preparation with in-order commit
//! - Block, transaction and NFT records in SQLite

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use rollscan_indexer::config::{Config, LoggingConfig};
use rollscan_indexer::node::NodeClient;
use rollscan_indexer::scraper::RpcClient;
use rollscan_indexer::{Collector, LoggingNotifier, Orchestrator, Storage};

#[derive(Parser)]
#[command(name = "rollscan-indexer")]
#[command(version, about = "Block indexer for Cosmos-SDK rollups", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "indexer.toml")]
    config: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the indexer
    Run {
        /// Exit once this height is committed
        #[arg(long)]
        stop_after: Option<i64>,
    },

    /// Show committed height and record counts
    Status,

    /// Initialize the database
    InitDb {
        /// Database URL
        #[arg(long, default_value = "sqlite://rollscan.db")]
        database_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let command = cli.command.unwrap_or(Commands::Run { stop_after: None });
    match command {
        Commands::Run { stop_after } => {
            let config = Config::from_file(&cli.config).context("Failed to load configuration")?;
            init_logging(cli.debug, &config.logging)?;
            info!("rollscan indexer v{}", env!("CARGO_PKG_VERSION"));
            run_indexer(config, stop_after).await?
        }
        Commands::Status => {
            init_logging(cli.debug, &LoggingConfig::default())?;
            show_status(&cli.config).await?
        }
        Commands::InitDb { database_url } => {
            init_logging(cli.debug, &LoggingConfig::default())?;
            init_database(&database_url).await?
        }
    }

    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(debug: bool, config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let env_filter = if debug {
        EnvFilter::new("rollscan_indexer=debug,sqlx=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("rollscan_indexer={}", config.level)))
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    if config.format == "json" {
        registry.with(fmt::layer().json().with_target(true)).init();
    } else {
        registry
            .with(fmt::layer().with_target(true).with_line_number(true))
            .init();
    }

    Ok(())
}

async fn open_storage(url: &str, max: Option<u32>, min: Option<u32>) -> Result<Storage> {
    let storage = Storage::new(url, max, min)
        .await
        .context("Failed to connect to database")?;

    storage
        .run_migrations()
        .await
        .context("Failed to run migrations")?;

    Ok(storage)
}

/// Run the ingestion pipeline until Ctrl+C, a fatal error, or `stop_after`.
async fn run_indexer(config: Config, stop_after: Option<i64>) -> Result<()> {
    info!("Configuration loaded successfully");
    info!("  Chain ID: {}", config.chain.chain_id);
    info!("  VM: {}", config.chain.vm);
    info!("  RPC URL: {}", config.node.rpc_url);
    info!("  REST URL: {}", config.node.rest_url);
    info!("  Database: {}", config.database.url);

    let storage = open_storage(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await?;

    info!("Database initialized");

    let timeout = Duration::from_secs(config.node.timeout_secs);
    let source = Arc::new(
        RpcClient::new(config.node.rpc_url.clone(), timeout)
            .context("Failed to create RPC client")?,
    );
    let querier = Arc::new(NodeClient::new(&config.node).context("Failed to create node client")?);

    let collector = Collector::from_config(
        &config,
        storage.clone(),
        querier,
        Arc::new(LoggingNotifier),
    );
    info!("Submodules: {}", collector.submodule_names().join(", "));

    let mut orchestrator = Orchestrator::new(
        config.chain.chain_id.clone(),
        source,
        Arc::new(collector),
        storage.clone(),
        config.scraper.clone(),
        config.orchestrator.clone(),
    );
    if let Some(height) = stop_after {
        info!("Stopping after height {}", height);
        orchestrator = orchestrator.stop_after(height);
    }

    info!("Indexer is running. Press Ctrl+C to stop.");

    let result = tokio::select! {
        result = orchestrator.run() => result.context("Indexer failed"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl+C")?;
            info!("Received shutdown signal, gracefully shutting down...");
            Ok(())
        }
    };

    storage.close().await;
    result
}

/// Show committed height and record counts
async fn show_status(config_path: &str) -> Result<()> {
    info!("Checking indexer status");

    let config = Config::from_file(config_path).context("Failed to load configuration")?;
    let storage = open_storage(
        &config.database.url,
        Some(config.database.max_connections),
        Some(config.database.min_connections),
    )
    .await?;

    let stats = storage.stats(&config.chain.chain_id).await?;

    println!("\n=== rollscan Indexer Status ===\n");
    println!("Chain:");
    println!("  Chain ID: {}", config.chain.chain_id);
    println!("  VM: {}", config.chain.vm);
    match stats.last_height {
        Some(height) => {
            println!("  Last Committed Height: {}", height);
            if let Some(block) = storage.get_block(&config.chain.chain_id, height).await? {
                println!("  Last Block Hash: {}", block.hash);
                println!(
                    "  Last Block Time: {}",
                    chrono::DateTime::from_timestamp_millis(block.timestamp)
                        .map(|dt| dt.to_rfc3339())
                        .unwrap_or_else(|| "unknown".to_string())
                );
            }
        }
        None => {
            println!("  Nothing committed yet (will start at {})", config.scraper.start_height)
        }
    }

    println!("\nDatabase Statistics:");
    println!("  Blocks: {}", stats.block_count);
    println!("  Transactions: {}", stats.tx_count);
    println!("  Account Links: {}", stats.account_tx_count);
    println!("  NFT Collections: {}", stats.collection_count);
    println!("  NFTs: {}", stats.nft_count);
    println!();

    storage.close().await;

    Ok(())
}

/// Initialize the database
async fn init_database(database_url: &str) -> Result<()> {
    info!("Initializing database: {}", database_url);

    let storage = open_storage(database_url, None, None).await?;

    storage
        .health_check()
        .await
        .context("Database health check failed")?;

    info!("Database initialized successfully!");

    storage.close().await;

    Ok(())
}
