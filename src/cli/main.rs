mod commands;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use commands::Args;
use ledger_core::store::MemoryStore;
use ledger_core::LedgerBatch;

fn main() -> Result<()> {
    // Parse the CLI arguments
    let args = Args::parse();

    // Initialize logger with default level of info (can be overridden with RUST_LOG)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // 1. Build the store and the batch driver
    let config = args.config();
    let store = Arc::new(MemoryStore::from_config(&config));
    let batch = LedgerBatch::new(store, config);

    // 2. Open and replay the input file
    log::info!("Processing operations from {}", args.input_file.display());
    let file = std::fs::File::open(&args.input_file)
        .with_context(|| format!("Failed to open input file: {}", args.input_file.display()))?;

    let summary = batch
        .process_operations(file)
        .context("Failed to process operations")?;

    log::info!(
        "Processing complete ({} processed, {} skipped), exporting",
        summary.processed,
        summary.skipped
    );

    // 3. Export the requested state to stdout
    if args.transactions {
        batch
            .export_transactions(std::io::stdout())
            .context("Failed to export transactions to stdout")?;
    } else {
        batch
            .export_accounts(std::io::stdout())
            .context("Failed to export accounts to stdout")?;
    }

    log::info!("Export complete");

    Ok(())
}
