//! Basic example of replaying an operation log with `LedgerBatch`.
//!
//! Run with: `cargo run --example basic`

use std::io::Cursor;
use std::sync::Arc;

use ledger_core::store::MemoryStore;
use ledger_core::{LedgerBatch, LedgerConfig};

fn main() -> anyhow::Result<()> {
    // Initialize logger (optional, but shows what's happening)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Sample operations as CSV
    let operations = r"type,user,counterparty,tx,amount
open,1,,,
open,2,,,
open,3,,,
deposit,1,,,500
deposit,2,,,200
transfer,1,2,,200
transfer,2,3,,350
reverse,,,1,
withdraw,3,,,400
transfer,3,1,,100
close,2,,,
";

    let config = LedgerConfig::default();
    let store = Arc::new(MemoryStore::from_config(&config));
    let batch = LedgerBatch::new(store, config);

    let summary = batch.process_operations(Cursor::new(operations))?;
    println!(
        "\n{} operations applied, {} skipped",
        summary.processed, summary.skipped
    );

    println!("\n=== Final Account State ===");
    batch.export_accounts(std::io::stdout())?;

    println!("\n=== Transaction Log ===");
    batch.export_transactions(std::io::stdout())?;

    Ok(())
}
