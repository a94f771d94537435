use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use ledger_core::{LedgerConfig, SelfTransferPolicy};

#[derive(Parser, Debug)]
#[command(
    name = "ledger-core",
    author,
    version,
    about = "Replay a ledger operation log and print the resulting state",
    long_about = None,
    after_help = "OUTPUT:\n    Results are printed to stdout in CSV format.\n    Use shell redirection to save to a file:\n\n    ledger-core operations.csv > accounts.csv\n    ledger-core --transactions operations.csv > transactions.csv"
)]
pub struct Args {
    /// Path to the input operations CSV file
    #[arg(
        index = 1,
        value_name = "FILE",
        help = "Input CSV file with columns: type, user, counterparty, tx, amount"
    )]
    pub input_file: PathBuf,

    /// Print the transaction log instead of account balances
    #[arg(long)]
    pub transactions: bool,

    /// Longest wait for an account row lock, in milliseconds
    #[arg(long, env = "LEDGER_LOCK_TIMEOUT_MS", default_value_t = 2000)]
    pub lock_timeout_ms: u64,

    /// How to treat transfers from an account to itself
    #[arg(long, env = "LEDGER_SELF_TRANSFER", value_enum, default_value_t = SelfTransferPolicy::Allow)]
    pub self_transfer: SelfTransferPolicy,

    /// Account numbers to try before giving up on opening an account
    #[arg(long, env = "LEDGER_MAX_NUMBER_ATTEMPTS", default_value_t = 16)]
    pub max_number_attempts: u32,
}

impl Args {
    pub fn config(&self) -> LedgerConfig {
        LedgerConfig::default()
            .with_lock_timeout(Duration::from_millis(self.lock_timeout_ms))
            .with_self_transfer(self.self_transfer)
            .with_max_number_attempts(self.max_number_attempts)
    }
}
