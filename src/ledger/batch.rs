use std::io::{Read, Write};
use std::sync::Arc;

use super::config::LedgerConfig;
use super::engine::Ledger;
use super::error::{Error, LedgerError};
use super::lifecycle::AccountLifecycle;
use super::observer::LedgerObserver;
use super::operation::{Operation, OperationRecord};
use super::store::LedgerStore;

/// Counts from one `process_operations` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub processed: u64,
    pub skipped: u64,
}

/// Replays CSV operation logs against a ledger and exports its state.
///
/// Users in the input are mapped to their single account, so a log can be
/// written without knowing the ids or numbers the store will assign.
#[derive(Debug)]
pub struct LedgerBatch<S> {
    ledger: Ledger<S>,
    lifecycle: AccountLifecycle<S>,
}

impl<S: LedgerStore> LedgerBatch<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            ledger: Ledger::new(Arc::clone(&store), config.clone()),
            lifecycle: AccountLifecycle::new(store, config),
        }
    }

    pub fn with_observer(self, observer: Arc<dyn LedgerObserver>) -> Self {
        Self {
            ledger: self.ledger.with_observer(Arc::clone(&observer)),
            lifecycle: self.lifecycle.with_observer(observer),
        }
    }

    pub fn ledger(&self) -> &Ledger<S> {
        &self.ledger
    }

    pub fn lifecycle(&self) -> &AccountLifecycle<S> {
        &self.lifecycle
    }

    /// Replay an operation log from any reader.
    ///
    /// Malformed rows abort the run; rows the ledger rejects are logged and
    /// skipped. `csv` buffers its input internally, so pass the raw reader.
    pub fn process_operations<R: Read>(&self, reader: R) -> Result<BatchSummary, Error> {
        log::info!("Starting operation processing");

        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut summary = BatchSummary::default();

        for result in csv_reader.deserialize() {
            let record: OperationRecord = result?;

            let row_num = summary.processed + summary.skipped + 1;
            log::trace!("[row {row_num}] Parsing: {record}");

            let operation = Operation::try_from(record)?;

            if let Err(e) = self.apply(&operation) {
                log::warn!("[row {row_num}] - Skipped {operation}: {e}");
                summary.skipped += 1;
            } else {
                summary.processed += 1;
            }
        }

        log::info!(
            "Processing complete: {} processed, {} skipped",
            summary.processed,
            summary.skipped
        );
        Ok(summary)
    }

    /// Write every account as CSV, ordered by id. Output is buffered by the
    /// `csv` writer and flushed before returning.
    pub fn export_accounts<W: Write>(&self, writer: W) -> Result<(), Error> {
        let accounts = self.ledger.accounts()?;
        log::info!("Exporting {} accounts", accounts.len());

        let mut csv_writer = csv::Writer::from_writer(writer);
        for account in &accounts {
            csv_writer.serialize(account)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    /// Write every transaction to any sink as CSV, ordered by id.
    pub fn export_transactions<W: Write>(&self, writer: W) -> Result<(), Error> {
        let transactions = self.ledger.transactions()?;
        log::info!("Exporting {} transactions", transactions.len());

        let mut csv_writer = csv::Writer::from_writer(writer);
        for transaction in &transactions {
            csv_writer.serialize(transaction)?;
        }
        csv_writer.flush()?;
        Ok(())
    }

    fn apply(&self, operation: &Operation) -> Result<(), LedgerError> {
        log::trace!("Applying operation: {operation}");
        match *operation {
            Operation::Open { user } => {
                self.lifecycle.open_account(user)?;
            }
            Operation::Close { user } => {
                self.lifecycle
                    .close_account(user)?
                    .ok_or(LedgerError::OwnerAccountNotFound { owner: user })?;
            }
            Operation::Deposit { user, amount } => {
                let account = self.ledger.account_for_owner(user)?;
                self.ledger.deposit(account.id(), amount)?;
            }
            Operation::Withdraw { user, amount } => {
                let account = self.ledger.account_for_owner(user)?;
                self.ledger.withdraw(account.id(), amount)?;
            }
            Operation::Transfer {
                user,
                counterparty,
                amount,
            } => {
                let sender = self.ledger.account_for_owner(user)?;
                let receiver = self.ledger.account_for_owner(counterparty)?;
                self.ledger.transfer(sender.id(), receiver.id(), amount)?;
            }
            Operation::Reverse { tx } => {
                self.ledger.reverse_transaction(tx)?;
            }
        }
        Ok(())
    }
}
