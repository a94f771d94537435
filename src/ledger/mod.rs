//! Ledger module.
//!
//! This module contains the balance-mutation and transaction-recording core:
//! - `Ledger` - Deposits, withdrawals, transfers and reversals
//! - `AccountLifecycle` - Account creation and teardown for users
//! - `store` - Account/transaction store contracts and the in-memory store
//! - `LedgerBatch` - CSV replay of operation logs and CSV export
//! - `Error` types - Business, store and batch errors

mod account;
mod batch;
mod config;
mod engine;
mod error;
mod lifecycle;
mod observer;
mod operation;
pub mod store;
mod transaction;

pub use rust_decimal::Decimal;

pub use account::{Account, AccountId, AccountNumber, AccountRef, UserId};
pub use batch::{BatchSummary, LedgerBatch};
pub use config::{LedgerConfig, SelfTransferPolicy};
pub use engine::Ledger;
pub use error::{Error, LedgerError, OperationError, StoreError};
pub use lifecycle::{AccountClosure, AccountLifecycle, NumberGenerator, RandomNumbers};
pub use observer::{EventKind, LedgerEvent, LedgerObserver, LogObserver, NoopObserver, Outcome};
pub use operation::{Operation, OperationRecord, OperationType};
pub use transaction::{NewTransfer, Transaction, TransactionId, TransactionStatus};
