use std::time::Duration;

use crate::ledger::account::{AccountId, AccountNumber, AccountRef, UserId};
use crate::ledger::operation::OperationRecord;
use crate::ledger::transaction::{TransactionId, TransactionStatus};
use crate::ledger::Decimal;

/// Top-level error type for batch processing.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Operation error: {0}")]
    Operation(#[from] OperationError),
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Errors during `OperationRecord` -> `Operation` conversion (hard errors).
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("Invalid operation: {0}")]
    InvalidOperation(OperationRecord),
}

/// Business errors returned by the ledger. The caller can recover from all of
/// them by correcting its input, except `Store` failures that are transient
/// (see [`LedgerError::is_transient`]) and should be retried.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Invalid amount {amount}: must be strictly positive")]
    InvalidAmount { amount: Decimal },

    #[error("Account {account} not found")]
    AccountNotFound { account: AccountRef },

    #[error("No account found for user {owner}")]
    OwnerAccountNotFound { owner: UserId },

    #[error("Insufficient funds: account {account} has {available}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error(
        "Cannot reverse transaction {tx}: receiver {account} has {available}, needs {requested}"
    )]
    InsufficientFundsForReversal {
        tx: TransactionId,
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Transaction {tx} not found")]
    TransactionNotFound { tx: TransactionId },

    #[error("Transaction {tx} is not reversible (status: {status})")]
    TransactionNotReversible {
        tx: TransactionId,
        status: TransactionStatus,
    },

    #[error("Transaction {tx} is not associated with account {account}")]
    TransactionNotAssociated { tx: TransactionId, account: AccountId },

    #[error("Balance limit exceeded: account {account} has {balance}, cannot credit {requested}")]
    BalanceLimitExceeded {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Transfers from account {account} to itself are rejected")]
    SelfTransfer { account: AccountId },

    #[error("User {owner} already owns an account")]
    AccountAlreadyExists { owner: UserId },

    #[error("Could not allocate a unique account number after {attempts} attempts")]
    AccountNumbersExhausted { attempts: u32 },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl LedgerError {
    /// Returns true for failures the caller may retry unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(err) if err.is_transient())
    }
}

/// Failures raised by store implementations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Timed out after {timeout:?} waiting for the lock on account {account}")]
    LockTimeout { account: AccountId, timeout: Duration },

    #[error("Account number {number} is already assigned")]
    DuplicateAccountNumber { number: AccountNumber },

    #[error("User {owner} already owns an account")]
    DuplicateOwner { owner: UserId },

    #[error("Balance check failed: account {account} has {available}, requested {requested}")]
    BalanceCheckFailed {
        account: AccountId,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Account {account} is not held by this unit of work")]
    OutOfScope { account: AccountId },

    #[error("Credit of {requested} would overflow the balance {balance} of account {account}")]
    BalanceOverflow {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },

    #[error("Transaction {tx} does not exist in this unit of work")]
    UnknownTransaction { tx: TransactionId },

    #[error("Account {account} is still referenced by {count} transactions")]
    DanglingTransactions { account: AccountId, count: usize },
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::LockTimeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_lock_timeouts_are_transient() {
        let timeout = LedgerError::from(StoreError::LockTimeout {
            account: AccountId(1),
            timeout: Duration::from_millis(5),
        });
        assert!(timeout.is_transient());

        let insufficient = LedgerError::InsufficientFunds {
            account: AccountId(1),
            available: dec!(50),
            requested: dec!(100),
        };
        assert!(!insufficient.is_transient());

        let duplicate = LedgerError::from(StoreError::DuplicateOwner { owner: UserId(1) });
        assert!(!duplicate.is_transient());
    }

    #[test]
    fn test_messages_name_the_parties() {
        let err = LedgerError::TransactionNotAssociated {
            tx: TransactionId(9),
            account: AccountId(4),
        };
        assert_eq!(
            err.to_string(),
            "Transaction 9 is not associated with account 4"
        );
    }
}
