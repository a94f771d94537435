//! Store contracts consumed by the engine and the lifecycle adapter.
//!
//! Reads go through [`AccountStore`] and [`TransactionStore`]. Every mutation
//! of an existing row happens inside a [`UnitOfWork`] opened with
//! [`LedgerStore::atomically`], which holds the participating account rows for
//! its whole duration and commits all staged changes or none of them.

mod memory;

pub use memory::MemoryStore;

use super::account::{Account, AccountId, AccountNumber, UserId};
use super::error::StoreError;
use super::transaction::{NewTransfer, Transaction, TransactionId, TransactionStatus};
use super::Decimal;

pub trait AccountStore: Send + Sync {
    /// Insert a new zero-balance account. Fails if the number is taken or the
    /// owner already has an account.
    fn insert_account(&self, owner: UserId, number: AccountNumber)
        -> Result<Account, StoreError>;

    fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    fn account_by_number(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError>;

    fn account_by_owner(&self, owner: UserId) -> Result<Option<Account>, StoreError>;

    /// All accounts ordered by id.
    fn accounts(&self) -> Result<Vec<Account>, StoreError>;
}

pub trait TransactionStore: Send + Sync {
    fn transaction_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    /// Transactions where `account` is sender or receiver, newest first.
    fn transactions_for_account(&self, account: AccountId)
        -> Result<Vec<Transaction>, StoreError>;

    /// All transactions ordered by id.
    fn transactions(&self) -> Result<Vec<Transaction>, StoreError>;
}

/// Mutations staged against the rows a unit of work holds.
///
/// Nothing is visible to other callers until the unit commits. Accounts
/// outside the unit's scope are rejected with `StoreError::OutOfScope`.
pub trait UnitOfWork {
    /// The unit's current view of a held account. `None` if the account does
    /// not exist (or was removed before the unit acquired it).
    fn account(&self, id: AccountId) -> Option<&Account>;

    /// The unit's current view of a transaction, staged changes included.
    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError>;

    fn credit(&mut self, id: AccountId, amount: Decimal) -> Result<Account, StoreError>;

    /// Debit only if the balance covers `amount`; otherwise fail with
    /// `StoreError::BalanceCheckFailed` and leave the balance untouched.
    fn debit(&mut self, id: AccountId, amount: Decimal) -> Result<Account, StoreError>;

    /// Create a `SUCCESS` transaction. Both parties must be held.
    fn record_transfer(&mut self, transfer: NewTransfer) -> Result<Transaction, StoreError>;

    /// Both parties of the transaction must be held.
    fn set_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError>;

    /// Delete every transaction referencing any of `accounts`, all of which
    /// must be held. Returns the number of deleted transactions.
    fn purge_transactions(&mut self, accounts: &[AccountId]) -> Result<usize, StoreError>;

    /// Delete a held account. Fails while transactions still reference it.
    fn remove_account(&mut self, id: AccountId) -> Result<Account, StoreError>;
}

pub trait LedgerStore: AccountStore + TransactionStore {
    /// Run `work` as one atomic unit over the given account rows.
    ///
    /// Rows are acquired in ascending id order before `work` runs and released
    /// after it returns. `Ok` commits every staged change; `Err` discards them.
    fn atomically<T, E, F>(&self, accounts: &[AccountId], work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>;
}
