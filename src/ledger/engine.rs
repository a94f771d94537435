use std::sync::Arc;

use super::account::{Account, AccountId, AccountRef, UserId};
use super::config::{LedgerConfig, SelfTransferPolicy};
use super::error::{LedgerError, StoreError};
use super::observer::{EventKind, LedgerEvent, LedgerObserver, LogObserver};
use super::store::{LedgerStore, UnitOfWork};
use super::transaction::{NewTransfer, Transaction, TransactionId, TransactionStatus};
use super::Decimal;

/// The ledger engine.
///
/// Applies deposits, withdrawals, transfers and reversals against a
/// [`LedgerStore`]. Every mutating operation runs as exactly one unit of work,
/// so a failure leaves both stores untouched. The engine is `Sync` and meant
/// to be shared between threads (wrap it in an `Arc`).
#[derive(Debug)]
pub struct Ledger<S> {
    store: Arc<S>,
    config: LedgerConfig,
    observer: Arc<dyn LedgerObserver>,
}

impl<S: LedgerStore> Ledger<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        log::trace!("Ledger initialized with {config:?}");
        Self {
            store,
            config,
            observer: Arc::new(LogObserver),
        }
    }

    /// Replace the default `LogObserver`.
    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Credit `amount` to an account. Deposits produce no transaction record.
    pub fn deposit(
        &self,
        account: impl Into<AccountRef>,
        amount: Decimal,
    ) -> Result<Account, LedgerError> {
        let mut event = LedgerEvent::new(EventKind::Deposit);
        event.amount(amount);
        let result = self.credit_account(&account.into(), amount, &mut event);
        self.observe(event, result)
    }

    /// Debit `amount` from an account if its balance covers it.
    pub fn withdraw(
        &self,
        account: impl Into<AccountRef>,
        amount: Decimal,
    ) -> Result<Account, LedgerError> {
        let mut event = LedgerEvent::new(EventKind::Withdraw);
        event.amount(amount);
        let result = self.debit_account(&account.into(), amount, &mut event);
        self.observe(event, result)
    }

    /// Move `amount` between two accounts and record a `SUCCESS` transaction.
    /// The debit, the credit and the record commit together or not at all.
    pub fn transfer(
        &self,
        sender: impl Into<AccountRef>,
        receiver: impl Into<AccountRef>,
        amount: Decimal,
    ) -> Result<Transaction, LedgerError> {
        let mut event = LedgerEvent::new(EventKind::Transfer);
        event.amount(amount);
        let result = self.move_funds(&sender.into(), &receiver.into(), amount, &mut event);
        self.observe(event, result)
    }

    /// Undo a successful transfer: refund the sender, debit the receiver and
    /// mark the transaction `CANCELLED`. No new transaction is created.
    pub fn reverse_transaction(&self, tx: TransactionId) -> Result<Transaction, LedgerError> {
        let mut event = LedgerEvent::new(EventKind::Reverse);
        event.transaction(tx);
        let result = self.reverse_transfer(tx, &mut event);
        self.observe(event, result)
    }

    pub fn get_account(&self, account: impl Into<AccountRef>) -> Result<Account, LedgerError> {
        let account = account.into();
        let found = match &account {
            AccountRef::Id(id) => self.store.account_by_id(*id)?,
            AccountRef::Number(number) => self.store.account_by_number(number)?,
        };
        found.ok_or(LedgerError::AccountNotFound { account })
    }

    /// The single account owned by `owner`.
    pub fn account_for_owner(&self, owner: UserId) -> Result<Account, LedgerError> {
        self.store
            .account_by_owner(owner)?
            .ok_or(LedgerError::OwnerAccountNotFound { owner })
    }

    /// Every account, ordered by id.
    pub fn accounts(&self) -> Result<Vec<Account>, LedgerError> {
        Ok(self.store.accounts()?)
    }

    /// Transactions sent or received by `account`, newest first. Each call
    /// reads the current state of the store.
    pub fn list_transactions_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions_for_account(account)?)
    }

    /// Every transaction, ordered by id.
    pub fn transactions(&self) -> Result<Vec<Transaction>, LedgerError> {
        Ok(self.store.transactions()?)
    }

    /// Fetch a transaction on behalf of `account`, which must be its sender
    /// or receiver.
    pub fn transaction_for_account(
        &self,
        tx: TransactionId,
        account: AccountId,
    ) -> Result<Transaction, LedgerError> {
        let transaction = self
            .store
            .transaction_by_id(tx)?
            .ok_or(LedgerError::TransactionNotFound { tx })?;

        if !transaction.involves(account) {
            return Err(LedgerError::TransactionNotAssociated { tx, account });
        }
        Ok(transaction)
    }

    /// Like [`Ledger::transaction_for_account`], resolving the account from
    /// its owner first.
    pub fn transaction_for_owner(
        &self,
        tx: TransactionId,
        owner: UserId,
    ) -> Result<Transaction, LedgerError> {
        let account = self.account_for_owner(owner)?;
        self.transaction_for_account(tx, account.id())
    }
}

// =============================================================================
// Operation bodies
// =============================================================================

impl<S: LedgerStore> Ledger<S> {
    fn credit_account(
        &self,
        account: &AccountRef,
        amount: Decimal,
        event: &mut LedgerEvent,
    ) -> Result<Account, LedgerError> {
        ensure_positive(amount)?;
        let id = self.resolve(account)?;
        event.account(id);

        self.store.atomically(&[id], |unit| {
            held(&*unit, id, account)?;
            unit.credit(id, amount).map_err(balance_limit)
        })
    }

    fn debit_account(
        &self,
        account: &AccountRef,
        amount: Decimal,
        event: &mut LedgerEvent,
    ) -> Result<Account, LedgerError> {
        ensure_positive(amount)?;
        let id = self.resolve(account)?;
        event.account(id);

        self.store.atomically(&[id], |unit| {
            held(&*unit, id, account)?;
            unit.debit(id, amount).map_err(insufficient_funds)
        })
    }

    fn move_funds(
        &self,
        sender: &AccountRef,
        receiver: &AccountRef,
        amount: Decimal,
        event: &mut LedgerEvent,
    ) -> Result<Transaction, LedgerError> {
        ensure_positive(amount)?;
        let sender_id = self.resolve(sender)?;
        event.account(sender_id);
        let receiver_id = self.resolve(receiver)?;
        event.account(receiver_id);

        if sender_id == receiver_id && self.config.self_transfer == SelfTransferPolicy::Reject {
            return Err(LedgerError::SelfTransfer { account: sender_id });
        }

        let transaction = self.store.atomically(&[sender_id, receiver_id], |unit| {
            held(&*unit, sender_id, sender)?;
            held(&*unit, receiver_id, receiver)?;

            unit.debit(sender_id, amount).map_err(insufficient_funds)?;
            unit.credit(receiver_id, amount).map_err(balance_limit)?;
            Ok::<_, LedgerError>(unit.record_transfer(NewTransfer {
                amount,
                sender: sender_id,
                receiver: receiver_id,
            })?)
        })?;

        event.transaction(transaction.id());
        Ok(transaction)
    }

    fn reverse_transfer(
        &self,
        tx: TransactionId,
        event: &mut LedgerEvent,
    ) -> Result<Transaction, LedgerError> {
        let transaction = self
            .store
            .transaction_by_id(tx)?
            .ok_or(LedgerError::TransactionNotFound { tx })?;

        let sender = transaction.sender_account_id();
        let receiver = transaction.receiver_account_id();
        event
            .amount(transaction.amount())
            .account(sender)
            .account(receiver);
        ensure_reversible(&transaction)?;

        self.store.atomically(&[sender, receiver], |unit| {
            // Re-read under the row locks; a concurrent reversal may have won.
            let current = unit
                .transaction(tx)?
                .ok_or(LedgerError::TransactionNotFound { tx })?;
            ensure_reversible(&current)?;

            held(&*unit, sender, &AccountRef::Id(sender))?;
            held(&*unit, receiver, &AccountRef::Id(receiver))?;

            let amount = current.amount();
            unit.debit(receiver, amount)
                .map_err(|err| insufficient_funds_for_reversal(tx, err))?;
            unit.credit(sender, amount).map_err(balance_limit)?;
            Ok(unit.set_status(tx, TransactionStatus::Cancelled)?)
        })
    }

    fn resolve(&self, account: &AccountRef) -> Result<AccountId, LedgerError> {
        match account {
            AccountRef::Id(id) => self
                .store
                .account_by_id(*id)?
                .map(|account| account.id())
                .ok_or(LedgerError::AccountNotFound {
                    account: account.clone(),
                }),
            AccountRef::Number(_) => self.get_account(account.clone()).map(|found| found.id()),
        }
    }

    fn observe<T>(
        &self,
        mut event: LedgerEvent,
        result: Result<T, LedgerError>,
    ) -> Result<T, LedgerError> {
        if let Err(err) = &result {
            event.rejected(err);
        }
        self.observer.record(&event);
        result
    }
}

fn ensure_positive(amount: Decimal) -> Result<(), LedgerError> {
    if amount > Decimal::ZERO {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount { amount })
    }
}

fn ensure_reversible(transaction: &Transaction) -> Result<(), LedgerError> {
    if transaction.is_reversible() {
        Ok(())
    } else {
        Err(LedgerError::TransactionNotReversible {
            tx: transaction.id(),
            status: transaction.status(),
        })
    }
}

/// The unit's view of an account that must exist. Rows deleted between
/// resolution and locking surface as `AccountNotFound`.
fn held<'u>(
    unit: &'u dyn UnitOfWork,
    id: AccountId,
    reference: &AccountRef,
) -> Result<&'u Account, LedgerError> {
    unit.account(id).ok_or_else(|| LedgerError::AccountNotFound {
        account: reference.clone(),
    })
}

fn insufficient_funds(err: StoreError) -> LedgerError {
    match err {
        StoreError::BalanceCheckFailed {
            account,
            available,
            requested,
        } => LedgerError::InsufficientFunds {
            account,
            available,
            requested,
        },
        other => other.into(),
    }
}

fn balance_limit(err: StoreError) -> LedgerError {
    match err {
        StoreError::BalanceOverflow {
            account,
            balance,
            requested,
        } => LedgerError::BalanceLimitExceeded {
            account,
            balance,
            requested,
        },
        other => other.into(),
    }
}

fn insufficient_funds_for_reversal(tx: TransactionId, err: StoreError) -> LedgerError {
    match err {
        StoreError::BalanceCheckFailed {
            account,
            available,
            requested,
        } => LedgerError::InsufficientFundsForReversal {
            tx,
            account,
            available,
            requested,
        },
        other => other.into(),
    }
}
