use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::{AccountStore, LedgerStore, TransactionStore, UnitOfWork};
use crate::ledger::account::{Account, AccountId, AccountNumber, UserId};
use crate::ledger::config::LedgerConfig;
use crate::ledger::error::StoreError;
use crate::ledger::transaction::{NewTransfer, Transaction, TransactionId, TransactionStatus};
use crate::ledger::Decimal;

#[derive(Debug)]
struct AccountRow {
    account: Account,
    /// Cleared on delete. A unit that was waiting on the row when it was
    /// deleted sees the account as absent.
    live: bool,
}

type SharedRow = Arc<Mutex<AccountRow>>;

#[derive(Debug, Default)]
struct AccountTable {
    rows: BTreeMap<AccountId, SharedRow>,
    by_number: HashMap<AccountNumber, AccountId>,
    by_owner: HashMap<UserId, AccountId>,
    last_id: u64,
}

/// Hands out transaction ids together with non-decreasing timestamps, so
/// ordering by `created_at` agrees with ordering by id.
#[derive(Debug, Default)]
struct Sequence {
    last_id: u64,
    last_created_at: Option<DateTime<Utc>>,
}

impl Sequence {
    fn next(&mut self) -> (TransactionId, DateTime<Utc>) {
        self.last_id += 1;
        let now = Utc::now();
        let created_at = match self.last_created_at {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last_created_at = Some(created_at);
        (TransactionId(self.last_id), created_at)
    }
}

/// Thread-safe in-memory ledger store.
///
/// Each account row sits behind its own mutex; a unit of work locks its rows
/// (ascending id order, bounded wait) and stages changes on private copies
/// until it commits. Transaction records are only created or changed by a unit
/// holding both of their accounts, so the transaction table itself needs no
/// per-row locking.
#[derive(Debug)]
pub struct MemoryStore {
    accounts: RwLock<AccountTable>,
    transactions: RwLock<BTreeMap<TransactionId, Transaction>>,
    sequence: Mutex<Sequence>,
    lock_timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::from_config(&LedgerConfig::default())
    }
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        log::trace!("MemoryStore initialized (lock timeout {lock_timeout:?})");
        Self {
            accounts: RwLock::new(AccountTable::default()),
            transactions: RwLock::new(BTreeMap::new()),
            sequence: Mutex::new(Sequence::default()),
            lock_timeout,
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(config.lock_timeout)
    }

    fn row(&self, id: AccountId) -> Option<SharedRow> {
        self.accounts.read().rows.get(&id).cloned()
    }

    fn lock_row<'r>(
        &self,
        row: &'r SharedRow,
        id: AccountId,
    ) -> Result<MutexGuard<'r, AccountRow>, StoreError> {
        row.try_lock_for(self.lock_timeout)
            .ok_or(StoreError::LockTimeout {
                account: id,
                timeout: self.lock_timeout,
            })
    }

    fn read_row(&self, id: AccountId, row: &SharedRow) -> Result<Option<Account>, StoreError> {
        let guard = self.lock_row(row, id)?;
        Ok(guard.live.then(|| guard.account.clone()))
    }

    fn commit(&self, guards: &mut [MutexGuard<'_, AccountRow>], unit: MemoryUnit<'_>) {
        let MemoryUnit {
            accounts: mut working,
            inserted,
            updated,
            purged,
            removed,
            ..
        } = unit;

        if !(inserted.is_empty() && updated.is_empty() && purged.is_empty()) {
            let mut table = self.transactions.write();
            for id in &purged {
                table.remove(id);
            }
            table.extend(updated);
            table.extend(inserted);
        }

        for guard in guards.iter_mut() {
            let id = guard.account.id();
            if removed.contains_key(&id) {
                guard.live = false;
            } else if let Some(account) = working.remove(&id) {
                guard.account = account;
            }
        }

        if !removed.is_empty() {
            let mut table = self.accounts.write();
            for account in removed.values() {
                table.rows.remove(&account.id());
                table.by_number.remove(account.number());
                table.by_owner.remove(&account.owner_id());
            }
        }
    }
}

impl AccountStore for MemoryStore {
    fn insert_account(
        &self,
        owner: UserId,
        number: AccountNumber,
    ) -> Result<Account, StoreError> {
        let mut table = self.accounts.write();

        if table.by_owner.contains_key(&owner) {
            return Err(StoreError::DuplicateOwner { owner });
        }
        if table.by_number.contains_key(&number) {
            return Err(StoreError::DuplicateAccountNumber { number });
        }

        table.last_id += 1;
        let id = AccountId(table.last_id);
        let account = Account::new(id, number.clone(), owner);

        table.by_number.insert(number, id);
        table.by_owner.insert(owner, id);
        table.rows.insert(
            id,
            Arc::new(Mutex::new(AccountRow {
                account: account.clone(),
                live: true,
            })),
        );
        Ok(account)
    }

    fn account_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        match self.row(id) {
            Some(row) => self.read_row(id, &row),
            None => Ok(None),
        }
    }

    fn account_by_number(&self, number: &AccountNumber) -> Result<Option<Account>, StoreError> {
        let id = self.accounts.read().by_number.get(number).copied();
        match id {
            Some(id) => self.account_by_id(id),
            None => Ok(None),
        }
    }

    fn account_by_owner(&self, owner: UserId) -> Result<Option<Account>, StoreError> {
        let id = self.accounts.read().by_owner.get(&owner).copied();
        match id {
            Some(id) => self.account_by_id(id),
            None => Ok(None),
        }
    }

    fn accounts(&self) -> Result<Vec<Account>, StoreError> {
        let rows: Vec<(AccountId, SharedRow)> = self
            .accounts
            .read()
            .rows
            .iter()
            .map(|(id, row)| (*id, Arc::clone(row)))
            .collect();

        let mut accounts = Vec::with_capacity(rows.len());
        for (id, row) in &rows {
            if let Some(account) = self.read_row(*id, row)? {
                accounts.push(account);
            }
        }
        Ok(accounts)
    }
}

impl TransactionStore for MemoryStore {
    fn transaction_by_id(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        Ok(self.transactions.read().get(&id).cloned())
    }

    fn transactions_for_account(
        &self,
        account: AccountId,
    ) -> Result<Vec<Transaction>, StoreError> {
        let mut transactions: Vec<Transaction> = self
            .transactions
            .read()
            .values()
            .filter(|tx| tx.involves(account))
            .cloned()
            .collect();
        transactions.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| b.id().cmp(&a.id()))
        });
        Ok(transactions)
    }

    fn transactions(&self) -> Result<Vec<Transaction>, StoreError> {
        Ok(self.transactions.read().values().cloned().collect())
    }
}

impl LedgerStore for MemoryStore {
    fn atomically<T, E, F>(&self, accounts: &[AccountId], work: F) -> Result<T, E>
    where
        F: FnOnce(&mut dyn UnitOfWork) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut scope = accounts.to_vec();
        scope.sort_unstable();
        scope.dedup();

        let rows: Vec<(AccountId, SharedRow)> = {
            let table = self.accounts.read();
            scope
                .iter()
                .filter_map(|id| table.rows.get(id).map(|row| (*id, Arc::clone(row))))
                .collect()
        };

        let mut guards = Vec::with_capacity(rows.len());
        for (id, row) in &rows {
            guards.push(self.lock_row(row, *id)?);
        }

        let mut unit = MemoryUnit {
            store: self,
            accounts: guards
                .iter()
                .filter(|guard| guard.live)
                .map(|guard| (guard.account.id(), guard.account.clone()))
                .collect(),
            inserted: BTreeMap::new(),
            updated: BTreeMap::new(),
            purged: BTreeSet::new(),
            removed: BTreeMap::new(),
        };

        let output = work(&mut unit)?;
        self.commit(&mut guards, unit);
        Ok(output)
    }
}

fn involves_any(tx: &Transaction, accounts: &[AccountId]) -> bool {
    accounts.iter().any(|account| tx.involves(*account))
}

/// Staged changes of one unit of work. Dropping it without a commit
/// discards everything.
struct MemoryUnit<'s> {
    store: &'s MemoryStore,
    accounts: BTreeMap<AccountId, Account>,
    inserted: BTreeMap<TransactionId, Transaction>,
    updated: BTreeMap<TransactionId, Transaction>,
    purged: BTreeSet<TransactionId>,
    removed: BTreeMap<AccountId, Account>,
}

impl MemoryUnit<'_> {
    fn held_mut(&mut self, id: AccountId) -> Result<&mut Account, StoreError> {
        self.accounts
            .get_mut(&id)
            .ok_or(StoreError::OutOfScope { account: id })
    }

    fn ensure_held(&self, id: AccountId) -> Result<(), StoreError> {
        if self.accounts.contains_key(&id) {
            Ok(())
        } else {
            Err(StoreError::OutOfScope { account: id })
        }
    }

    /// Transactions still referencing `account` once staged changes apply.
    fn references(&self, account: AccountId) -> usize {
        let committed = self
            .store
            .transactions
            .read()
            .values()
            .filter(|tx| tx.involves(account) && !self.purged.contains(&tx.id()))
            .count();
        let staged = self
            .inserted
            .values()
            .filter(|tx| tx.involves(account))
            .count();
        committed + staged
    }
}

impl UnitOfWork for MemoryUnit<'_> {
    fn account(&self, id: AccountId) -> Option<&Account> {
        self.accounts.get(&id)
    }

    fn transaction(&self, id: TransactionId) -> Result<Option<Transaction>, StoreError> {
        if self.purged.contains(&id) {
            return Ok(None);
        }
        if let Some(tx) = self.inserted.get(&id).or_else(|| self.updated.get(&id)) {
            return Ok(Some(tx.clone()));
        }
        self.store.transaction_by_id(id)
    }

    fn credit(&mut self, id: AccountId, amount: Decimal) -> Result<Account, StoreError> {
        let account = self.held_mut(id)?;
        if !account.credit(amount) {
            return Err(StoreError::BalanceOverflow {
                account: id,
                balance: account.balance(),
                requested: amount,
            });
        }
        Ok(account.clone())
    }

    fn debit(&mut self, id: AccountId, amount: Decimal) -> Result<Account, StoreError> {
        let account = self.held_mut(id)?;
        if !account.covers(amount) {
            return Err(StoreError::BalanceCheckFailed {
                account: id,
                available: account.balance(),
                requested: amount,
            });
        }
        account.debit(amount);
        Ok(account.clone())
    }

    fn record_transfer(&mut self, transfer: NewTransfer) -> Result<Transaction, StoreError> {
        self.ensure_held(transfer.sender)?;
        self.ensure_held(transfer.receiver)?;

        let (id, created_at) = self.store.sequence.lock().next();
        let tx = Transaction::new(id, &transfer, created_at);
        self.inserted.insert(id, tx.clone());
        Ok(tx)
    }

    fn set_status(
        &mut self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<Transaction, StoreError> {
        let mut tx = self
            .transaction(id)?
            .ok_or(StoreError::UnknownTransaction { tx: id })?;
        self.ensure_held(tx.sender_account_id())?;
        self.ensure_held(tx.receiver_account_id())?;

        tx.transition(status);
        if self.inserted.contains_key(&id) {
            self.inserted.insert(id, tx.clone());
        } else {
            self.updated.insert(id, tx.clone());
        }
        Ok(tx)
    }

    fn purge_transactions(&mut self, accounts: &[AccountId]) -> Result<usize, StoreError> {
        for account in accounts {
            self.ensure_held(*account)?;
        }
        let committed: Vec<TransactionId> = self
            .store
            .transactions
            .read()
            .values()
            .filter(|tx| involves_any(tx, accounts) && !self.purged.contains(&tx.id()))
            .map(Transaction::id)
            .collect();

        let mut count = committed.len();
        for id in committed {
            self.updated.remove(&id);
            self.purged.insert(id);
        }

        let staged = self.inserted.len();
        self.inserted.retain(|_, tx| !involves_any(tx, accounts));
        count += staged - self.inserted.len();

        Ok(count)
    }

    fn remove_account(&mut self, id: AccountId) -> Result<Account, StoreError> {
        self.ensure_held(id)?;
        let count = self.references(id);
        if count > 0 {
            return Err(StoreError::DanglingTransactions { account: id, count });
        }
        let account = self.accounts.remove(&id).ok_or(StoreError::OutOfScope { account: id })?;
        self.removed.insert(id, account.clone());
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store() -> MemoryStore {
        MemoryStore::new(Duration::from_millis(50))
    }

    fn open(store: &MemoryStore, owner: u64, balance: Decimal) -> AccountId {
        let number = AccountNumber::new(format!("{:010}", 1_000_000_000 + owner));
        let id = store.insert_account(UserId(owner), number).unwrap().id();
        if balance > Decimal::ZERO {
            store
                .atomically(&[id], |unit| unit.credit(id, balance))
                .unwrap();
        }
        id
    }

    fn balance(store: &MemoryStore, id: AccountId) -> Decimal {
        store.account_by_id(id).unwrap().unwrap().balance()
    }

    fn transfer(store: &MemoryStore, from: AccountId, to: AccountId, amount: Decimal) -> Transaction {
        store
            .atomically(&[from, to], |unit| {
                unit.debit(from, amount)?;
                unit.credit(to, amount)?;
                unit.record_transfer(NewTransfer {
                    amount,
                    sender: from,
                    receiver: to,
                })
            })
            .unwrap()
    }

    #[test]
    fn test_insert_and_lookup_by_every_key() {
        let store = store();
        let account = store
            .insert_account(UserId(1), AccountNumber::new("1234567890"))
            .unwrap();

        let by_id = store.account_by_id(account.id()).unwrap().unwrap();
        let by_number = store
            .account_by_number(&AccountNumber::new("1234567890"))
            .unwrap()
            .unwrap();
        let by_owner = store.account_by_owner(UserId(1)).unwrap().unwrap();

        assert_eq!(by_id, account);
        assert_eq!(by_number, account);
        assert_eq!(by_owner, account);
        assert_eq!(account.balance(), Decimal::ZERO);
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let store = store();
        store
            .insert_account(UserId(1), AccountNumber::new("1234567890"))
            .unwrap();

        let number_taken = store.insert_account(UserId(2), AccountNumber::new("1234567890"));
        assert!(matches!(
            number_taken,
            Err(StoreError::DuplicateAccountNumber { .. })
        ));

        let owner_taken = store.insert_account(UserId(1), AccountNumber::new("1234567891"));
        assert!(matches!(owner_taken, Err(StoreError::DuplicateOwner { .. })));

        assert_eq!(store.accounts().unwrap().len(), 1);
    }

    #[test]
    fn test_ids_are_assigned_in_order() {
        let store = store();
        let a = open(&store, 1, Decimal::ZERO);
        let b = open(&store, 2, Decimal::ZERO);
        assert!(a < b);
    }

    #[test]
    fn test_commit_applies_all_changes() {
        let store = store();
        let a = open(&store, 1, dec!(500));
        let b = open(&store, 2, Decimal::ZERO);

        let tx = transfer(&store, a, b, dec!(200));

        assert_eq!(balance(&store, a), dec!(300));
        assert_eq!(balance(&store, b), dec!(200));
        assert_eq!(store.transaction_by_id(tx.id()).unwrap(), Some(tx));
    }

    #[test]
    fn test_failed_unit_leaves_no_trace() {
        let store = store();
        let a = open(&store, 1, dec!(500));
        let b = open(&store, 2, Decimal::ZERO);

        let result: Result<(), StoreError> = store.atomically(&[a, b], |unit| {
            unit.credit(b, dec!(100))?;
            unit.record_transfer(NewTransfer {
                amount: dec!(100),
                sender: a,
                receiver: b,
            })?;
            unit.debit(a, dec!(1000))?;
            Ok(())
        });

        assert!(matches!(
            result,
            Err(StoreError::BalanceCheckFailed { available, .. }) if available == dec!(500)
        ));
        assert_eq!(balance(&store, a), dec!(500));
        assert_eq!(balance(&store, b), Decimal::ZERO);
        assert!(store.transactions().unwrap().is_empty());
    }

    #[test]
    fn test_debit_never_goes_negative() {
        let store = store();
        let a = open(&store, 1, dec!(50));

        let result = store.atomically(&[a], |unit| unit.debit(a, dec!(100)));

        assert!(matches!(result, Err(StoreError::BalanceCheckFailed { .. })));
        assert_eq!(balance(&store, a), dec!(50));
    }

    #[test]
    fn test_credit_overflow_aborts_the_unit() {
        let store = store();
        let a = open(&store, 1, dec!(10));
        let b = open(&store, 2, Decimal::MAX);

        let result = store.atomically(&[a, b], |unit| {
            unit.debit(a, dec!(10))?;
            unit.credit(b, dec!(10))
        });

        assert!(matches!(
            result,
            Err(StoreError::BalanceOverflow { account, .. }) if account == b
        ));
        assert_eq!(balance(&store, a), dec!(10));
        assert_eq!(balance(&store, b), Decimal::MAX);
    }

    #[test]
    fn test_accounts_outside_scope_are_rejected() {
        let store = store();
        let a = open(&store, 1, dec!(50));
        let b = open(&store, 2, Decimal::ZERO);

        let result = store.atomically(&[a], |unit| unit.credit(b, dec!(10)));

        assert!(matches!(result, Err(StoreError::OutOfScope { account }) if account == b));
        assert_eq!(balance(&store, b), Decimal::ZERO);
    }

    #[test]
    fn test_missing_accounts_are_absent_from_unit() {
        let store = store();
        let missing = AccountId(99);

        let seen = store
            .atomically(&[missing], |unit| Ok::<_, StoreError>(unit.account(missing).is_some()))
            .unwrap();

        assert!(!seen);
    }

    #[test]
    fn test_held_row_times_out() {
        let store = store();
        let a = open(&store, 1, dec!(50));
        let row = store.row(a).unwrap();
        let _held = row.lock();

        let result = store.atomically(&[a], |unit| unit.credit(a, dec!(10)));

        assert!(matches!(
            result,
            Err(StoreError::LockTimeout { account, .. }) if account == a
        ));
        assert!(matches!(
            store.account_by_id(a),
            Err(StoreError::LockTimeout { .. })
        ));
    }

    #[test]
    fn test_status_update_is_staged_until_commit() {
        let store = store();
        let a = open(&store, 1, dec!(500));
        let b = open(&store, 2, Decimal::ZERO);
        let tx = transfer(&store, a, b, dec!(200));

        let aborted: Result<(), StoreError> = store.atomically(&[a, b], |unit| {
            let updated = unit.set_status(tx.id(), TransactionStatus::Cancelled)?;
            assert_eq!(updated.status(), TransactionStatus::Cancelled);
            unit.debit(b, dec!(1000))?;
            Ok(())
        });
        assert!(aborted.is_err());

        let current = store.transaction_by_id(tx.id()).unwrap().unwrap();
        assert_eq!(current.status(), TransactionStatus::Success);
    }

    #[test]
    fn test_status_update_requires_both_parties() {
        let store = store();
        let a = open(&store, 1, dec!(500));
        let b = open(&store, 2, Decimal::ZERO);
        let tx = transfer(&store, a, b, dec!(200));

        let result = store.atomically(&[a], |unit| {
            unit.set_status(tx.id(), TransactionStatus::Cancelled)
        });

        assert!(matches!(result, Err(StoreError::OutOfScope { account }) if account == b));
    }

    #[test]
    fn test_transactions_for_account_newest_first() {
        let store = store();
        let a = open(&store, 1, dec!(500));
        let b = open(&store, 2, Decimal::ZERO);
        let c = open(&store, 3, Decimal::ZERO);

        let first = transfer(&store, a, b, dec!(10));
        let second = transfer(&store, a, c, dec!(20));
        let third = transfer(&store, b, a, dec!(5));

        let ids: Vec<TransactionId> = store
            .transactions_for_account(a)
            .unwrap()
            .iter()
            .map(Transaction::id)
            .collect();
        assert_eq!(ids, vec![third.id(), second.id(), first.id()]);

        let ids: Vec<TransactionId> = store
            .transactions_for_account(c)
            .unwrap()
            .iter()
            .map(Transaction::id)
            .collect();
        assert_eq!(ids, vec![second.id()]);
    }

    #[test]
    fn test_remove_requires_purge_first() {
        let store = store();
        let a = open(&store, 1, dec!(500));
        let b = open(&store, 2, Decimal::ZERO);
        transfer(&store, a, b, dec!(200));

        let dangling = store.atomically(&[b], |unit| unit.remove_account(b));
        assert!(matches!(
            dangling,
            Err(StoreError::DanglingTransactions { count: 1, .. })
        ));

        let purged = store
            .atomically(&[b], |unit| {
                let purged = unit.purge_transactions(&[b])?;
                unit.remove_account(b)?;
                Ok::<_, StoreError>(purged)
            })
            .unwrap();

        assert_eq!(purged, 1);
        assert_eq!(store.account_by_id(b).unwrap(), None);
        assert_eq!(store.account_by_owner(UserId(2)).unwrap(), None);
        assert!(store.transactions_for_account(a).unwrap().is_empty());
        assert_eq!(balance(&store, a), dec!(300));
    }

    #[test]
    fn test_removed_number_can_be_reassigned() {
        let store = store();
        let a = open(&store, 1, Decimal::ZERO);
        let number = store.account_by_id(a).unwrap().unwrap().number().clone();

        store
            .atomically(&[a], |unit| unit.remove_account(a))
            .unwrap();

        assert!(store.insert_account(UserId(5), number).is_ok());
    }
}
