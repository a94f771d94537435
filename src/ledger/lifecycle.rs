use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use rand::Rng;

use super::account::{Account, AccountNumber, UserId};
use super::config::LedgerConfig;
use super::error::{LedgerError, StoreError};
use super::observer::{EventKind, LedgerEvent, LedgerObserver, LogObserver};
use super::store::LedgerStore;

/// Ten-digit account numbers.
const ACCOUNT_NUMBERS: RangeInclusive<u64> = 1_000_000_000..=9_999_999_999;

/// Source of candidate account numbers. Uniqueness is decided by the store.
pub trait NumberGenerator: Send + Sync + fmt::Debug {
    fn generate(&self) -> AccountNumber;
}

/// Draws numbers uniformly from the ten-digit range.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomNumbers;

impl NumberGenerator for RandomNumbers {
    fn generate(&self) -> AccountNumber {
        let number = rand::thread_rng().gen_range(ACCOUNT_NUMBERS);
        AccountNumber::new(number.to_string())
    }
}

/// What was removed when a user's account was closed.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountClosure {
    pub account: Account,
    pub purged_transactions: usize,
}

/// Creates and destroys accounts as users come and go.
#[derive(Debug)]
pub struct AccountLifecycle<S> {
    store: Arc<S>,
    config: LedgerConfig,
    numbers: Arc<dyn NumberGenerator>,
    observer: Arc<dyn LedgerObserver>,
}

impl<S: LedgerStore> AccountLifecycle<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            numbers: Arc::new(RandomNumbers),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_numbers(mut self, numbers: Arc<dyn NumberGenerator>) -> Self {
        self.numbers = numbers;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn LedgerObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Allocate a zero-balance account for a newly created user.
    ///
    /// Regenerates the number on collision, at most
    /// `config.max_number_attempts` times.
    pub fn open_account(&self, owner: UserId) -> Result<Account, LedgerError> {
        let mut event = LedgerEvent::new(EventKind::OpenAccount);
        let result = self.allocate(owner);
        match &result {
            Ok(account) => {
                event.account(account.id());
            }
            Err(err) => {
                event.rejected(err);
            }
        }
        self.observer.record(&event);
        result
    }

    /// Tear down a deleted user's account: purge every transaction that
    /// references it, then delete the row. Both happen in one unit of work
    /// holding the account, so no transfer can slip in between.
    ///
    /// Returns `None` if the user has no account.
    pub fn close_account(&self, owner: UserId) -> Result<Option<AccountClosure>, LedgerError> {
        let Some(account) = self.store.account_by_owner(owner)? else {
            log::debug!("No account found for user {owner}, nothing to close");
            return Ok(None);
        };
        let id = account.id();

        let mut event = LedgerEvent::new(EventKind::CloseAccount);
        event.account(id);

        let result = self
            .store
            .atomically(&[id], |unit| -> Result<_, LedgerError> {
                if unit.account(id).is_none() {
                    return Ok(None);
                }
                let purged_transactions = unit.purge_transactions(&[id])?;
                let account = unit.remove_account(id)?;
                Ok(Some(AccountClosure {
                    account,
                    purged_transactions,
                }))
            });

        if let Err(err) = &result {
            event.rejected(err);
        }
        self.observer.record(&event);
        result
    }

    fn allocate(&self, owner: UserId) -> Result<Account, LedgerError> {
        let attempts = self.config.max_number_attempts;
        for attempt in 1..=attempts {
            let number = self.numbers.generate();
            match self.store.insert_account(owner, number) {
                Ok(account) => return Ok(account),
                Err(StoreError::DuplicateAccountNumber { number }) => {
                    log::debug!(
                        "Account number {number} already assigned (attempt {attempt}/{attempts})"
                    );
                }
                Err(StoreError::DuplicateOwner { owner }) => {
                    return Err(LedgerError::AccountAlreadyExists { owner })
                }
                Err(err) => return Err(err.into()),
            }
        }
        log::error!("Gave up allocating an account number for user {owner} after {attempts} attempts");
        Err(LedgerError::AccountNumbersExhausted { attempts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::engine::Ledger;
    use crate::ledger::observer::testing::RecordingObserver;
    use crate::ledger::store::{AccountStore, MemoryStore, TransactionStore};
    use crate::ledger::Decimal;
    use parking_lot::Mutex;
    use rust_decimal_macros::dec;
    use std::collections::VecDeque;

    /// Replays a fixed list of numbers, then repeats the last one.
    #[derive(Debug)]
    struct ScriptedNumbers {
        numbers: Mutex<VecDeque<&'static str>>,
    }

    impl ScriptedNumbers {
        fn new(numbers: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                numbers: Mutex::new(numbers.iter().copied().collect()),
            })
        }
    }

    impl NumberGenerator for ScriptedNumbers {
        fn generate(&self) -> AccountNumber {
            let mut numbers = self.numbers.lock();
            let next = if numbers.len() > 1 {
                numbers.pop_front()
            } else {
                numbers.front().copied()
            };
            AccountNumber::new(next.unwrap_or("1000000000"))
        }
    }

    fn setup(numbers: Arc<dyn NumberGenerator>) -> (Ledger<MemoryStore>, AccountLifecycle<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let config = LedgerConfig::default().with_max_number_attempts(3);
        let ledger = Ledger::new(Arc::clone(&store), config.clone());
        let lifecycle = AccountLifecycle::new(store, config).with_numbers(numbers);
        (ledger, lifecycle)
    }

    #[test]
    fn test_random_numbers_have_ten_digits() {
        for _ in 0..100 {
            let number = RandomNumbers.generate();
            assert_eq!(number.as_str().len(), 10);
            assert!(number.as_str().chars().all(|c| c.is_ascii_digit()));
            assert_ne!(number.as_str().chars().next(), Some('0'));
        }
    }

    #[test]
    fn test_open_account_starts_at_zero_and_is_resolvable() {
        let (ledger, lifecycle) = setup(Arc::new(RandomNumbers));

        let account = lifecycle.open_account(UserId(1)).unwrap();

        assert_eq!(account.balance(), Decimal::ZERO);
        assert_eq!(account.owner_id(), UserId(1));
        assert_eq!(ledger.get_account(account.id()).unwrap(), account);
        assert_eq!(ledger.get_account(account.number()).unwrap(), account);
        assert_eq!(ledger.account_for_owner(UserId(1)).unwrap(), account);
    }

    #[test]
    fn test_open_account_retries_on_collision() {
        let (_ledger, lifecycle) =
            setup(ScriptedNumbers::new(&["1111111111", "1111111111", "2222222222"]));

        let first = lifecycle.open_account(UserId(1)).unwrap();
        let second = lifecycle.open_account(UserId(2)).unwrap();

        assert_eq!(first.number().as_str(), "1111111111");
        assert_eq!(second.number().as_str(), "2222222222");
    }

    #[test]
    fn test_open_account_gives_up_after_bounded_attempts() {
        let (_ledger, lifecycle) = setup(ScriptedNumbers::new(&["1111111111"]));
        lifecycle.open_account(UserId(1)).unwrap();

        let err = lifecycle.open_account(UserId(2)).unwrap_err();

        assert!(matches!(
            err,
            LedgerError::AccountNumbersExhausted { attempts: 3 }
        ));
    }

    #[test]
    fn test_user_owns_at_most_one_account() {
        let (_ledger, lifecycle) = setup(Arc::new(RandomNumbers));
        lifecycle.open_account(UserId(1)).unwrap();

        assert!(matches!(
            lifecycle.open_account(UserId(1)),
            Err(LedgerError::AccountAlreadyExists { owner: UserId(1) })
        ));
    }

    #[test]
    fn test_close_account_purges_transactions_then_deletes() {
        let (ledger, lifecycle) = setup(Arc::new(RandomNumbers));
        let a = lifecycle.open_account(UserId(1)).unwrap().id();
        let b = lifecycle.open_account(UserId(2)).unwrap().id();
        let c = lifecycle.open_account(UserId(3)).unwrap().id();

        ledger.deposit(a, dec!(500)).unwrap();
        ledger.transfer(a, b, dec!(100)).unwrap();
        ledger.transfer(b, a, dec!(30)).unwrap();
        let kept = ledger.transfer(a, c, dec!(10)).unwrap();

        let closure = lifecycle.close_account(UserId(2)).unwrap().unwrap();

        assert_eq!(closure.account.id(), b);
        assert_eq!(closure.account.balance(), dec!(70));
        assert_eq!(closure.purged_transactions, 2);
        assert!(matches!(
            ledger.get_account(b),
            Err(LedgerError::AccountNotFound { .. })
        ));
        assert_eq!(ledger.store().account_by_owner(UserId(2)).unwrap(), None);
        assert_eq!(ledger.list_transactions_for_account(a).unwrap(), vec![kept]);
        assert_eq!(ledger.store().transactions().unwrap().len(), 1);
    }

    #[test]
    fn test_close_account_without_account_is_a_no_op() {
        let (_ledger, lifecycle) = setup(Arc::new(RandomNumbers));
        assert_eq!(lifecycle.close_account(UserId(9)).unwrap(), None);
    }

    #[test]
    fn test_closed_owner_can_open_again() {
        let (_ledger, lifecycle) = setup(Arc::new(RandomNumbers));
        let first = lifecycle.open_account(UserId(1)).unwrap();
        lifecycle.close_account(UserId(1)).unwrap();

        let second = lifecycle.open_account(UserId(1)).unwrap();

        assert_ne!(first.id(), second.id());
        assert_eq!(second.balance(), Decimal::ZERO);
    }

    #[test]
    fn test_lifecycle_reports_events() {
        let observer = Arc::new(RecordingObserver::default());
        let (_ledger, lifecycle) = setup(Arc::new(RandomNumbers));
        let lifecycle = lifecycle.with_observer(observer.clone());

        let account = lifecycle.open_account(UserId(1)).unwrap();
        lifecycle.open_account(UserId(1)).unwrap_err();
        lifecycle.close_account(UserId(1)).unwrap();

        let events = observer.events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].kind, EventKind::OpenAccount);
        assert_eq!(events[0].accounts, vec![account.id()]);
        assert!(!events[1].is_applied());
        assert_eq!(events[2].kind, EventKind::CloseAccount);
        assert!(events[2].is_applied());
    }
}
