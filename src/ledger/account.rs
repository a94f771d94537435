use std::fmt;

use super::Decimal;
use serde::{Deserialize, Serialize};

/// Store-assigned account identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub u64);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to the user owning an account. Users live outside the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Externally visible account number, unique and immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    pub fn new(number: impl Into<String>) -> Self {
        Self(number.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a caller addresses an account: by internal id or by account number.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AccountRef {
    Id(AccountId),
    Number(AccountNumber),
}

impl fmt::Display for AccountRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRef::Id(id) => write!(f, "id {id}"),
            AccountRef::Number(number) => write!(f, "number {number}"),
        }
    }
}

impl From<AccountId> for AccountRef {
    fn from(id: AccountId) -> Self {
        AccountRef::Id(id)
    }
}

impl From<AccountNumber> for AccountRef {
    fn from(number: AccountNumber) -> Self {
        AccountRef::Number(number)
    }
}

impl From<&AccountNumber> for AccountRef {
    fn from(number: &AccountNumber) -> Self {
        AccountRef::Number(number.clone())
    }
}

/// A balance-holding account owned by exactly one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    id: AccountId,
    number: AccountNumber,
    owner_id: UserId,
    balance: Decimal,
}

impl Account {
    pub(crate) fn new(id: AccountId, number: AccountNumber, owner_id: UserId) -> Self {
        Self {
            id,
            number,
            owner_id,
            balance: Decimal::ZERO,
        }
    }

    pub fn id(&self) -> AccountId {
        self.id
    }

    pub fn number(&self) -> &AccountNumber {
        &self.number
    }

    pub fn owner_id(&self) -> UserId {
        self.owner_id
    }

    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Returns true when the balance covers a debit of `amount`.
    pub fn covers(&self, amount: Decimal) -> bool {
        self.balance >= amount
    }

    /// Credit the account. Returns false, leaving the balance untouched, if
    /// the result would not fit in a `Decimal`.
    #[must_use]
    pub(crate) fn credit(&mut self, amount: Decimal) -> bool {
        debug_assert!(amount > Decimal::ZERO, "credit of non-positive amount");
        let Some(balance) = self.balance.checked_add(amount) else {
            return false;
        };
        self.balance = balance.normalize();
        #[cfg(debug_assertions)]
        self.assert_invariant();
        true
    }

    /// Debit the account.
    /// Caller must have checked `covers(amount)` first.
    pub(crate) fn debit(&mut self, amount: Decimal) {
        debug_assert!(amount > Decimal::ZERO, "debit of non-positive amount");
        self.balance = (self.balance - amount).normalize();
        #[cfg(debug_assertions)]
        self.assert_invariant();
    }

    #[cfg(debug_assertions)]
    fn assert_invariant(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: account {} balance {} is negative",
            self.id,
            self.balance
        );
    }
}
