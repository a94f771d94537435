use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::account::AccountId;
use super::Decimal;

/// Store-assigned transaction identifier. Ids grow with creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    Cancelled,
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionStatus::Success => write!(f, "SUCCESS"),
            TransactionStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// A two-party transfer record.
///
/// The amount is fixed at creation. The status moves from `SUCCESS` to
/// `CANCELLED` at most once, when the transfer is reversed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    id: TransactionId,
    amount: Decimal,
    status: TransactionStatus,
    sender_account_id: AccountId,
    receiver_account_id: AccountId,
    created_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        transfer: &NewTransfer,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            amount: transfer.amount,
            status: TransactionStatus::Success,
            sender_account_id: transfer.sender,
            receiver_account_id: transfer.receiver,
            created_at,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    pub fn sender_account_id(&self) -> AccountId {
        self.sender_account_id
    }

    pub fn receiver_account_id(&self) -> AccountId {
        self.receiver_account_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns true if `account` is the sender or the receiver.
    pub fn involves(&self, account: AccountId) -> bool {
        self.sender_account_id == account || self.receiver_account_id == account
    }

    pub fn is_reversible(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    /// Apply a status transition.
    ///
    /// # Panics (debug only)
    /// Panics on any transition other than `SUCCESS -> CANCELLED`.
    pub(crate) fn transition(&mut self, status: TransactionStatus) {
        debug_assert!(
            self.status == TransactionStatus::Success && status == TransactionStatus::Cancelled,
            "Invalid transition for transaction {}: {} -> {}",
            self.id,
            self.status,
            status
        );
        self.status = status;
    }
}

/// The fields a caller supplies when recording a transfer. The store assigns
/// the id and the timestamp.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewTransfer {
    pub amount: Decimal,
    pub sender: AccountId,
    pub receiver: AccountId,
}
