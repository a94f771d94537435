use std::fmt;

use serde::Deserialize;

use super::account::UserId;
use super::error::OperationError;
use super::transaction::TransactionId;
use super::Decimal;

/// Raw operation as parsed from CSV input.
/// This is the unvalidated form that needs conversion to an `Operation`.
#[derive(Debug, Deserialize, Clone)]
pub struct OperationRecord {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Acting user: required for every operation except `reverse`
    pub user: Option<u64>,
    /// Receiving user: required for `transfer` only
    pub counterparty: Option<u64>,
    /// Transaction to reverse: required for `reverse` only
    pub tx: Option<u64>,
    /// Required for `deposit`, `withdraw` and `transfer`
    pub amount: Option<Decimal>,
}

impl fmt::Display for OperationRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.op_type)?;
        let fields = [
            ("user", self.user.map(|v| v.to_string())),
            ("counterparty", self.counterparty.map(|v| v.to_string())),
            ("tx", self.tx.map(|v| v.to_string())),
            ("amount", self.amount.map(|v| v.to_string())),
        ];
        let present: Vec<String> = fields
            .into_iter()
            .filter_map(|(name, value)| value.map(|value| format!("{name}: {value}")))
            .collect();
        if !present.is_empty() {
            write!(f, " ({})", present.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Open,
    Close,
    Deposit,
    Withdraw,
    Transfer,
    Reverse,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationType::Open => write!(f, "open"),
            OperationType::Close => write!(f, "close"),
            OperationType::Deposit => write!(f, "deposit"),
            OperationType::Withdraw => write!(f, "withdraw"),
            OperationType::Transfer => write!(f, "transfer"),
            OperationType::Reverse => write!(f, "reverse"),
        }
    }
}

/// A structurally valid operation ready for the ledger.
///
/// Only the shape of the row is checked here. Amount signs and account
/// existence are business rules the ledger enforces itself.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Open { user: UserId },
    Close { user: UserId },
    Deposit { user: UserId, amount: Decimal },
    Withdraw { user: UserId, amount: Decimal },
    Transfer {
        user: UserId,
        counterparty: UserId,
        amount: Decimal,
    },
    Reverse { tx: TransactionId },
}

impl TryFrom<OperationRecord> for Operation {
    type Error = OperationError;

    fn try_from(record: OperationRecord) -> Result<Self, Self::Error> {
        use OperationType as T;

        match record {
            OperationRecord {
                op_type: T::Open,
                user: Some(user),
                counterparty: None,
                tx: None,
                amount: None,
            } => Ok(Operation::Open { user: UserId(user) }),
            OperationRecord {
                op_type: T::Close,
                user: Some(user),
                counterparty: None,
                tx: None,
                amount: None,
            } => Ok(Operation::Close { user: UserId(user) }),
            OperationRecord {
                op_type: T::Deposit,
                user: Some(user),
                counterparty: None,
                tx: None,
                amount: Some(amount),
            } => Ok(Operation::Deposit {
                user: UserId(user),
                amount,
            }),
            OperationRecord {
                op_type: T::Withdraw,
                user: Some(user),
                counterparty: None,
                tx: None,
                amount: Some(amount),
            } => Ok(Operation::Withdraw {
                user: UserId(user),
                amount,
            }),
            OperationRecord {
                op_type: T::Transfer,
                user: Some(user),
                counterparty: Some(counterparty),
                tx: None,
                amount: Some(amount),
            } => Ok(Operation::Transfer {
                user: UserId(user),
                counterparty: UserId(counterparty),
                amount,
            }),
            OperationRecord {
                op_type: T::Reverse,
                user: None,
                counterparty: None,
                tx: Some(tx),
                amount: None,
            } => Ok(Operation::Reverse {
                tx: TransactionId(tx),
            }),
            _ => Err(OperationError::InvalidOperation(record)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Open { user } => write!(f, "[open] user={user}"),
            Operation::Close { user } => write!(f, "[close] user={user}"),
            Operation::Deposit { user, amount } => {
                write!(f, "[deposit] user={user} amount={amount}")
            }
            Operation::Withdraw { user, amount } => {
                write!(f, "[withdraw] user={user} amount={amount}")
            }
            Operation::Transfer {
                user,
                counterparty,
                amount,
            } => write!(
                f,
                "[transfer] user={user} counterparty={counterparty} amount={amount}"
            ),
            Operation::Reverse { tx } => write!(f, "[reverse] tx={tx}"),
        }
    }
}
