//! Structured reporting of ledger activity.
//!
//! The engine never logs directly. It hands a [`LedgerEvent`] to the
//! configured [`LedgerObserver`] once per operation, whatever the outcome.
//! Observers sit outside the correctness contract: they cannot fail an
//! operation and see events only after the unit of work has finished.

use std::fmt;

use super::account::AccountId;
use super::transaction::TransactionId;
use super::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deposit,
    Withdraw,
    Transfer,
    Reverse,
    OpenAccount,
    CloseAccount,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Deposit => write!(f, "deposit"),
            EventKind::Withdraw => write!(f, "withdraw"),
            EventKind::Transfer => write!(f, "transfer"),
            EventKind::Reverse => write!(f, "reverse"),
            EventKind::OpenAccount => write!(f, "open_account"),
            EventKind::CloseAccount => write!(f, "close_account"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Rejected { reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEvent {
    pub kind: EventKind,
    pub accounts: Vec<AccountId>,
    pub transaction: Option<TransactionId>,
    pub amount: Option<Decimal>,
    pub outcome: Outcome,
}

impl LedgerEvent {
    pub(crate) fn new(kind: EventKind) -> Self {
        Self {
            kind,
            accounts: Vec::new(),
            transaction: None,
            amount: None,
            outcome: Outcome::Applied,
        }
    }

    pub(crate) fn account(&mut self, account: AccountId) -> &mut Self {
        if !self.accounts.contains(&account) {
            self.accounts.push(account);
        }
        self
    }

    pub(crate) fn transaction(&mut self, tx: TransactionId) -> &mut Self {
        self.transaction = Some(tx);
        self
    }

    pub(crate) fn amount(&mut self, amount: Decimal) -> &mut Self {
        self.amount = Some(amount);
        self
    }

    pub(crate) fn rejected(&mut self, reason: impl fmt::Display) -> &mut Self {
        self.outcome = Outcome::Rejected {
            reason: reason.to_string(),
        };
        self
    }

    pub fn is_applied(&self) -> bool {
        self.outcome == Outcome::Applied
    }
}

impl fmt::Display for LedgerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.kind)?;
        if !self.accounts.is_empty() {
            let accounts: Vec<String> = self.accounts.iter().map(ToString::to_string).collect();
            write!(f, " accounts={}", accounts.join(","))?;
        }
        if let Some(tx) = self.transaction {
            write!(f, " tx={tx}")?;
        }
        if let Some(amount) = self.amount {
            write!(f, " amount={amount}")?;
        }
        match &self.outcome {
            Outcome::Applied => write!(f, " -> applied"),
            Outcome::Rejected { reason } => write!(f, " -> rejected: {reason}"),
        }
    }
}

pub trait LedgerObserver: Send + Sync + fmt::Debug {
    fn record(&self, event: &LedgerEvent);
}

/// Writes events through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl LedgerObserver for LogObserver {
    fn record(&self, event: &LedgerEvent) {
        match event.outcome {
            Outcome::Applied => log::info!("{event}"),
            Outcome::Rejected { .. } => log::warn!("{event}"),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl LedgerObserver for NoopObserver {
    fn record(&self, _event: &LedgerEvent) {}
}

#[cfg(test)]
pub(crate) mod testing {
    use super::{LedgerEvent, LedgerObserver};
    use parking_lot::Mutex;

    /// Keeps every event for later inspection.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingObserver {
        events: Mutex<Vec<LedgerEvent>>,
    }

    impl RecordingObserver {
        pub(crate) fn events(&self) -> Vec<LedgerEvent> {
            self.events.lock().clone()
        }
    }

    impl LedgerObserver for RecordingObserver {
        fn record(&self, event: &LedgerEvent) {
            self.events.lock().push(event.clone());
        }
    }
}
