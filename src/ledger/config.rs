use std::time::Duration;

/// What the engine does with a transfer whose sender and receiver resolve to
/// the same account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum SelfTransferPolicy {
    /// Record the transfer. Balances net to zero but the sender must still
    /// cover the amount.
    #[default]
    Allow,
    /// Fail with `LedgerError::SelfTransfer`.
    Reject,
}

/// Tunables shared by the engine, the lifecycle adapter and the stores.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Longest wait for a single account row lock before the operation fails
    /// with a transient `StoreError::LockTimeout`.
    pub lock_timeout: Duration,
    pub self_transfer: SelfTransferPolicy,
    /// Number of generated account numbers tried before giving up.
    pub max_number_attempts: u32,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(2),
            self_transfer: SelfTransferPolicy::Allow,
            max_number_attempts: 16,
        }
    }
}

impl LedgerConfig {
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_self_transfer(mut self, policy: SelfTransferPolicy) -> Self {
        self.self_transfer = policy;
        self
    }

    pub fn with_max_number_attempts(mut self, attempts: u32) -> Self {
        self.max_number_attempts = attempts;
        self
    }
}
