//! Ledger core: per-account balances and two-party transfers.
//!
//! Every money movement runs as one atomic unit of work against the stores,
//! so balances never go negative and a transfer is either fully applied or
//! not at all. Reversals undo a successful transfer exactly once.

mod ledger;

pub use ledger::*;
