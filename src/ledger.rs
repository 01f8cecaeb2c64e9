//! In-memory account ledger.
//!
//! Provides a thread-safe account store with:
//! - First-writer-wins account creation
//! - Credit and debit without overdraft protection
//! - Balance lookups that never block each other
//! - Unconditional reset of every account
//!
//! Every operation is a single map operation under one lock, so callers never
//! observe a partially-applied update. No I/O happens while the lock is held.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, trace, warn};

/// Result of a ledger operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerResult {
    /// A new account was opened with a zero balance
    Created,
    /// `create` on an id that is already present
    AlreadyExists,
    /// Balance was credited or debited
    Updated,
    /// Current balance of an account
    Balance(Decimal),
    /// No account with that id
    NotFound,
    /// The new balance would not fit in a `Decimal`; nothing was changed
    Overflow,
}

/// Thread-safe account ledger
#[derive(Debug, Default)]
pub struct Ledger {
    accounts: RwLock<HashMap<String, Decimal>>,
}

impl Ledger {
    /// Create an empty ledger, ready to be shared between connections
    pub fn new() -> Arc<Self> {
        info!("Initializing ledger");
        Arc::new(Self::default())
    }

    // Mutations are single map calls; a poisoned map is still consistent.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Decimal>> {
        self.accounts.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Decimal>> {
        self.accounts.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open an account with a zero balance if the id is not taken yet
    pub fn create(&self, id: &str) -> LedgerResult {
        let mut accounts = self.write();
        if accounts.contains_key(id) {
            return LedgerResult::AlreadyExists;
        }
        accounts.insert(id.to_string(), Decimal::ZERO);
        trace!(account = id, "Account created");
        LedgerResult::Created
    }

    /// Add `amount` to an existing account
    pub fn credit(&self, id: &str, amount: Decimal) -> LedgerResult {
        self.apply(id, |balance| balance.checked_add(amount))
    }

    /// Subtract `amount` from an existing account. Balances may go negative.
    pub fn debit(&self, id: &str, amount: Decimal) -> LedgerResult {
        self.apply(id, |balance| balance.checked_sub(amount))
    }

    fn apply(&self, id: &str, update: impl FnOnce(Decimal) -> Option<Decimal>) -> LedgerResult {
        let mut accounts = self.write();
        let Some(balance) = accounts.get_mut(id) else {
            return LedgerResult::NotFound;
        };
        match update(*balance) {
            Some(updated) => {
                *balance = updated;
                trace!(account = id, balance = %updated, "Balance updated");
                LedgerResult::Updated
            }
            None => {
                warn!(account = id, balance = %balance, "Balance update overflowed");
                LedgerResult::Overflow
            }
        }
    }

    /// Look up the balance of an account
    pub fn status(&self, id: &str) -> LedgerResult {
        match self.read().get(id) {
            Some(balance) => LedgerResult::Balance(*balance),
            None => LedgerResult::NotFound,
        }
    }

    /// Remove every account
    pub fn reset(&self) {
        let mut accounts = self.write();
        let count = accounts.len();
        accounts.clear();
        info!(count, "Reset all accounts");
    }

    /// Number of open accounts
    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::dec;
    use std::sync::Barrier;
    use std::thread;

    #[test]
    fn test_create_then_status_is_zero() {
        let ledger = Ledger::new();

        assert_eq!(ledger.create("100"), LedgerResult::Created);
        assert_eq!(ledger.status("100"), LedgerResult::Balance(Decimal::ZERO));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_create_existing_keeps_balance() {
        let ledger = Ledger::new();

        ledger.create("1");
        ledger.credit("1", dec!(25.50));

        assert_eq!(ledger.create("1"), LedgerResult::AlreadyExists);
        assert_eq!(ledger.status("1"), LedgerResult::Balance(dec!(25.50)));
    }

    #[test]
    fn test_credit_and_debit() {
        let ledger = Ledger::new();

        ledger.create("1");
        assert_eq!(ledger.credit("1", dec!(10.5)), LedgerResult::Updated);
        assert_eq!(ledger.debit("1", dec!(3.25)), LedgerResult::Updated);
        assert_eq!(ledger.status("1"), LedgerResult::Balance(dec!(7.25)));
    }

    #[test]
    fn test_debit_can_overdraw() {
        let ledger = Ledger::new();

        ledger.create("1");
        ledger.credit("1", dec!(5));
        ledger.debit("1", dec!(12.75));

        assert_eq!(ledger.status("1"), LedgerResult::Balance(dec!(-7.75)));
    }

    #[test]
    fn test_overflow_leaves_balance_unchanged() {
        let ledger = Ledger::new();

        ledger.create("1");
        assert_eq!(ledger.credit("1", Decimal::MAX), LedgerResult::Updated);
        assert_eq!(ledger.credit("1", Decimal::MAX), LedgerResult::Overflow);
        assert_eq!(ledger.credit("1", dec!(1)), LedgerResult::Overflow);
        assert_eq!(ledger.status("1"), LedgerResult::Balance(Decimal::MAX));

        ledger.create("2");
        assert_eq!(ledger.debit("2", Decimal::MAX), LedgerResult::Updated);
        assert_eq!(ledger.debit("2", dec!(1)), LedgerResult::Overflow);
        assert_eq!(ledger.status("2"), LedgerResult::Balance(Decimal::MIN));

        assert_eq!(ledger.credit("2", dec!(1)), LedgerResult::Updated);
    }

    #[test]
    fn test_missing_account() {
        let ledger = Ledger::new();

        assert_eq!(ledger.credit("nope", dec!(1)), LedgerResult::NotFound);
        assert_eq!(ledger.debit("nope", dec!(1)), LedgerResult::NotFound);
        assert_eq!(ledger.status("nope"), LedgerResult::NotFound);
    }

    #[test]
    fn test_reset() {
        let ledger = Ledger::new();

        ledger.create("1");
        ledger.create("2");
        ledger.reset();

        assert!(ledger.is_empty());
        assert_eq!(ledger.status("1"), LedgerResult::NotFound);
        assert_eq!(ledger.status("2"), LedgerResult::NotFound);
        assert_eq!(ledger.create("1"), LedgerResult::Created);
    }

    #[test]
    fn test_concurrent_create_single_winner() {
        let ledger = Ledger::new();
        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    ledger.create("race")
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let created = results.iter().filter(|r| **r == LedgerResult::Created).count();
        let exists = results
            .iter()
            .filter(|r| **r == LedgerResult::AlreadyExists)
            .count();

        assert_eq!(created, 1);
        assert_eq!(exists, threads - 1);
    }

    #[test]
    fn test_concurrent_credits_are_not_lost() {
        let ledger = Ledger::new();
        ledger.create("1");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || {
                    for _ in 0..100 {
                        ledger.credit("1", dec!(0.01));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ledger.status("1"), LedgerResult::Balance(dec!(8.00)));
    }
}
