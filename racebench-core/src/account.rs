//! Shared Account
//!
//! A balance shared by concurrent withdrawers. The same storage backs both
//! policies; the policy only decides whether the check-then-debit sequence
//! runs inside the account's mutex.
//!
//! ```text
//!  Unguarded                          Guarded
//!  ---------                          -------
//!  load balance                       lock ─────────────┐
//!  compare with amount                load balance      │ critical
//!  yield                              compare           │ section
//!  load, store balance - amount       yield             │
//!                                     load, store       │
//!                                     unlock ───────────┘
//! ```
//!
//! The yield between check and debit widens the race window on purpose, so
//! the unguarded policy breaks on almost every trial even on one CPU. The
//! broken rate it produces measures that widened window. It is not the
//! probability of the bare check-then-act race occurring on its own.

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Synchronization policy for a withdrawal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WithdrawalPolicy {
    /// No exclusion between the check and the debit
    Unguarded,
    /// The whole check-then-debit sequence holds the account mutex
    Guarded,
}

impl WithdrawalPolicy {
    /// Both policies, unguarded first
    pub const ALL: [WithdrawalPolicy; 2] = [WithdrawalPolicy::Unguarded, WithdrawalPolicy::Guarded];

    /// Lowercase identifier
    pub fn as_str(self) -> &'static str {
        match self {
            WithdrawalPolicy::Unguarded => "unguarded",
            WithdrawalPolicy::Guarded => "guarded",
        }
    }

    /// Short description of the synchronization in use
    pub fn description(self) -> &'static str {
        match self {
            WithdrawalPolicy::Unguarded => "no lock",
            WithdrawalPolicy::Guarded => "mutex",
        }
    }
}

impl fmt::Display for WithdrawalPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A balance in currency subunits, mutated through `&self`.
///
/// Built fresh for every trial and shared by exactly that trial's two
/// withdrawers.
#[derive(Debug)]
pub struct SharedAccount {
    balance: AtomicI64,
    lock: Mutex<()>,
}

impl SharedAccount {
    /// Open an account holding `starting_balance` subunits
    pub fn new(starting_balance: i64) -> Self {
        Self {
            balance: AtomicI64::new(starting_balance),
            lock: Mutex::new(()),
        }
    }

    /// Current balance
    pub fn balance(&self) -> i64 {
        self.balance.load(Ordering::SeqCst)
    }

    /// Withdraw `amount` if the balance covers it. Returns whether the debit happened.
    pub fn withdraw(&self, amount: i64, policy: WithdrawalPolicy) -> bool {
        match policy {
            WithdrawalPolicy::Unguarded => self.check_then_debit(amount),
            WithdrawalPolicy::Guarded => {
                // Poisoning cannot leave the balance half-written: the debit is a single store.
                let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
                self.check_then_debit(amount)
            }
        }
    }

    fn check_then_debit(&self, amount: i64) -> bool {
        if self.balance.load(Ordering::Relaxed) < amount {
            return false;
        }

        // Widens the window: the other withdrawer may run between the check and the debit.
        std::thread::yield_now();

        let current = self.balance.load(Ordering::Relaxed);
        self.balance
            .store(current.saturating_sub(amount), Ordering::Relaxed);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const START: i64 = 100_000;
    const AMOUNT: i64 = 70_000;

    #[test]
    fn test_single_thread_withdrawals() {
        for policy in WithdrawalPolicy::ALL {
            let account = SharedAccount::new(START);
            assert!(account.withdraw(AMOUNT, policy));
            assert_eq!(account.balance(), 30_000);
            assert!(!account.withdraw(AMOUNT, policy));
            assert_eq!(account.balance(), 30_000);
        }
    }

    #[test]
    fn test_exact_balance_is_affordable() {
        let account = SharedAccount::new(AMOUNT);
        assert!(account.withdraw(AMOUNT, WithdrawalPolicy::Guarded));
        assert_eq!(account.balance(), 0);
    }

    #[test]
    fn test_guarded_never_goes_negative() {
        for _ in 0..2_000 {
            let account = Arc::new(SharedAccount::new(START));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let account = Arc::clone(&account);
                    thread::spawn(move || account.withdraw(AMOUNT, WithdrawalPolicy::Guarded))
                })
                .collect();
            let successes = handles
                .into_iter()
                .map(|h| h.join().unwrap())
                .filter(|&ok| ok)
                .count();
            assert_eq!(successes, 1);
            assert_eq!(account.balance(), 30_000);
        }
    }

    #[test]
    fn test_guarded_both_succeed_when_affordable() {
        let account = Arc::new(SharedAccount::new(2 * AMOUNT + 5));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let account = Arc::clone(&account);
                thread::spawn(move || account.withdraw(AMOUNT, WithdrawalPolicy::Guarded))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap());
        }
        assert_eq!(account.balance(), 5);
    }

    #[test]
    fn test_unguarded_outcomes_stay_in_race_set() {
        // Either one debit lands (30_000) or both do (-40_000); nothing else.
        for _ in 0..500 {
            let account = Arc::new(SharedAccount::new(START));
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let account = Arc::clone(&account);
                    thread::spawn(move || account.withdraw(AMOUNT, WithdrawalPolicy::Unguarded))
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert!(matches!(account.balance(), 30_000 | -40_000));
        }
    }

    #[test]
    fn test_policy_labels() {
        assert_eq!(WithdrawalPolicy::Unguarded.to_string(), "unguarded");
        assert_eq!(WithdrawalPolicy::Guarded.description(), "mutex");
    }
}
