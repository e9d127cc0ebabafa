//! Account ledger: process-wide mapping from user name to (balance, inventory).
//!
//! Accounts are created on first lookup and live until process exit; they
//! persist across logout/login by the same user. Debits are atomic
//! succeed-or-leave-untouched; credits cannot fail. The exchange relies on
//! the debit contract for encumbrance.

use crate::error::{BourseError, Result};
use crate::types::{AccountStatus, Funds, Quantity};
use log::debug;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Cap on distinct accounts per process.
pub const MAX_ACCOUNTS: usize = 64;

#[derive(Debug)]
struct AccountState {
    balance: Funds,
    inventory: Quantity,
}

/// Ledger entry for one named user.
///
/// All mutators hold the account lock for the entire read-modify-write.
#[derive(Debug)]
pub struct Account {
    name: String,
    state: Mutex<AccountState>,
}

impl Account {
    fn new(name: String) -> Self {
        Self {
            name,
            state: Mutex::new(AccountState { balance: 0, inventory: 0 }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Unconditional credit. Saturates at `u32::MAX` rather than wrapping.
    pub fn credit_balance(&self, amount: Funds) {
        let mut state = self.state.lock().expect("account lock");
        let old = state.balance;
        state.balance = state.balance.saturating_add(amount);
        debug!("account '{}': balance {} -> {}", self.name, old, state.balance);
    }

    /// Debit that succeeds only if `balance >= amount`; otherwise the account
    /// is left untouched.
    pub fn debit_balance(&self, amount: Funds) -> Result<()> {
        let mut state = self.state.lock().expect("account lock");
        if state.balance < amount {
            return Err(BourseError::InsufficientFunds);
        }
        let old = state.balance;
        state.balance -= amount;
        debug!("account '{}': balance {} -> {}", self.name, old, state.balance);
        Ok(())
    }

    /// Unconditional inventory credit. Saturates rather than wrapping.
    pub fn credit_inventory(&self, quantity: Quantity) {
        let mut state = self.state.lock().expect("account lock");
        let old = state.inventory;
        state.inventory = state.inventory.saturating_add(quantity);
        debug!("account '{}': inventory {} -> {}", self.name, old, state.inventory);
    }

    /// Inventory debit that succeeds only if `inventory >= quantity`.
    pub fn debit_inventory(&self, quantity: Quantity) -> Result<()> {
        let mut state = self.state.lock().expect("account lock");
        if state.inventory < quantity {
            return Err(BourseError::InsufficientInventory);
        }
        let old = state.inventory;
        state.inventory -= quantity;
        debug!("account '{}': inventory {} -> {}", self.name, old, state.inventory);
        Ok(())
    }

    /// Consistent snapshot of (balance, inventory).
    pub fn status(&self) -> AccountStatus {
        let state = self.state.lock().expect("account lock");
        AccountStatus {
            balance: state.balance,
            inventory: state.inventory,
        }
    }
}

/// Process-wide account map. Lookup creates on miss, up to a fixed cap.
#[derive(Debug)]
pub struct AccountLedger {
    accounts: Mutex<HashMap<String, Arc<Account>>>,
    capacity: usize,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_ACCOUNTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Returns the account for `name`, creating it (balance 0, inventory 0)
    /// if absent. Fails only when the cap on distinct accounts is reached.
    pub fn lookup(&self, name: &str) -> Result<Arc<Account>> {
        let mut accounts = self.accounts.lock().expect("ledger lock");
        if let Some(account) = accounts.get(name) {
            return Ok(Arc::clone(account));
        }
        if accounts.len() >= self.capacity {
            return Err(BourseError::LedgerFull);
        }
        let account = Arc::new(Account::new(name.to_string()));
        accounts.insert(name.to_string(), Arc::clone(&account));
        debug!("created account '{}'", name);
        Ok(account)
    }

    pub fn len(&self) -> usize {
        self.accounts.lock().expect("ledger lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AccountLedger {
    fn default() -> Self {
        Self::new()
    }
}
