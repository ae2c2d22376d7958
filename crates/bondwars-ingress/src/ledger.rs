//! The ledger seam: account balances, transfers, minting and burning.
//!
//! The engine never owns balances. It asks a [`Ledger`] to move coins
//! between accounts and to mint or burn market tokens through the
//! mint/burn module account. Every call is atomic: it either applies in
//! full or leaves balances untouched.
//!
//! [`InMemoryLedger`] is the reference implementation used by tests and
//! single-process hosts.

use std::collections::BTreeMap;

use bondwars_types::{Address, BondwarsError, Coins, Denom, Result};
use rust_decimal::Decimal;

/// Account balance operations the engine depends on.
///
/// Implementations must fail only on insufficient funds, reported as
/// [`BondwarsError::InsufficientFunds`].
pub trait Ledger {
    /// Saved ledger state for rolling back a failed multi-step operation.
    type Snapshot;

    /// Move `amount` from one account to another.
    fn transfer(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()>;

    /// Create `amount` in the mint/burn module account.
    fn mint(&mut self, amount: &Coins) -> Result<()>;

    /// Destroy `amount` held by the mint/burn module account.
    fn burn(&mut self, amount: &Coins) -> Result<()>;

    /// Balance of one denomination held by `owner`.
    fn balance_of(&self, owner: &Address, denom: &str) -> Decimal;

    /// Total outstanding supply of a denomination.
    fn supply_of(&self, denom: &str) -> Decimal;

    fn snapshot(&self) -> Self::Snapshot;

    /// Return to a state captured by [`Ledger::snapshot`].
    fn restore(&mut self, snapshot: Self::Snapshot);

    /// Mint `amount` and hand it to `to`.
    fn mint_to(&mut self, to: &Address, amount: &Coins) -> Result<()> {
        self.mint(amount)?;
        self.transfer(&Address::mint_burn_account(), to, amount)
    }

    /// Take `amount` from `from` and burn it.
    fn burn_from(&mut self, from: &Address, amount: &Coins) -> Result<()> {
        self.transfer(from, &Address::mint_burn_account(), amount)?;
        self.burn(amount)
    }
}

/// Ordered in-memory ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<(Address, Denom), Decimal>,
    supply: BTreeMap<Denom, Decimal>,
}

impl InMemoryLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly created coins straight to `owner` (genesis funding).
    pub fn deposit(&mut self, owner: &Address, amount: &Coins) {
        for (denom, value) in amount.iter() {
            *self
                .balances
                .entry((owner.clone(), denom.clone()))
                .or_insert(Decimal::ZERO) += *value;
            *self.supply.entry(denom.clone()).or_insert(Decimal::ZERO) += *value;
        }
    }

    /// Every non-zero balance held by `owner`.
    #[must_use]
    pub fn balances_of(&self, owner: &Address) -> Coins {
        self.balances
            .iter()
            .filter(|((holder, _), _)| holder == owner)
            .map(|((_, denom), amount)| (denom.clone(), *amount))
            .collect()
    }

    fn ensure_available(&self, owner: &Address, amount: &Coins) -> Result<()> {
        for (denom, needed) in amount.iter() {
            let available = self.balance_of(owner, denom);
            if available < *needed {
                return Err(BondwarsError::InsufficientFunds {
                    owner: owner.to_string(),
                    denom: denom.clone(),
                    needed: *needed,
                    available,
                });
            }
        }
        Ok(())
    }

    fn debit(&mut self, owner: &Address, amount: &Coins) {
        for (denom, value) in amount.iter() {
            let key = (owner.clone(), denom.clone());
            let remaining = self.balances.get(&key).copied().unwrap_or(Decimal::ZERO) - *value;
            if remaining.is_zero() {
                self.balances.remove(&key);
            } else {
                self.balances.insert(key, remaining);
            }
        }
    }

    fn credit(&mut self, owner: &Address, amount: &Coins) {
        for (denom, value) in amount.iter() {
            *self
                .balances
                .entry((owner.clone(), denom.clone()))
                .or_insert(Decimal::ZERO) += *value;
        }
    }
}

impl Ledger for InMemoryLedger {
    type Snapshot = InMemoryLedger;

    fn transfer(&mut self, from: &Address, to: &Address, amount: &Coins) -> Result<()> {
        if amount.is_any_negative() {
            return Err(BondwarsError::InvalidArgument {
                field: "amount",
                reason: format!("negative transfer {amount}"),
            });
        }
        self.ensure_available(from, amount)?;
        self.debit(from, amount);
        self.credit(to, amount);
        Ok(())
    }

    fn mint(&mut self, amount: &Coins) -> Result<()> {
        if amount.is_any_negative() {
            return Err(BondwarsError::InvalidArgument {
                field: "amount",
                reason: format!("negative mint {amount}"),
            });
        }
        self.deposit(&Address::mint_burn_account(), amount);
        Ok(())
    }

    fn burn(&mut self, amount: &Coins) -> Result<()> {
        let module = Address::mint_burn_account();
        self.ensure_available(&module, amount)?;
        self.debit(&module, amount);
        for (denom, value) in amount.iter() {
            *self.supply.entry(denom.clone()).or_insert(Decimal::ZERO) -= *value;
        }
        Ok(())
    }

    fn balance_of(&self, owner: &Address, denom: &str) -> Decimal {
        self.balances
            .get(&(owner.clone(), denom.to_string()))
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    fn supply_of(&self, denom: &str) -> Decimal {
        self.supply.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    fn snapshot(&self) -> Self::Snapshot {
        self.clone()
    }

    fn restore(&mut self, snapshot: Self::Snapshot) {
        *self = snapshot;
    }
}
