//! Coin amounts keyed by denomination.
//!
//! [`Coins`] is an ordered, zero-free set of `(denom, amount)` pairs. It is
//! used for integer ledger amounts (reserves, fees, max prices) and for
//! unrounded decimal curve outputs alike; rounding to whole units is an
//! explicit step performed by the pricing crate.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::Denom;

/// A single amount of one denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub denom: Denom,
    pub amount: Decimal,
}

impl Coin {
    #[must_use]
    pub fn new(denom: impl Into<Denom>, amount: Decimal) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Ordered set of coin amounts. Zero amounts are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coins(BTreeMap<Denom, Decimal>);

impl Coins {
    /// An empty coin set.
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// A coin set holding one amount (empty if the amount is zero).
    #[must_use]
    pub fn single(denom: impl Into<Denom>, amount: Decimal) -> Self {
        let mut coins = Self::new();
        if !amount.is_zero() {
            coins.0.insert(denom.into(), amount);
        }
        coins
    }

    /// Amount held for `denom`, zero if absent.
    #[must_use]
    pub fn amount_of(&self, denom: &str) -> Decimal {
        self.0.get(denom).copied().unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if `denom` has a non-zero amount.
    #[must_use]
    pub fn contains(&self, denom: &str) -> bool {
        self.0.contains_key(denom)
    }

    /// Iterate `(denom, amount)` pairs in ascending denom order.
    pub fn iter(&self) -> impl Iterator<Item = (&Denom, &Decimal)> {
        self.0.iter()
    }

    /// Denominations present, in ascending order.
    pub fn denoms(&self) -> impl Iterator<Item = &Denom> {
        self.0.keys()
    }

    /// Component-wise sum. `None` on overflow.
    #[must_use]
    pub fn checked_add(&self, other: &Coins) -> Option<Coins> {
        let mut out = self.0.clone();
        for (denom, amount) in &other.0 {
            let current = out.get(denom).copied().unwrap_or(Decimal::ZERO);
            out.insert(denom.clone(), current.checked_add(*amount)?);
        }
        Some(Self::normalized(out))
    }

    /// Component-wise difference. `None` if any component would go
    /// negative or on overflow.
    #[must_use]
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut out = self.0.clone();
        for (denom, amount) in &other.0 {
            let current = out.get(denom).copied().unwrap_or(Decimal::ZERO);
            let next = current.checked_sub(*amount)?;
            if next.is_sign_negative() && !next.is_zero() {
                return None;
            }
            out.insert(denom.clone(), next);
        }
        Some(Self::normalized(out))
    }

    /// True if any amount in `self` is greater than the same denom in
    /// `other` (absent denoms in `other` count as zero).
    #[must_use]
    pub fn is_any_gt(&self, other: &Coins) -> bool {
        self.0
            .iter()
            .any(|(denom, amount)| *amount > other.amount_of(denom))
    }

    /// True if any amount exceeds its limit. Denoms without a limit are
    /// unlimited, so an empty `limits` set never trips.
    #[must_use]
    pub fn exceeds_limits(&self, limits: &Coins) -> bool {
        self.0.iter().any(|(denom, amount)| {
            limits
                .0
                .get(denom)
                .is_some_and(|limit| amount > limit)
        })
    }

    /// True if any amount is negative.
    #[must_use]
    pub fn is_any_negative(&self) -> bool {
        self.0.values().any(|a| a.is_sign_negative() && !a.is_zero())
    }

    /// True if every amount is a whole number.
    #[must_use]
    pub fn is_integral(&self) -> bool {
        self.0.values().all(|a| a.fract().is_zero())
    }

    /// Apply an infallible transform to every amount, dropping zero results.
    #[must_use]
    pub fn map(&self, mut f: impl FnMut(Decimal) -> Decimal) -> Coins {
        Self::normalized(
            self.0
                .iter()
                .map(|(denom, amount)| (denom.clone(), f(*amount)))
                .collect(),
        )
    }

    /// Apply a fallible transform to every amount, dropping zero results.
    pub fn try_map<E>(
        &self,
        mut f: impl FnMut(&Denom, Decimal) -> Result<Decimal, E>,
    ) -> Result<Coins, E> {
        let mut out = BTreeMap::new();
        for (denom, amount) in &self.0 {
            out.insert(denom.clone(), f(denom, *amount)?);
        }
        Ok(Self::normalized(out))
    }

    /// Explicit coin list with a zero entry for every denom in `denoms`
    /// that `self` lacks. Used for query responses.
    #[must_use]
    pub fn zero_filled(&self, denoms: &[Denom]) -> Vec<Coin> {
        let mut all: BTreeMap<Denom, Decimal> = denoms
            .iter()
            .map(|d| (d.clone(), Decimal::ZERO))
            .collect();
        for (denom, amount) in &self.0 {
            all.insert(denom.clone(), *amount);
        }
        all.into_iter()
            .map(|(denom, amount)| Coin { denom, amount })
            .collect()
    }

    fn normalized(map: BTreeMap<Denom, Decimal>) -> Self {
        Self(map.into_iter().filter(|(_, a)| !a.is_zero()).collect())
    }
}

impl FromIterator<(Denom, Decimal)> for Coins {
    /// Collect pairs, summing repeated denoms and dropping zeros.
    fn from_iter<I: IntoIterator<Item = (Denom, Decimal)>>(iter: I) -> Self {
        let mut map: BTreeMap<Denom, Decimal> = BTreeMap::new();
        for (denom, amount) in iter {
            *map.entry(denom).or_insert(Decimal::ZERO) += amount;
        }
        Self::normalized(map)
    }
}

impl FromIterator<Coin> for Coins {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        iter.into_iter().map(|c| (c.denom, c.amount)).collect()
    }
}

impl From<Coin> for Coins {
    fn from(coin: Coin) -> Self {
        Self::single(coin.denom, coin.amount)
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (denom, amount) in &self.0 {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{amount}{denom}")?;
            first = false;
        }
        Ok(())
    }
}
