//! The market entity and its lifecycle state machine.
//!
//! ```text
//!   Augmented:  HATCH ──(supply ≥ S0 at settlement)──> OPEN ──(outcome payment)──> SETTLE
//!   Others:                                            OPEN ──(outcome payment)──> SETTLE
//! ```
//!
//! No transition re-enters Hatch or Open.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, BondwarsError, Coins, Curve, CurveKind, Denom, Result, constants};

/// Lifecycle state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarketState {
    /// Augmented-only opening phase: fixed price `p0`, sells disabled.
    Hatch,
    /// Normal curve pricing.
    Open,
    /// Terminal: trading disabled, pro-rata reserve withdrawal enabled.
    Settle,
}

impl MarketState {
    /// The only legal successor of this state, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Hatch => Some(Self::Open),
            Self::Open => Some(Self::Settle),
            Self::Settle => None,
        }
    }

    /// Whether `target` is a legal transition from this state.
    #[must_use]
    pub fn can_transition_to(self, target: Self) -> bool {
        self.next() == Some(target)
    }

    /// Buys are accepted in Hatch and Open.
    #[must_use]
    pub fn accepts_buys(self) -> bool {
        matches!(self, Self::Hatch | Self::Open)
    }
}

impl fmt::Display for MarketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hatch => write!(f, "HATCH"),
            Self::Open => write!(f, "OPEN"),
            Self::Settle => write!(f, "SETTLE"),
        }
    }
}

/// A bonding-curve market, one per token denomination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Market {
    pub token: Denom,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub curve: Curve,
    /// Sorted for Swapper markets.
    pub reserve_tokens: Vec<Denom>,
    pub tx_fee_percentage: Decimal,
    pub exit_fee_percentage: Decimal,
    pub fee_address: Address,
    pub max_supply: Decimal,
    pub order_quantity_limits: Coins,
    pub sanity_rate: Decimal,
    pub sanity_margin_percentage: Decimal,
    pub current_supply: Decimal,
    pub current_reserve: Coins,
    pub allow_sells: bool,
    pub signers: Vec<Address>,
    pub batch_blocks: u64,
    pub outcome_payment: Coins,
    pub state: MarketState,
}

impl Market {
    #[must_use]
    pub fn kind(&self) -> CurveKind {
        self.curve.kind()
    }

    /// A coin set holding `amount` of every reserve token.
    #[must_use]
    pub fn reserve_coins(&self, amount: Decimal) -> Coins {
        self.reserve_tokens
            .iter()
            .map(|d| (d.clone(), amount))
            .collect()
    }

    #[must_use]
    pub fn is_reserve_token(&self, denom: &str) -> bool {
        self.reserve_tokens.iter().any(|d| d == denom)
    }

    /// Signer lists must match exactly, including order.
    #[must_use]
    pub fn signers_equal_to(&self, signers: &[Address]) -> bool {
        self.signers == signers
    }

    /// True if `coins` holds a non-zero amount of exactly the reserve
    /// tokens and nothing else.
    #[must_use]
    pub fn reserve_denoms_equal_to(&self, coins: &Coins) -> bool {
        coins.len() == self.reserve_tokens.len()
            && self.reserve_tokens.iter().all(|d| coins.contains(d))
    }

    #[must_use]
    pub fn order_quantity_limits_exceeded(&self, amounts: &Coins) -> bool {
        amounts.exceeds_limits(&self.order_quantity_limits)
    }

    /// Whether the reserve ratio of `reserves` falls outside the sanity
    /// band `rate·(1 ± margin/100)`. A zero sanity rate disables the check.
    ///
    /// The ratio is `reserve[first] / reserve[second]` over the sorted
    /// reserve tokens.
    #[must_use]
    pub fn reserves_violate_sanity_rate(&self, reserves: &Coins) -> bool {
        if self.sanity_rate.is_zero() {
            return false;
        }
        let (Some(first), Some(second)) = (self.reserve_tokens.first(), self.reserve_tokens.get(1))
        else {
            return false;
        };
        let numerator = reserves.amount_of(first);
        let denominator = reserves.amount_of(second);
        let Some(rate) = numerator.checked_div(denominator) else {
            return true;
        };

        let Some(margin) = self
            .sanity_margin_percentage
            .checked_div(Decimal::from(constants::PERCENT))
        else {
            return true;
        };
        // An upper bound beyond the decimal range excludes nothing.
        let max_rate = (Decimal::ONE + margin).checked_mul(self.sanity_rate);
        let min_rate = (Decimal::ONE - margin)
            .checked_mul(self.sanity_rate)
            .unwrap_or(Decimal::ZERO)
            .max(Decimal::ZERO);
        rate < min_rate || max_rate.is_some_and(|max| rate > max)
    }

    /// Check that minting up to `supply_after` tokens is allowed.
    ///
    /// A hatching augmented market may not mint past `S0`; every market is
    /// bounded by its max supply.
    pub fn ensure_mintable(&self, supply_after: Decimal) -> Result<()> {
        if self.state == MarketState::Hatch {
            if let Some(s0) = self.hatch_supply_target() {
                if supply_after > s0 {
                    return Err(BondwarsError::ExceedsHatchSupply { s0 });
                }
            }
        }
        if supply_after > self.max_supply {
            return Err(BondwarsError::ExceedsMaxSupply {
                max_supply: self.max_supply,
            });
        }
        Ok(())
    }

    /// `S0` for Augmented curves.
    #[must_use]
    pub fn hatch_supply_target(&self) -> Option<Decimal> {
        match &self.curve {
            Curve::Augmented(p) => Some(p.s0),
            _ => None,
        }
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl Market {
    /// A Power market `m=12, n=2, c=100` over reserve `res`, no fees,
    /// max supply 1,000,000, one-block windows.
    #[must_use]
    pub fn dummy_power(token: &str) -> Self {
        Self {
            token: token.to_string(),
            name: "dummy".to_string(),
            description: "dummy power market".to_string(),
            creator: Address::new("creator"),
            curve: Curve::Power(crate::PowerParams {
                m: Decimal::new(12, 0),
                n: 2,
                c: Decimal::new(100, 0),
            }),
            reserve_tokens: vec!["res".to_string()],
            tx_fee_percentage: Decimal::ZERO,
            exit_fee_percentage: Decimal::ZERO,
            fee_address: Address::new("feeaddr"),
            max_supply: Decimal::new(1_000_000, 0),
            order_quantity_limits: Coins::new(),
            sanity_rate: Decimal::ZERO,
            sanity_margin_percentage: Decimal::ZERO,
            current_supply: Decimal::ZERO,
            current_reserve: Coins::new(),
            allow_sells: true,
            signers: vec![Address::new("creator")],
            batch_blocks: 1,
            outcome_payment: Coins::new(),
            state: MarketState::Open,
        }
    }

    /// A Swapper market over `res` and `rez`, no fees, no sanity rate.
    #[must_use]
    pub fn dummy_swapper(token: &str) -> Self {
        Self {
            curve: Curve::Swapper,
            reserve_tokens: vec!["res".to_string(), "rez".to_string()],
            description: "dummy swapper market".to_string(),
            ..Self::dummy_power(token)
        }
    }
}
