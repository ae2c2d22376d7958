//! Configuration types: engine-wide settings and the market creation and
//! edit commands.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, BondwarsError, Coins, Curve, CurveKind, Denom, Market, MarketState, Result,
    constants, validate_denom,
};

/// Engine-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Denominations that may not be used as market tokens.
    pub reserved_tokens: Vec<Denom>,
    /// Maximum orders accepted into one batch window.
    pub max_orders_per_batch: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reserved_tokens: Vec::new(),
            max_orders_per_batch: constants::MAX_ORDERS_PER_BATCH,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| BondwarsError::Config {
            reason: e.to_string(),
        })
    }

    #[must_use]
    pub fn is_reserved(&self, token: &str) -> bool {
        self.reserved_tokens.iter().any(|t| t == token)
    }
}

/// Market creation command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub token: Denom,
    pub name: String,
    pub description: String,
    pub creator: Address,
    pub curve_kind: CurveKind,
    pub curve_params: BTreeMap<String, Decimal>,
    pub reserve_tokens: Vec<Denom>,
    pub tx_fee_percentage: Decimal,
    pub exit_fee_percentage: Decimal,
    pub fee_address: Address,
    pub max_supply: Decimal,
    #[serde(default)]
    pub order_quantity_limits: Coins,
    #[serde(default)]
    pub sanity_rate: Decimal,
    #[serde(default)]
    pub sanity_margin_percentage: Decimal,
    pub allow_sells: bool,
    pub signers: Vec<Address>,
    pub batch_blocks: u64,
    #[serde(default)]
    pub outcome_payment: Coins,
}

impl MarketConfig {
    /// Check every field and build the initial market record.
    ///
    /// Augmented markets start in Hatch with sells disabled; every other
    /// curve starts Open with the configured `allow_sells`.
    pub fn into_market(self) -> Result<Market> {
        validate_denom(&self.token)?;
        if self.name.trim().is_empty() {
            return Err(arg("name", "cannot be empty"));
        }
        if self.description.trim().is_empty() {
            return Err(arg("description", "cannot be empty"));
        }
        if self.creator.is_empty() {
            return Err(arg("creator", "cannot be empty"));
        }
        if self.fee_address.is_empty() {
            return Err(arg("fee_address", "cannot be empty"));
        }
        if self.signers.is_empty() || self.signers.iter().any(Address::is_empty) {
            return Err(arg("signers", "must be a non-empty list of addresses"));
        }

        let curve = Curve::from_params(self.curve_kind, &self.curve_params)?;
        let reserve_tokens = self.checked_reserve_tokens()?;
        self.check_fees()?;

        if self.max_supply <= Decimal::ZERO || !self.max_supply.fract().is_zero() {
            return Err(arg("max_supply", "must be a positive whole amount"));
        }
        if self.order_quantity_limits.is_any_negative() || !self.order_quantity_limits.is_integral()
        {
            return Err(arg("order_quantity_limits", "must be non-negative whole amounts"));
        }
        if self.sanity_rate.is_sign_negative() && !self.sanity_rate.is_zero() {
            return Err(arg("sanity_rate", "cannot be negative"));
        }
        if self.sanity_margin_percentage.is_sign_negative()
            && !self.sanity_margin_percentage.is_zero()
        {
            return Err(arg("sanity_margin_percentage", "cannot be negative"));
        }
        if self.batch_blocks == 0 {
            return Err(arg("batch_blocks", "must be positive"));
        }
        if self.outcome_payment.is_any_negative() || !self.outcome_payment.is_integral() {
            return Err(arg("outcome_payment", "must be non-negative whole amounts"));
        }

        let (state, allow_sells) = match curve.kind() {
            CurveKind::Augmented => (MarketState::Hatch, false),
            _ => (MarketState::Open, self.allow_sells),
        };

        Ok(Market {
            token: self.token,
            name: self.name,
            description: self.description,
            creator: self.creator,
            curve,
            reserve_tokens,
            tx_fee_percentage: self.tx_fee_percentage,
            exit_fee_percentage: self.exit_fee_percentage,
            fee_address: self.fee_address,
            max_supply: self.max_supply,
            order_quantity_limits: self.order_quantity_limits,
            sanity_rate: self.sanity_rate,
            sanity_margin_percentage: self.sanity_margin_percentage,
            current_supply: Decimal::ZERO,
            current_reserve: Coins::new(),
            allow_sells,
            signers: self.signers,
            batch_blocks: self.batch_blocks,
            outcome_payment: self.outcome_payment,
            state,
        })
    }

    fn checked_reserve_tokens(&self) -> Result<Vec<Denom>> {
        let invalid = |reason: String| BondwarsError::InvalidReserveTokens { reason };
        if self.reserve_tokens.is_empty() {
            return Err(invalid("at least one reserve token is required".to_string()));
        }
        if let Some(expected) = self.curve_kind.reserve_token_count() {
            if self.reserve_tokens.len() != expected {
                return Err(invalid(format!(
                    "{} curves need exactly {expected} reserve tokens, got {}",
                    self.curve_kind,
                    self.reserve_tokens.len()
                )));
            }
        }
        let mut sorted = self.reserve_tokens.clone();
        for denom in &sorted {
            validate_denom(denom)?;
            if *denom == self.token {
                return Err(invalid(format!("{denom} is the market token")));
            }
        }
        sorted.sort();
        if sorted.windows(2).any(|w| w[0] == w[1]) {
            return Err(invalid("duplicate reserve tokens".to_string()));
        }
        Ok(if self.curve_kind == CurveKind::Swapper {
            sorted
        } else {
            self.reserve_tokens.clone()
        })
    }

    fn check_fees(&self) -> Result<()> {
        let invalid = |reason: &str| BondwarsError::InvalidFees {
            reason: reason.to_string(),
        };
        if self.tx_fee_percentage.is_sign_negative() && !self.tx_fee_percentage.is_zero() {
            return Err(invalid("tx fee percentage cannot be negative"));
        }
        if self.exit_fee_percentage.is_sign_negative() && !self.exit_fee_percentage.is_zero() {
            return Err(invalid("exit fee percentage cannot be negative"));
        }
        let total = self
            .tx_fee_percentage
            .checked_add(self.exit_fee_percentage)
            .ok_or_else(|| invalid("fee percentages overflow"))?;
        if total >= Decimal::from(constants::PERCENT) {
            return Err(invalid("fee percentages must add up to less than 100"));
        }
        Ok(())
    }
}

/// New sanity settings for a Swapper market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SanityEdit {
    /// Disable the sanity check (rate and margin both zero).
    Clear,
    Set { rate: Decimal, margin_percentage: Decimal },
}

/// Market edit command. `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketEdit {
    pub name: Option<String>,
    pub description: Option<String>,
    pub order_quantity_limits: Option<Coins>,
    pub sanity: Option<SanityEdit>,
}

impl MarketEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.order_quantity_limits.is_none()
            && self.sanity.is_none()
    }

    /// Validate and apply to `market`.
    pub fn apply(&self, market: &mut Market) -> Result<()> {
        if self.is_empty() {
            return Err(BondwarsError::NoEdits);
        }
        if let Some(limits) = &self.order_quantity_limits {
            if limits.is_any_negative() || !limits.is_integral() {
                return Err(arg("order_quantity_limits", "must be non-negative whole amounts"));
            }
        }
        let sanity = match &self.sanity {
            Some(SanityEdit::Clear) => Some((Decimal::ZERO, Decimal::ZERO)),
            Some(SanityEdit::Set {
                rate,
                margin_percentage,
            }) => {
                if rate.is_sign_negative() && !rate.is_zero() {
                    return Err(arg("sanity_rate", "cannot be negative"));
                }
                if margin_percentage.is_sign_negative() && !margin_percentage.is_zero() {
                    return Err(arg("sanity_margin_percentage", "cannot be negative"));
                }
                Some((*rate, *margin_percentage))
            }
            None => None,
        };

        if let Some(name) = &self.name {
            market.name.clone_from(name);
        }
        if let Some(description) = &self.description {
            market.description.clone_from(description);
        }
        if let Some(limits) = &self.order_quantity_limits {
            market.order_quantity_limits = limits.clone();
        }
        if let Some((rate, margin)) = sanity {
            market.sanity_rate = rate;
            market.sanity_margin_percentage = margin;
        }
        Ok(())
    }
}

fn arg(field: &'static str, reason: &str) -> BondwarsError {
    BondwarsError::InvalidArgument {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(any(test, feature = "test-helpers"))]
impl MarketConfig {
    /// Power curve `m=12, n=2, c=100` over `res`, no fees, max supply
    /// 1,000,000, one-block windows, sells allowed.
    #[must_use]
    pub fn dummy_power(token: &str) -> Self {
        Self {
            token: token.to_string(),
            name: "Dummy".to_string(),
            description: "dummy power market".to_string(),
            creator: Address::new("creator"),
            curve_kind: CurveKind::Power,
            curve_params: [
                ("m".to_string(), Decimal::new(12, 0)),
                ("n".to_string(), Decimal::new(2, 0)),
                ("c".to_string(), Decimal::new(100, 0)),
            ]
            .into_iter()
            .collect(),
            reserve_tokens: vec!["res".to_string()],
            tx_fee_percentage: Decimal::ZERO,
            exit_fee_percentage: Decimal::ZERO,
            fee_address: Address::new("feeaddr"),
            max_supply: Decimal::new(1_000_000, 0),
            order_quantity_limits: Coins::new(),
            sanity_rate: Decimal::ZERO,
            sanity_margin_percentage: Decimal::ZERO,
            allow_sells: true,
            signers: vec![Address::new("creator")],
            batch_blocks: 1,
            outcome_payment: Coins::new(),
        }
    }

    /// Sigmoid curve `a=3, b=5, c=1` over `res`.
    #[must_use]
    pub fn dummy_sigmoid(token: &str) -> Self {
        Self {
            curve_kind: CurveKind::Sigmoid,
            curve_params: [
                ("a".to_string(), Decimal::new(3, 0)),
                ("b".to_string(), Decimal::new(5, 0)),
                ("c".to_string(), Decimal::ONE),
            ]
            .into_iter()
            .collect(),
            ..Self::dummy_power(token)
        }
    }

    /// Swapper over `res` and `rez`.
    #[must_use]
    pub fn dummy_swapper(token: &str) -> Self {
        Self {
            curve_kind: CurveKind::Swapper,
            curve_params: BTreeMap::new(),
            reserve_tokens: vec!["res".to_string(), "rez".to_string()],
            ..Self::dummy_power(token)
        }
    }

    /// Augmented curve `d0=5000, p0=0.1, theta=0.4, kappa=3` over `res`
    /// (so `S0 = 50000`, `R0 = 3000`), max supply 1,000,000.
    #[must_use]
    pub fn dummy_augmented(token: &str) -> Self {
        Self {
            curve_kind: CurveKind::Augmented,
            curve_params: [
                ("d0".to_string(), Decimal::new(5000, 0)),
                ("p0".to_string(), Decimal::new(1, 1)),
                ("theta".to_string(), Decimal::new(4, 1)),
                ("kappa".to_string(), Decimal::new(3, 0)),
            ]
            .into_iter()
            .collect(),
            ..Self::dummy_power(token)
        }
    }
}
