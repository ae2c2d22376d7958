//! Pricing curve evaluator.
//!
//! Pure functions over a [`Market`] snapshot. Nothing here touches the
//! ledger or the store; the caller passes in the reserve balances it wants
//! priced against.
//!
//! ```text
//!   Power      price(x) = m·xⁿ + c
//!              reserve(x) = m·x^(n+1)/(n+1) + c·x
//!
//!   Sigmoid    price(x) = a·((x−b)/√((x−b)²+c) + 1)
//!              reserve(x) = a·(√((x−b)²+c) + x) − a·√(b²+c)
//!
//!   Augmented  Hatch: price = p0
//!              Open:  reserve(S) = S^κ / V0,  V0 = S0^κ / R0
//!                     price(R) = κ·R^((κ−1)/κ) / V0^(1/κ)   (0 if R < 1)
//!
//!   Swapper    Δreserve_i = (Δsupply / supply) · reserve_i
//!              swap out = ⌊in'·y / (x + in')⌋, in' = in − fee
//! ```
//!
//! Any negative curve output is a [`FatalError`], never a rejection.

use bondwars_types::{
    AugmentedParams, BondwarsError, Coin, Coins, Curve, FatalError, Market, MarketState, Result,
};
use rust_decimal::Decimal;

use crate::decimal::{self, add, div, mul, sub};

// ---------------------------------------------------------------------------
// Augmented curve primitives
// ---------------------------------------------------------------------------

/// Invariant constant `V0 = S0^κ / R0`, chosen so that `reserve(S0) = R0`.
pub fn augmented_invariant(r0: Decimal, s0: Decimal, kappa: u32) -> Result<Decimal> {
    div(decimal::pow_int(s0, kappa)?, r0)
}

/// Reserve held at `supply` on the Open-phase augmented curve.
pub fn augmented_reserve(supply: Decimal, kappa: u32, v0: Decimal) -> Result<Decimal> {
    div(decimal::pow_int(supply, kappa)?, v0)
}

/// Spot price for a given reserve on the Open-phase augmented curve.
pub fn augmented_spot_price(reserve: Decimal, kappa: u32, v0: Decimal) -> Result<Decimal> {
    let kappa_dec = Decimal::from(kappa);
    let root_reserve = decimal::nth_root(reserve, kappa)?;
    let root_v0 = decimal::nth_root(v0, kappa)?;
    let numerator = mul(kappa_dec, decimal::pow_int(root_reserve, kappa - 1)?)?;
    div(numerator, root_v0)
}

/// `V0` if already cached, otherwise derived from `R0` and `S0`.
pub fn resolved_v0(params: &AugmentedParams) -> Result<Decimal> {
    match params.v0 {
        Some(v0) => Ok(v0),
        None => augmented_invariant(params.r0, params.s0, params.kappa),
    }
}

// ---------------------------------------------------------------------------
// Price and reserve at supply
// ---------------------------------------------------------------------------

/// Per-token price at `supply`, one entry per reserve token.
///
/// Not defined for Swapper curves.
pub fn price_at_supply(market: &Market, supply: Decimal) -> Result<Coins> {
    ensure_supply(market, supply)?;
    let price = match &market.curve {
        Curve::Power(p) => add(mul(decimal::pow_int(supply, p.n)?, p.m)?, p.c)?,
        Curve::Sigmoid(p) => {
            let shifted = sub(supply, p.b)?;
            let root = decimal::sqrt(add(mul(shifted, shifted)?, p.c)?)?;
            mul(p.a, add(div(shifted, root)?, Decimal::ONE)?)?
        }
        Curve::Augmented(p) => match market.state {
            MarketState::Hatch => p.p0,
            MarketState::Open | MarketState::Settle => {
                let v0 = resolved_v0(p)?;
                let reserve = augmented_reserve(supply, p.kappa, v0)?;
                if reserve < Decimal::ONE {
                    Decimal::ZERO
                } else {
                    augmented_spot_price(reserve, p.kappa, v0)?
                }
            }
        },
        Curve::Swapper => return Err(not_available(market, "price at supply")),
    };
    ensure_non_negative(market, price, "price")?;
    Ok(market.reserve_coins(price))
}

/// Cumulative reserve the curve requires at `supply`.
///
/// Not defined for Swapper curves.
pub fn reserve_at_supply(market: &Market, supply: Decimal) -> Result<Decimal> {
    ensure_supply(market, supply)?;
    let reserve = match &market.curve {
        Curve::Power(p) => {
            let n_plus_one = p.n.checked_add(1).ok_or(FatalError::ArithmeticOverflow {
                operation: "power exponent",
            })?;
            let integral = div(
                mul(decimal::pow_int(supply, n_plus_one)?, p.m)?,
                Decimal::from(n_plus_one),
            )?;
            add(integral, mul(supply, p.c)?)?
        }
        Curve::Sigmoid(p) => {
            let shifted = sub(supply, p.b)?;
            let root = decimal::sqrt(add(mul(shifted, shifted)?, p.c)?)?;
            let constant = mul(p.a, decimal::sqrt(add(mul(p.b, p.b)?, p.c)?)?)?;
            sub(mul(p.a, add(root, supply)?)?, constant)?
        }
        Curve::Augmented(p) => augmented_reserve(supply, p.kappa, resolved_v0(p)?)?,
        Curve::Swapper => return Err(not_available(market, "reserve at supply")),
    };
    ensure_non_negative(market, reserve, "reserve")?;
    Ok(reserve)
}

/// Current per-token price. Swapper markets price one minted token
/// against `reserves`.
pub fn current_price_per_token(market: &Market, reserves: &Coins) -> Result<Coins> {
    match market.curve {
        Curve::Swapper => prices_to_mint(market, Decimal::ONE, reserves),
        _ => price_at_supply(market, market.current_supply),
    }
}

// ---------------------------------------------------------------------------
// Mint / burn / swap
// ---------------------------------------------------------------------------

/// Swapper only: reserve movement for minting or burning `delta` tokens,
/// `Δ_i = (delta / supply) · reserve_i`.
pub fn reserve_delta_for_liquidity_delta(
    market: &Market,
    delta: Decimal,
    reserves: &Coins,
) -> Result<Coins> {
    if !matches!(market.curve, Curve::Swapper) {
        return Err(not_available(market, "reserve delta for liquidity delta"));
    }
    ensure_non_negative(market, delta, "liquidity delta")?;
    if market.current_supply.is_zero() {
        return Err(BondwarsError::RequiresNonZeroSupply);
    }
    let alpha = div(delta, market.current_supply)?;
    let delta_coins = market
        .reserve_tokens
        .iter()
        .map(|denom| Ok((denom.clone(), mul(alpha, reserves.amount_of(denom))?)))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .collect::<Coins>();
    if delta_coins.is_any_negative() {
        return Err(negative(market, "reserve delta"));
    }
    Ok(delta_coins)
}

/// Unrounded reserve cost of minting `mint` tokens, fees excluded.
///
/// While an augmented market is in Hatch the cost is `p0·mint`. A negative
/// difference (earlier buyers overpaid) is charged as one unit.
pub fn prices_to_mint(market: &Market, mint: Decimal, reserves: &Coins) -> Result<Coins> {
    ensure_non_negative(market, mint, "mint amount")?;
    if reserves.is_any_negative() {
        return Err(negative(market, "reserve balance"));
    }

    match &market.curve {
        Curve::Augmented(p) if market.state == MarketState::Hatch => {
            Ok(market.reserve_coins(mul(p.p0, mint)?))
        }
        Curve::Swapper => reserve_delta_for_liquidity_delta(market, mint, reserves),
        Curve::Power(_) | Curve::Sigmoid(_) | Curve::Augmented(_) => {
            let target = reserve_at_supply(market, add(market.current_supply, mint)?)?;
            let mut price = sub(target, common_reserve_balance(reserves))?;
            if price.is_sign_negative() && !price.is_zero() {
                price = Decimal::ONE;
            }
            Ok(market.reserve_coins(price))
        }
    }
}

/// Unrounded reserve returned for burning `burn` tokens, fees excluded.
pub fn returns_for_burn(market: &Market, burn: Decimal, reserves: &Coins) -> Result<Coins> {
    ensure_non_negative(market, burn, "burn amount")?;
    if reserves.is_any_negative() {
        return Err(negative(market, "reserve balance"));
    }

    match &market.curve {
        Curve::Swapper => reserve_delta_for_liquidity_delta(market, burn, reserves),
        Curve::Power(_) | Curve::Sigmoid(_) | Curve::Augmented(_) => {
            let target = reserve_at_supply(market, sub(market.current_supply, burn)?)?;
            let balance = common_reserve_balance(reserves);
            if target > balance {
                return Err(FatalError::BurnExceedsReserve {
                    market: market.token.clone(),
                }
                .into());
            }
            Ok(market.reserve_coins(sub(balance, target)?))
        }
    }
}

/// Swapper only: output and fee for swapping `from` into `to_token`.
///
/// The tx fee comes off the input first; the fee-adjusted input is then
/// priced with the constant-product formula and truncated to whole units.
pub fn returns_for_swap(
    market: &Market,
    from: &Coin,
    to_token: &str,
    reserves: &Coins,
) -> Result<(Coin, Coin)> {
    if !matches!(market.curve, Curve::Swapper) {
        return Err(not_available(market, "swap"));
    }
    if !market.is_reserve_token(&from.denom) {
        return Err(BondwarsError::NotAReserveToken(from.denom.clone()));
    }
    if !market.is_reserve_token(to_token) {
        return Err(BondwarsError::NotAReserveToken(to_token.to_string()));
    }
    ensure_non_negative(market, from.amount, "swap input")?;
    if reserves.is_any_negative() {
        return Err(negative(market, "reserve balance"));
    }

    let in_reserve = reserves.amount_of(&from.denom);
    let out_reserve = reserves.amount_of(to_token);

    let fee = decimal::fee(from.amount, market.tx_fee_percentage)?;
    let adjusted = sub(from.amount, fee)?;
    if adjusted <= Decimal::ZERO {
        return Err(swap_too_small(from, to_token));
    }

    let out = div(mul(adjusted, out_reserve)?, add(in_reserve, adjusted)?)?.trunc();
    if out == out_reserve {
        return Err(BondwarsError::SwapDepletesReserve {
            from: from.denom.clone(),
            to: to_token.to_string(),
        });
    }
    if out.is_zero() {
        return Err(swap_too_small(from, to_token));
    }
    ensure_non_negative(market, out, "swap return")?;

    Ok((
        Coin::new(to_token, out),
        Coin::new(from.denom.clone(), fee),
    ))
}

// ---------------------------------------------------------------------------
// Fees
// ---------------------------------------------------------------------------

/// Transaction fees on `amounts`, each rounded up.
pub fn tx_fees(market: &Market, amounts: &Coins) -> Result<Coins> {
    decimal::fees(amounts, market.tx_fee_percentage)
}

/// Exit fees on `amounts`, each rounded up.
pub fn exit_fees(market: &Market, amounts: &Coins) -> Result<Coins> {
    decimal::fees(amounts, market.exit_fee_percentage)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Reserve balances move in lockstep, so the first one stands for all.
fn common_reserve_balance(reserves: &Coins) -> Decimal {
    reserves
        .iter()
        .next()
        .map_or(Decimal::ZERO, |(_, amount)| *amount)
}

fn ensure_supply(market: &Market, supply: Decimal) -> Result<()> {
    if supply.is_sign_negative() && !supply.is_zero() {
        return Err(FatalError::NegativeSupply {
            market: market.token.clone(),
        }
        .into());
    }
    Ok(())
}

fn ensure_non_negative(market: &Market, value: Decimal, quantity: &'static str) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(negative(market, quantity));
    }
    Ok(())
}

fn negative(market: &Market, quantity: &'static str) -> BondwarsError {
    FatalError::NegativeCurveOutput {
        market: market.token.clone(),
        quantity,
    }
    .into()
}

fn not_available(market: &Market, operation: &'static str) -> BondwarsError {
    BondwarsError::FunctionNotAvailable {
        kind: market.kind(),
        operation,
    }
}

fn swap_too_small(from: &Coin, to_token: &str) -> BondwarsError {
    BondwarsError::SwapTooSmall {
        from: from.denom.clone(),
        to: to_token.to_string(),
    }
}
