//! Executing one market's batch against its cleared prices.
//!
//! ```text
//!   cascading cancellation → fix uniform prices
//!     → buys (submission order) → sells → swaps
//!     → Hatch → Open check → fresh batch
//! ```
//!
//! Prices are fixed once, before any order executes, so each order pays
//! the same per-token price regardless of where it sits in the batch.
//!
//! A buy or swap that cannot execute is cancelled and its escrow refunded;
//! the rest of the batch continues. Every check happens before funds move.
//! A ledger failure after the checks means escrow or reserve bookkeeping
//! has drifted, which is fatal for the market.

use bondwars_curves::clearing::{BatchPrices, buy_cost, sell_proceeds};
use bondwars_curves::decimal::{self, add_coins, sub_coins};
use bondwars_curves::evaluator::{augmented_invariant, returns_for_swap};
use bondwars_curves::state_digest_hex;
use bondwars_ingress::{Ledger, cancel_buy, cancel_swap, cancel_unfulfillable_buys};
use bondwars_types::{
    Address, Batch, BondwarsError, BuyOrder, Coin, Coins, Curve, FatalError, Fill, Market,
    MarketState, Result, SellOrder, SettlementReport, StateTransition, SwapOrder,
};
use rust_decimal::Decimal;

/// Settle `batch` into `market`.
///
/// Returns the report and the fresh batch for the next window. On error the
/// caller must discard `market`, `batch` and any ledger moves made.
pub fn settle_batch<L: Ledger>(
    ledger: &mut L,
    market: &mut Market,
    batch: &mut Batch,
) -> Result<(SettlementReport, Batch)> {
    let supply_before = market.current_supply;
    let mut cancelled = cancel_unfulfillable_buys(ledger, market, batch)?;
    let prices = BatchPrices {
        buy: batch.buy_prices.clone(),
        sell: batch.sell_prices.clone(),
    };
    let mut fills = Vec::with_capacity(batch.len());

    // Buys
    for index in 0..batch.buys.len() {
        let order = batch.buys[index].clone();
        if order.base.cancelled {
            continue;
        }
        match perform_buy(ledger, market, &order, &prices.buy) {
            Ok(fill) => fills.push(fill),
            Err(e) if e.is_rejection() => {
                cancelled.extend(cancel_buy(ledger, market, batch, index, &e.to_string())?);
            }
            Err(e) => return Err(e),
        }
    }

    // Sells
    for order in &batch.sells {
        if order.base.cancelled {
            continue;
        }
        fills.push(perform_sell(ledger, market, order, &prices.sell)?);
    }

    // Swaps
    for index in 0..batch.swaps.len() {
        let order = batch.swaps[index].clone();
        if order.base.cancelled {
            continue;
        }
        match perform_swap(ledger, market, &order) {
            Ok(fill) => fills.push(fill),
            Err(e) if e.is_rejection() => {
                cancelled.extend(cancel_swap(ledger, market, batch, index, &e.to_string())?);
            }
            Err(e) => return Err(e),
        }
    }

    let transition = open_if_hatched(market)?;
    let fresh = Batch::new(market.token.clone(), market.batch_blocks);

    tracing::info!(
        market = %market.token,
        fills = fills.len(),
        cancelled = cancelled.len(),
        supply_before = %supply_before,
        supply_after = %market.current_supply,
        reserve = %market.current_reserve,
        "Batch settled"
    );

    let report = SettlementReport {
        token: market.token.clone(),
        buy_prices: prices.buy,
        sell_prices: prices.sell,
        fills,
        cancelled,
        supply_before,
        supply_after: market.current_supply,
        reserve_after: market.current_reserve.clone(),
        transition,
        state_digest: state_digest_hex(market, &fresh),
    };
    Ok((report, fresh))
}

// ---------------------------------------------------------------------------
// Buy
// ---------------------------------------------------------------------------

/// Mint `order.amount` to the buyer at `buy_prices`, paying out of escrow.
///
/// The rounded price goes to the reserve and the tx fee to the fee
/// address. While an augmented market hatches only `(1 − θ)` of the price
/// reaches the reserve; the rest joins the fee. Whatever is left of the
/// buyer's max prices is refunded.
pub fn perform_buy<L: Ledger>(
    ledger: &mut L,
    market: &mut Market,
    order: &BuyOrder,
    buy_prices: &Coins,
) -> Result<Fill> {
    let cost = buy_cost(market, buy_prices, order.amount)?;
    if cost.exceeds(&order.max_prices) {
        return Err(BondwarsError::MaxPricesExceeded {
            total: cost.total,
            max: order.max_prices.clone(),
        });
    }
    let new_supply = decimal::add(market.current_supply, order.amount)?;
    market.ensure_mintable(new_supply)?;

    let (to_reserve, fees) = match &market.curve {
        Curve::Augmented(p) if market.state == MarketState::Hatch => {
            let kept = Decimal::ONE - p.theta;
            let exact = decimal::scale(buy_prices, order.amount)?;
            let to_reserve = exact.try_map(|_, a| decimal::mul(a, kept).map(|v| v.ceil()))?;
            let funding = sub_coins(&cost.rounded, &to_reserve)?;
            (to_reserve, add_coins(&cost.tx_fees, &funding)?)
        }
        _ => (cost.rounded.clone(), cost.tx_fees.clone()),
    };
    let refund = sub_coins(&order.max_prices, &cost.total)?;
    let escrow = Address::batch_escrow_account();
    let buyer = &order.base.address;

    settled(market, ledger.transfer(&escrow, &Address::reserve_account(), &to_reserve))?;
    settled(market, ledger.transfer(&escrow, &market.fee_address, &fees))?;
    settled(market, ledger.transfer(&escrow, buyer, &refund))?;
    let minted = Coins::single(market.token.clone(), order.amount);
    settled(market, ledger.mint_to(buyer, &minted))?;

    market.current_supply = new_supply;
    market.current_reserve = add_coins(&market.current_reserve, &to_reserve)?;

    tracing::debug!(
        market = %market.token,
        sequence = order.base.sequence,
        buyer = %buyer,
        amount = %order.amount,
        paid = %cost.rounded,
        fees = %fees,
        refund = %refund,
        "Buy filled"
    );
    Ok(Fill::Buy {
        sequence: order.base.sequence,
        buyer: buyer.clone(),
        amount: order.amount,
        paid: cost.rounded,
        fees,
        refund,
    })
}

// ---------------------------------------------------------------------------
// Sell
// ---------------------------------------------------------------------------

/// Pay the seller for tokens burned at admission.
///
/// The seller gets the floored return less fees; fees are capped at the
/// return so the payout is never negative.
pub fn perform_sell<L: Ledger>(
    ledger: &mut L,
    market: &mut Market,
    order: &SellOrder,
    sell_prices: &Coins,
) -> Result<Fill> {
    let proceeds = sell_proceeds(market, sell_prices, order.amount)?;
    let new_supply = decimal::sub(market.current_supply, order.amount)?;
    if new_supply.is_sign_negative() && !new_supply.is_zero() {
        return Err(FatalError::NegativeSupply {
            market: market.token.clone(),
        }
        .into());
    }
    let reserve_after = withdraw(market, &market.current_reserve, &proceeds.rounded)?;
    let reserve = Address::reserve_account();
    let seller = &order.base.address;

    settled(market, ledger.transfer(&reserve, seller, &proceeds.net))?;
    settled(market, ledger.transfer(&reserve, &market.fee_address, &proceeds.total_fees))?;

    market.current_supply = new_supply;
    market.current_reserve = reserve_after;

    tracing::debug!(
        market = %market.token,
        sequence = order.base.sequence,
        seller = %seller,
        amount = %order.amount,
        returned = %proceeds.net,
        fees = %proceeds.total_fees,
        "Sell filled"
    );
    Ok(Fill::Sell {
        sequence: order.base.sequence,
        seller: seller.clone(),
        amount: order.amount,
        returned: proceeds.net,
        fees: proceeds.total_fees,
    })
}

// ---------------------------------------------------------------------------
// Swap
// ---------------------------------------------------------------------------

/// Swap escrowed input for the other reserve token.
///
/// Rejected if the output rounds to zero, would drain the output reserve,
/// or would leave the reserves outside the sanity band.
pub fn perform_swap<L: Ledger>(
    ledger: &mut L,
    market: &mut Market,
    order: &SwapOrder,
) -> Result<Fill> {
    let (output, fee) =
        returns_for_swap(market, &order.from, &order.to_token, &market.current_reserve)?;
    let net_input = Coin::new(
        order.from.denom.clone(),
        decimal::sub(order.from.amount, fee.amount)?,
    );
    let outgoing = Coins::from(output.clone());
    let reserve_after = withdraw(
        market,
        &add_coins(&market.current_reserve, &Coins::from(net_input.clone()))?,
        &outgoing,
    )?;
    if market.reserves_violate_sanity_rate(&reserve_after) {
        tracing::warn!(
            market = %market.token,
            sequence = order.base.sequence,
            reserves = %reserve_after,
            "Swap violates sanity rate"
        );
        return Err(BondwarsError::SanityRateViolated {
            reserves: reserve_after,
        });
    }

    let escrow = Address::batch_escrow_account();
    let reserve = Address::reserve_account();
    let swapper = &order.base.address;
    settled(market, ledger.transfer(&escrow, &reserve, &Coins::from(net_input)))?;
    settled(market, ledger.transfer(&escrow, &market.fee_address, &Coins::from(fee.clone())))?;
    settled(market, ledger.transfer(&reserve, swapper, &outgoing))?;

    market.current_reserve = reserve_after;

    tracing::debug!(
        market = %market.token,
        sequence = order.base.sequence,
        swapper = %swapper,
        input = %order.from,
        output = %output,
        fee = %fee,
        "Swap filled"
    );
    Ok(Fill::Swap {
        sequence: order.base.sequence,
        swapper: swapper.clone(),
        input: order.from.clone(),
        output,
        fee,
    })
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

/// Move a hatching augmented market to Open once supply reaches `S0`,
/// caching `V0` and enabling sells.
pub fn open_if_hatched(market: &mut Market) -> Result<Option<StateTransition>> {
    if !market.state.can_transition_to(MarketState::Open) {
        return Ok(None);
    }
    let Some(s0) = market.hatch_supply_target() else {
        return Ok(None);
    };
    if market.current_supply < s0 {
        return Ok(None);
    }
    let Curve::Augmented(params) = &mut market.curve else {
        return Ok(None);
    };
    params.v0 = Some(augmented_invariant(params.r0, params.s0, params.kappa)?);
    market.state = MarketState::Open;
    market.allow_sells = true;

    tracing::info!(
        market = %market.token,
        supply = %market.current_supply,
        "Market leaves hatch"
    );
    Ok(Some(StateTransition {
        from: MarketState::Hatch,
        to: MarketState::Open,
    }))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `reserve − amount`, failing on the first denomination that would go
/// negative.
pub(crate) fn withdraw(market: &Market, reserve: &Coins, amount: &Coins) -> Result<Coins> {
    for (denom, value) in amount.iter() {
        if reserve.amount_of(denom) < *value {
            return Err(FatalError::ReserveUnderflow {
                market: market.token.clone(),
                denom: denom.clone(),
            }
            .into());
        }
    }
    sub_coins(reserve, amount)
}

// Checks already passed, so any ledger refusal here is fatal.
fn settled(market: &Market, moved: Result<()>) -> Result<()> {
    moved.map_err(|e| {
        if e.is_fatal() {
            e
        } else {
            BondwarsError::from(FatalError::Settlement {
                market: market.token.clone(),
                reason: e.to_string(),
            })
        }
    })
}
