//! Order admission into the current batch.
//!
//! Every order passes the same gate before it is queued:
//!
//! ```text
//!   state check → amount/denom checks → quantity limit → capacity
//!       → simulate batch prices → escrow (buy, swap) or burn (sell)
//!       → append to batch → cascading cancellation (buys)
//! ```
//!
//! Rejections happen before any funds move. Once a buy is queued, adding
//! it may raise the uniform buy price enough that earlier buys no longer
//! fit under their max prices; those are cancelled and refunded one at a
//! time, recomputing prices after each, until every live buy fits.
//!
//! The first buy into an empty Swapper market is not batched: the buyer's
//! max prices become the initial reserve and exactly one token is minted.

use bondwars_curves::{buy_cost, buy_fulfillable, compute_batch_prices, decimal};
use bondwars_types::{
    Address, Admission, Batch, BondwarsError, BuyRequest, CancelledOrder, Coins, Curve,
    FatalError, Market, MarketState, Order, OrderSide, Result, SellRequest, SwapRequest,
};
use rust_decimal::Decimal;

use crate::Ledger;

/// Outcome of a successful admission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Admitted {
    pub admission: Admission,
    /// The queued order, for the store journal. `None` for a bootstrap buy.
    pub order: Option<Order>,
    /// Earlier buys cancelled because this order moved the buy price.
    pub cancelled: Vec<CancelledOrder>,
}

/// Admits orders into a market's batch, moving funds through the ledger.
#[derive(Debug, Clone)]
pub struct BatchAccumulator {
    max_orders: usize,
}

impl BatchAccumulator {
    #[must_use]
    pub fn new(max_orders: usize) -> Self {
        Self { max_orders }
    }

    /// Validate, escrow and queue a buy.
    pub fn admit_buy<L: Ledger>(
        &self,
        ledger: &mut L,
        market: &mut Market,
        batch: &mut Batch,
        request: BuyRequest,
    ) -> Result<Admitted> {
        if !market.state.accepts_buys() {
            return Err(BondwarsError::InvalidStateForAction {
                state: market.state,
                action: "buy",
            });
        }
        check_amount(request.amount)?;
        if !market.reserve_denoms_equal_to(&request.max_prices) {
            return Err(BondwarsError::ReserveDenomsMismatch {
                reason: format!(
                    "max prices {} do not match reserve tokens {}",
                    request.max_prices,
                    market.reserve_tokens.join(",")
                ),
            });
        }
        if !request.max_prices.is_integral() || request.max_prices.is_any_negative() {
            return Err(BondwarsError::InvalidArgument {
                field: "max_prices",
                reason: "must be positive whole amounts".to_string(),
            });
        }
        let tokens = Coins::single(market.token.clone(), request.amount);
        if market.order_quantity_limits_exceeded(&tokens) {
            return Err(BondwarsError::OrderQuantityLimitExceeded { amount: tokens });
        }

        if matches!(market.curve, Curve::Swapper) && market.current_supply.is_zero() {
            return bootstrap_swapper(ledger, market, request);
        }

        let pending = decimal::add(batch.total_buy_amount, request.amount)?;
        market.ensure_mintable(decimal::add(market.current_supply, pending)?)?;
        self.ensure_capacity(batch)?;

        let prices =
            compute_batch_prices(market, pending, batch.total_sell_amount, &market.current_reserve)?;
        let cost = buy_cost(market, &prices.buy, request.amount)?;
        if cost.exceeds(&request.max_prices) {
            return Err(BondwarsError::MaxPricesExceeded {
                total: cost.total,
                max: request.max_prices,
            });
        }

        ledger.transfer(
            &request.buyer,
            &Address::batch_escrow_account(),
            &request.max_prices,
        )?;
        let sequence = batch.push_buy(
            request.buyer,
            request.amount,
            request.max_prices,
            self.max_orders,
        )?;
        batch.buy_prices = prices.buy;
        batch.sell_prices = prices.sell;

        let order = batch.buys.last().cloned().map(Order::Buy);
        let cancelled = cancel_unfulfillable_buys(ledger, market, batch)?;

        tracing::debug!(
            market = %market.token,
            sequence,
            amount = %request.amount,
            buy_prices = %batch.buy_prices,
            cancelled = cancelled.len(),
            "Buy order queued"
        );
        Ok(Admitted {
            admission: Admission::Queued { sequence },
            order,
            cancelled,
        })
    }

    /// Validate, burn and queue a sell.
    ///
    /// The tokens are burned now; the market's supply only drops when the
    /// batch settles.
    pub fn admit_sell<L: Ledger>(
        &self,
        ledger: &mut L,
        market: &Market,
        batch: &mut Batch,
        request: SellRequest,
    ) -> Result<Admitted> {
        if !market.allow_sells {
            return Err(BondwarsError::SellsNotAllowed(market.token.clone()));
        }
        if market.state != MarketState::Open {
            return Err(BondwarsError::InvalidStateForAction {
                state: market.state,
                action: "sell",
            });
        }
        check_amount(request.amount)?;
        let tokens = Coins::single(market.token.clone(), request.amount);
        if market.order_quantity_limits_exceeded(&tokens) {
            return Err(BondwarsError::OrderQuantityLimitExceeded { amount: tokens });
        }

        let adjusted_supply = decimal::sub(market.current_supply, batch.total_sell_amount)?;
        if request.amount > adjusted_supply {
            return Err(BondwarsError::CannotBurnMoreThanSupply {
                supply: adjusted_supply,
            });
        }
        self.ensure_capacity(batch)?;

        let pending = decimal::add(batch.total_sell_amount, request.amount)?;
        let prices =
            compute_batch_prices(market, batch.total_buy_amount, pending, &market.current_reserve)?;

        ledger.burn_from(&request.seller, &tokens)?;
        let sequence = batch.push_sell(request.seller, request.amount, self.max_orders)?;
        batch.buy_prices = prices.buy;
        batch.sell_prices = prices.sell;

        tracing::debug!(
            market = %market.token,
            sequence,
            amount = %request.amount,
            sell_prices = %batch.sell_prices,
            "Sell order queued"
        );
        Ok(Admitted {
            admission: Admission::Queued { sequence },
            order: batch.sells.last().cloned().map(Order::Sell),
            cancelled: Vec::new(),
        })
    }

    /// Validate, escrow and queue a swap between the two reserve tokens.
    pub fn admit_swap<L: Ledger>(
        &self,
        ledger: &mut L,
        market: &Market,
        batch: &mut Batch,
        request: SwapRequest,
    ) -> Result<Admitted> {
        if !matches!(market.curve, Curve::Swapper) {
            return Err(BondwarsError::FunctionNotAvailable {
                kind: market.kind(),
                operation: "swap",
            });
        }
        if market.state != MarketState::Open {
            return Err(BondwarsError::InvalidStateForAction {
                state: market.state,
                action: "swap",
            });
        }
        check_amount(request.from.amount)?;
        if !market.is_reserve_token(&request.from.denom) {
            return Err(BondwarsError::NotAReserveToken(request.from.denom));
        }
        if !market.is_reserve_token(&request.to_token) {
            return Err(BondwarsError::NotAReserveToken(request.to_token));
        }
        if request.from.denom == request.to_token {
            return Err(BondwarsError::ReserveDenomsMismatch {
                reason: format!("cannot swap {} into itself", request.to_token),
            });
        }
        let input = Coins::from(request.from.clone());
        if market.order_quantity_limits_exceeded(&input) {
            return Err(BondwarsError::OrderQuantityLimitExceeded { amount: input });
        }
        self.ensure_capacity(batch)?;

        ledger.transfer(&request.swapper, &Address::batch_escrow_account(), &input)?;
        let sequence = batch.push_swap(
            request.swapper,
            request.from,
            request.to_token,
            self.max_orders,
        )?;

        tracing::debug!(market = %market.token, sequence, "Swap order queued");
        Ok(Admitted {
            admission: Admission::Queued { sequence },
            order: batch.swaps.last().cloned().map(Order::Swap),
            cancelled: Vec::new(),
        })
    }

    fn ensure_capacity(&self, batch: &Batch) -> Result<()> {
        if batch.live_len() >= self.max_orders {
            return Err(BondwarsError::BatchFull(batch.token.clone()));
        }
        Ok(())
    }
}

/// Cancel live buys that no longer fit, one at a time, until the batch
/// prices are stable.
///
/// A buy is dropped if its cost at the current uniform buy price exceeds
/// its max prices. If supply plus pending buys exceeds max supply, or `S0`
/// while the market hatches, the latest live buy is dropped. Each cancellation refunds the full escrow.
/// The final prices are written back to the batch.
pub fn cancel_unfulfillable_buys<L: Ledger>(
    ledger: &mut L,
    market: &Market,
    batch: &mut Batch,
) -> Result<Vec<CancelledOrder>> {
    let mut cancelled = Vec::new();
    loop {
        let prices = compute_batch_prices(
            market,
            batch.total_buy_amount,
            batch.total_sell_amount,
            &market.current_reserve,
        )?;

        let mut victim = None;
        for (index, order) in batch.buys.iter().enumerate() {
            if !order.base.cancelled && !buy_fulfillable(market, &prices.buy, order)? {
                victim = Some((index, "max prices exceeded"));
                break;
            }
        }
        if victim.is_none() {
            let reason = match market
                .ensure_mintable(decimal::add(market.current_supply, batch.total_buy_amount)?)
            {
                Ok(()) => None,
                Err(BondwarsError::ExceedsHatchSupply { .. }) => Some("exceeds hatch supply"),
                Err(BondwarsError::ExceedsMaxSupply { .. }) => Some("exceeds max supply"),
                Err(err) => return Err(err),
            };
            if let Some(reason) = reason {
                victim = batch
                    .buys
                    .iter()
                    .rposition(|o| !o.base.cancelled)
                    .map(|index| (index, reason));
            }
        }

        batch.buy_prices = prices.buy;
        batch.sell_prices = prices.sell;
        let Some((index, reason)) = victim else {
            break;
        };
        if let Some(entry) = cancel_buy(ledger, market, batch, index, reason)? {
            cancelled.push(entry);
        }
    }
    Ok(cancelled)
}

/// Cancel the buy at `index` and return its escrow to the buyer.
pub fn cancel_buy<L: Ledger>(
    ledger: &mut L,
    market: &Market,
    batch: &mut Batch,
    index: usize,
    reason: &str,
) -> Result<Option<CancelledOrder>> {
    if !batch.cancel_buy(index, reason) {
        return Ok(None);
    }
    let Some(order) = batch.buys.get(index) else {
        return Ok(None);
    };
    refund(ledger, market, &order.base.address, &order.max_prices)?;
    tracing::warn!(
        market = %market.token,
        sequence = order.base.sequence,
        buyer = %order.base.address,
        reason,
        "Buy order cancelled"
    );
    Ok(Some(CancelledOrder {
        sequence: order.base.sequence,
        address: order.base.address.clone(),
        side: OrderSide::Buy,
        reason: reason.to_string(),
        refund: order.max_prices.clone(),
    }))
}

/// Cancel the swap at `index` and return its input to the swapper.
pub fn cancel_swap<L: Ledger>(
    ledger: &mut L,
    market: &Market,
    batch: &mut Batch,
    index: usize,
    reason: &str,
) -> Result<Option<CancelledOrder>> {
    if !batch.cancel_swap(index, reason) {
        return Ok(None);
    }
    let Some(order) = batch.swaps.get(index) else {
        return Ok(None);
    };
    let input = Coins::from(order.from.clone());
    refund(ledger, market, &order.base.address, &input)?;
    tracing::warn!(
        market = %market.token,
        sequence = order.base.sequence,
        swapper = %order.base.address,
        reason,
        "Swap order cancelled"
    );
    Ok(Some(CancelledOrder {
        sequence: order.base.sequence,
        address: order.base.address.clone(),
        side: OrderSide::Swap,
        reason: reason.to_string(),
        refund: input,
    }))
}

// The escrow always holds what was taken at admission, so a failed refund
// means the books are broken.
fn refund<L: Ledger>(ledger: &mut L, market: &Market, to: &Address, amount: &Coins) -> Result<()> {
    ledger
        .transfer(&Address::batch_escrow_account(), to, amount)
        .map_err(|e| {
            BondwarsError::from(FatalError::Settlement {
                market: market.token.clone(),
                reason: format!("escrow refund failed: {e}"),
            })
        })
}

fn bootstrap_swapper<L: Ledger>(
    ledger: &mut L,
    market: &mut Market,
    request: BuyRequest,
) -> Result<Admitted> {
    if market.reserves_violate_sanity_rate(&request.max_prices) {
        return Err(BondwarsError::SanityRateViolated {
            reserves: request.max_prices,
        });
    }
    market.ensure_mintable(Decimal::ONE)?;

    ledger.transfer(
        &request.buyer,
        &Address::reserve_account(),
        &request.max_prices,
    )?;
    ledger.mint_to(
        &request.buyer,
        &Coins::single(market.token.clone(), Decimal::ONE),
    )?;
    market.current_supply = Decimal::ONE;
    market.current_reserve = decimal::add_coins(&market.current_reserve, &request.max_prices)?;

    tracing::info!(
        market = %market.token,
        buyer = %request.buyer,
        deposited = %request.max_prices,
        "Swapper market bootstrapped"
    );
    Ok(Admitted {
        admission: Admission::Bootstrapped {
            minted: Decimal::ONE,
            deposited: request.max_prices,
        },
        order: None,
        cancelled: Vec::new(),
    })
}

fn check_amount(amount: Decimal) -> Result<()> {
    if amount <= Decimal::ZERO || !amount.fract().is_zero() {
        return Err(BondwarsError::InvalidOrderAmount { amount });
    }
    Ok(())
}
