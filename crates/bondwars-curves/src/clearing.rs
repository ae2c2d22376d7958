//! Uniform batch prices and per-order cost/proceeds.
//!
//! Only the net supply change of a batch moves the curve. The side with the
//! smaller volume is matched against the other side at the pre-batch price;
//! the surplus is priced on the curve:
//!
//! ```text
//!   buys > sells:  buy  = (current·sells + mint(buys − sells)) / buys
//!                  sell = current
//!   sells > buys:  sell = (current·buys + burn(sells − buys)) / sells
//!                  buy  = current
//!   equal:         buy = sell = current
//! ```
//!
//! Prices are computed from aggregate totals, never per order, so the order
//! in which fills are executed does not change what each order pays.

use bondwars_types::{BuyOrder, Coins, Curve, Market, Result};
use rust_decimal::Decimal;

use crate::decimal::{self, add_coins, sub_coins};
use crate::evaluator;

/// Uniform per-token prices for one window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchPrices {
    pub buy: Coins,
    pub sell: Coins,
}

/// Compute the window's uniform buy and sell prices per token.
pub fn compute_batch_prices(
    market: &Market,
    total_buy: Decimal,
    total_sell: Decimal,
    reserves: &Coins,
) -> Result<BatchPrices> {
    // An empty Swapper market has no price until its bootstrap buy.
    if matches!(market.curve, Curve::Swapper)
        && market.current_supply.is_zero()
        && total_buy.is_zero()
        && total_sell.is_zero()
    {
        return Ok(BatchPrices::default());
    }

    let current = evaluator::current_price_per_token(market, reserves)?;

    let prices = if total_buy > total_sell {
        let extra = total_buy - total_sell;
        let minted = evaluator::prices_to_mint(market, extra, reserves)?;
        let matched = decimal::scale(&current, total_sell)?;
        BatchPrices {
            buy: per_token(&add_coins(&matched, &minted)?, total_buy)?,
            sell: current,
        }
    } else if total_sell > total_buy {
        let extra = total_sell - total_buy;
        let burned = evaluator::returns_for_burn(market, extra, reserves)?;
        let matched = decimal::scale(&current, total_buy)?;
        BatchPrices {
            buy: current,
            sell: per_token(&add_coins(&matched, &burned)?, total_sell)?,
        }
    } else {
        BatchPrices {
            buy: current.clone(),
            sell: current,
        }
    };

    tracing::debug!(
        market = %market.token,
        total_buy = %total_buy,
        total_sell = %total_sell,
        buy_prices = %prices.buy,
        sell_prices = %prices.sell,
        "Batch prices computed"
    );
    Ok(prices)
}

fn per_token(total: &Coins, amount: Decimal) -> Result<Coins> {
    total.try_map(|_, a| decimal::div(a, amount))
}

/// What a buyer pays for `amount` tokens at `buy_prices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyCost {
    /// `ceil(prices·amount)`, the part that funds the reserve.
    pub rounded: Coins,
    /// Tx fees on the unrounded price.
    pub tx_fees: Coins,
    /// `rounded + tx_fees`.
    pub total: Coins,
}

impl BuyCost {
    /// True if the total exceeds the buyer's declared max prices in any
    /// denomination.
    #[must_use]
    pub fn exceeds(&self, max_prices: &Coins) -> bool {
        self.total.is_any_gt(max_prices)
    }
}

pub fn buy_cost(market: &Market, buy_prices: &Coins, amount: Decimal) -> Result<BuyCost> {
    let prices = decimal::scale(buy_prices, amount)?;
    let rounded = decimal::round_reserve_prices(&prices);
    let tx_fees = evaluator::tx_fees(market, &prices)?;
    let total = add_coins(&rounded, &tx_fees)?;
    Ok(BuyCost {
        rounded,
        tx_fees,
        total,
    })
}

/// What a seller receives for `amount` tokens at `sell_prices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellProceeds {
    /// `floor(prices·amount)`, the part leaving the reserve.
    pub rounded: Coins,
    pub tx_fees: Coins,
    pub exit_fees: Coins,
    /// `tx_fees + exit_fees`, capped component-wise at `rounded`.
    pub total_fees: Coins,
    /// `rounded − total_fees`, paid to the seller.
    pub net: Coins,
}

pub fn sell_proceeds(market: &Market, sell_prices: &Coins, amount: Decimal) -> Result<SellProceeds> {
    let returns = decimal::scale(sell_prices, amount)?;
    let rounded = decimal::round_reserve_returns(&returns);
    let tx_fees = evaluator::tx_fees(market, &returns)?;
    let exit_fees = evaluator::exit_fees(market, &returns)?;
    let total_fees = decimal::adjust_fees(&add_coins(&tx_fees, &exit_fees)?, &rounded);
    let net = sub_coins(&rounded, &total_fees)?;
    Ok(SellProceeds {
        rounded,
        tx_fees,
        exit_fees,
        total_fees,
        net,
    })
}

/// Whether `order` can be filled at `buy_prices` within its max prices.
pub fn buy_fulfillable(market: &Market, buy_prices: &Coins, order: &BuyOrder) -> Result<bool> {
    let cost = buy_cost(market, buy_prices, order.amount)?;
    Ok(!cost.exceeds(&order.max_prices))
}

#[cfg(test)]
mod tests {
    use bondwars_types::{Address, OrderBase};

    use super::*;

    fn res(amount: i64) -> Coins {
        Coins::single("res", Decimal::new(amount, 0))
    }

    fn power_at_ten() -> (Market, Coins) {
        let mut market = Market::dummy_power("abc");
        market.current_supply = Decimal::new(10, 0);
        market.current_reserve = res(5000);
        let reserves = market.current_reserve.clone();
        (market, reserves)
    }

    #[test]
    fn empty_batch_uses_current_price() {
        let (market, reserves) = power_at_ten();
        let prices = compute_batch_prices(&market, Decimal::ZERO, Decimal::ZERO, &reserves).unwrap();
        assert_eq!(prices.buy, res(1300));
        assert_eq!(prices.sell, res(1300));
    }

    #[test]
    fn buys_only_price_the_mint() {
        let (market, reserves) = power_at_ten();
        let prices =
            compute_batch_prices(&market, Decimal::new(5, 0), Decimal::ZERO, &reserves).unwrap();
        // (reserve(15) − reserve(10)) / 5 = 10000 / 5
        assert_eq!(prices.buy, res(2000));
        assert_eq!(prices.sell, res(1300));
    }

    #[test]
    fn sells_only_price_the_burn() {
        let (market, reserves) = power_at_ten();
        let prices =
            compute_batch_prices(&market, Decimal::ZERO, Decimal::new(5, 0), &reserves).unwrap();
        // reserve(5) = 12·125/3 + 500 = 1000, so (5000 − 1000) / 5
        assert_eq!(prices.sell, res(800));
        assert_eq!(prices.buy, res(1300));
    }

    #[test]
    fn more_buys_than_sells_blend() {
        let (market, reserves) = power_at_ten();
        let prices =
            compute_batch_prices(&market, Decimal::new(10, 0), Decimal::new(5, 0), &reserves)
                .unwrap();
        // (1300·5 + 10000) / 10
        assert_eq!(prices.buy, res(1650));
        assert_eq!(prices.sell, res(1300));
    }

    #[test]
    fn more_sells_than_buys_blend() {
        let (market, reserves) = power_at_ten();
        let prices =
            compute_batch_prices(&market, Decimal::new(5, 0), Decimal::new(10, 0), &reserves)
                .unwrap();
        // (1300·5 + (5000 − 1000)) / 10
        assert_eq!(prices.sell, res(1050));
        assert_eq!(prices.buy, res(1300));
    }

    #[test]
    fn equal_volumes_use_current_price() {
        let (market, reserves) = power_at_ten();
        let prices =
            compute_batch_prices(&market, Decimal::new(4, 0), Decimal::new(4, 0), &reserves)
                .unwrap();
        assert_eq!(prices.buy, res(1300));
        assert_eq!(prices.sell, res(1300));
    }

    #[test]
    fn empty_swapper_has_no_prices() {
        let market = Market::dummy_swapper("abc");
        let prices =
            compute_batch_prices(&market, Decimal::ZERO, Decimal::ZERO, &Coins::new()).unwrap();
        assert_eq!(prices, BatchPrices::default());
    }

    #[test]
    fn buy_cost_rounds_up_and_adds_fees() {
        let mut market = Market::dummy_power("abc");
        market.tx_fee_percentage = Decimal::new(10, 0);
        let cost = buy_cost(&market, &res(100), Decimal::new(10, 0)).unwrap();
        assert_eq!(cost.rounded, res(1000));
        assert_eq!(cost.tx_fees, res(100));
        assert_eq!(cost.total, res(1100));
        assert!(!cost.exceeds(&res(1100)));
        assert!(cost.exceeds(&res(1099)));

        let fractional = buy_cost(
            &Market::dummy_power("abc"),
            &Coins::single("res", Decimal::new(3333, 2)),
            Decimal::new(3, 0),
        )
        .unwrap();
        assert_eq!(fractional.rounded, res(100));
    }

    #[test]
    fn sell_proceeds_cap_fees_at_returns() {
        let cases = [
            (0, 0, 1000, 0),
            (10, 0, 900, 100),
            (10, 10, 800, 200),
            (100, 0, 0, 1000),
            (100, 100, 0, 1000),
        ];
        for (tx, exit, net, fees) in cases {
            let mut market = Market::dummy_power("abc");
            market.tx_fee_percentage = Decimal::new(tx, 0);
            market.exit_fee_percentage = Decimal::new(exit, 0);
            let proceeds = sell_proceeds(&market, &res(100), Decimal::new(10, 0)).unwrap();
            assert_eq!(proceeds.rounded, res(1000));
            assert_eq!(proceeds.net, res(net), "tx={tx} exit={exit}");
            assert_eq!(proceeds.total_fees, res(fees), "tx={tx} exit={exit}");
        }
    }

    #[test]
    fn sell_returns_round_down() {
        let proceeds = sell_proceeds(
            &Market::dummy_power("abc"),
            &Coins::single("res", Decimal::new(3333, 2)),
            Decimal::new(3, 0),
        )
        .unwrap();
        assert_eq!(proceeds.rounded, res(99));
    }

    #[test]
    fn fulfillability_against_max_prices() {
        let market = Market::dummy_power("abc");
        let order = |amount: i64| BuyOrder {
            base: OrderBase::new(0, Address::new("buyer")),
            amount: Decimal::new(amount, 0),
            max_prices: res(1100),
        };
        assert!(buy_fulfillable(&market, &res(100), &order(10)).unwrap());
        assert!(buy_fulfillable(&market, &res(100), &order(11)).unwrap());
        assert!(!buy_fulfillable(&market, &res(100), &order(12)).unwrap());
    }
}
