//! The per-market batch of orders for the current settlement window.
//!
//! Orders keep their submission order. Cancelled orders stay in place with
//! their `cancelled` flag set; running totals only count live orders.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    Address, BondwarsError, BuyOrder, Coin, Coins, Denom, OrderBase, Result, SellOrder, SwapOrder,
};

/// Orders accumulated during one window, with the last computed uniform
/// prices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub token: Denom,
    pub blocks_remaining: u64,
    /// Sequence assigned to the next submitted order.
    pub next_sequence: u64,
    pub total_buy_amount: Decimal,
    pub total_sell_amount: Decimal,
    pub buy_prices: Coins,
    pub sell_prices: Coins,
    pub buys: Vec<BuyOrder>,
    pub sells: Vec<SellOrder>,
    pub swaps: Vec<SwapOrder>,
}

impl Batch {
    /// A fresh batch for a window of `blocks` blocks.
    #[must_use]
    pub fn new(token: impl Into<Denom>, blocks: u64) -> Self {
        Self {
            token: token.into(),
            blocks_remaining: blocks,
            next_sequence: 0,
            total_buy_amount: Decimal::ZERO,
            total_sell_amount: Decimal::ZERO,
            buy_prices: Coins::new(),
            sell_prices: Coins::new(),
            buys: Vec::new(),
            sells: Vec::new(),
            swaps: Vec::new(),
        }
    }

    /// Count down one block. Returns `true` when the window has elapsed.
    pub fn tick(&mut self) -> bool {
        self.blocks_remaining = self.blocks_remaining.saturating_sub(1);
        self.blocks_remaining == 0
    }

    /// Total number of orders, cancelled ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buys.len() + self.sells.len() + self.swaps.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of orders that are not cancelled. Only these count toward
    /// the batch size limit.
    #[must_use]
    pub fn live_len(&self) -> usize {
        let buys = self.buys.iter().filter(|o| !o.base.cancelled).count();
        let sells = self.sells.iter().filter(|o| !o.base.cancelled).count();
        let swaps = self.swaps.iter().filter(|o| !o.base.cancelled).count();
        buys + sells + swaps
    }

    /// Queue a buy and add its amount to the running total.
    pub fn push_buy(
        &mut self,
        buyer: Address,
        amount: Decimal,
        max_prices: Coins,
        max_orders: usize,
    ) -> Result<u64> {
        let base = self.next_base(buyer, max_orders)?;
        let sequence = base.sequence;
        self.total_buy_amount += amount;
        self.buys.push(BuyOrder {
            base,
            amount,
            max_prices,
        });
        Ok(sequence)
    }

    /// Queue a sell and add its amount to the running total.
    pub fn push_sell(&mut self, seller: Address, amount: Decimal, max_orders: usize) -> Result<u64> {
        let base = self.next_base(seller, max_orders)?;
        let sequence = base.sequence;
        self.total_sell_amount += amount;
        self.sells.push(SellOrder { base, amount });
        Ok(sequence)
    }

    /// Queue a swap. Swaps do not affect the buy/sell totals.
    pub fn push_swap(
        &mut self,
        swapper: Address,
        from: Coin,
        to_token: Denom,
        max_orders: usize,
    ) -> Result<u64> {
        let base = self.next_base(swapper, max_orders)?;
        let sequence = base.sequence;
        self.swaps.push(SwapOrder {
            base,
            from,
            to_token,
        });
        Ok(sequence)
    }

    /// Cancel the buy at `index`, removing its amount from the total.
    /// Returns `false` if it was already cancelled.
    pub fn cancel_buy(&mut self, index: usize, reason: &str) -> bool {
        match self.buys.get_mut(index) {
            Some(order) if !order.base.cancelled => {
                order.base.cancel(reason);
                self.total_buy_amount -= order.amount;
                true
            }
            _ => false,
        }
    }

    /// Cancel the swap at `index`. Returns `false` if already cancelled.
    pub fn cancel_swap(&mut self, index: usize, reason: &str) -> bool {
        match self.swaps.get_mut(index) {
            Some(order) if !order.base.cancelled => {
                order.base.cancel(reason);
                true
            }
            _ => false,
        }
    }

    /// Sum of live sell amounts (equals `total_sell_amount`).
    #[must_use]
    pub fn pending_sell_amount(&self) -> Decimal {
        self.sells
            .iter()
            .filter(|s| !s.base.cancelled)
            .map(|s| s.amount)
            .sum()
    }

    /// Sum of live buy amounts (equals `total_buy_amount`).
    #[must_use]
    pub fn pending_buy_amount(&self) -> Decimal {
        self.buys
            .iter()
            .filter(|b| !b.base.cancelled)
            .map(|b| b.amount)
            .sum()
    }

    fn next_base(&mut self, address: Address, max_orders: usize) -> Result<OrderBase> {
        if self.live_len() >= max_orders {
            return Err(BondwarsError::BatchFull(self.token.clone()));
        }
        let base = OrderBase::new(self.next_sequence, address);
        self.next_sequence += 1;
        Ok(base)
    }
}
