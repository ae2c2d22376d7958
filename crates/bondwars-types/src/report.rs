//! Results returned to callers: order admission outcomes, read-only quotes
//! and per-window settlement reports.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, Coin, Coins, Denom, MarketState, OrderSide};

/// Outcome of an accepted order submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Admission {
    /// Queued into the current batch under this sequence number.
    Queued { sequence: u64 },
    /// First buy of a Swapper market: executed immediately.
    Bootstrapped { minted: Decimal, deposited: Coins },
}

/// Price to buy `amount` tokens right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyQuote {
    pub adjusted_supply: Decimal,
    pub prices: Vec<Coin>,
    pub tx_fees: Vec<Coin>,
    pub total_prices: Vec<Coin>,
    pub total_fees: Vec<Coin>,
}

/// Return for selling `amount` tokens right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellQuote {
    pub adjusted_supply: Decimal,
    pub returns: Vec<Coin>,
    pub tx_fees: Vec<Coin>,
    pub exit_fees: Vec<Coin>,
    pub total_returns: Vec<Coin>,
    pub total_fees: Vec<Coin>,
}

/// Output of swapping a reserve coin right now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapQuote {
    pub total_returns: Vec<Coin>,
    pub total_fees: Vec<Coin>,
}

/// One executed order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "lowercase")]
pub enum Fill {
    Buy {
        sequence: u64,
        buyer: Address,
        amount: Decimal,
        /// Rounded price sent to the reserve (and, in Hatch, the fee split).
        paid: Coins,
        fees: Coins,
        refund: Coins,
    },
    Sell {
        sequence: u64,
        seller: Address,
        amount: Decimal,
        returned: Coins,
        fees: Coins,
    },
    Swap {
        sequence: u64,
        swapper: Address,
        input: Coin,
        output: Coin,
        fee: Coin,
    },
}

/// An order cancelled during the window, with what was handed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledOrder {
    pub sequence: u64,
    pub address: Address,
    pub side: OrderSide,
    pub reason: String,
    pub refund: Coins,
}

/// Lifecycle change performed during settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: MarketState,
    pub to: MarketState,
}

/// Everything one settlement pass did to one market.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub token: Denom,
    pub buy_prices: Coins,
    pub sell_prices: Coins,
    pub fills: Vec<Fill>,
    pub cancelled: Vec<CancelledOrder>,
    pub supply_before: Decimal,
    pub supply_after: Decimal,
    pub reserve_after: Coins,
    pub transition: Option<StateTransition>,
    /// Hex SHA-256 over the post-settlement market and fresh batch.
    pub state_digest: String,
}

/// A market whose settlement stopped on a fatal error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HaltedMarket {
    pub token: Denom,
    pub reason: String,
}

/// Result of one end-of-block pass over all markets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReport {
    pub settled: Vec<SettlementReport>,
    pub halted: Vec<HaltedMarket>,
}

impl BlockReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.halted.is_empty()
    }
}
