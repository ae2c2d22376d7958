//! Order requests and the orders queued in a batch.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Address, Coin, Coins, Denom};

/// Side of a batched order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
    Swap,
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Swap => write!(f, "SWAP"),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Buy `amount` market tokens paying at most `max_prices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyRequest {
    pub buyer: Address,
    pub amount: Decimal,
    pub max_prices: Coins,
}

/// Sell (burn) `amount` market tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellRequest {
    pub seller: Address,
    pub amount: Decimal,
}

/// Swap `from` for the reserve token `to_token`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub swapper: Address,
    pub from: Coin,
    pub to_token: Denom,
}

// ---------------------------------------------------------------------------
// Queued orders
// ---------------------------------------------------------------------------

/// Fields shared by every queued order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBase {
    /// Submission sequence within the batch window (monotonic).
    pub sequence: u64,
    pub address: Address,
    pub cancelled: bool,
    pub cancel_reason: Option<String>,
}

impl OrderBase {
    #[must_use]
    pub fn new(sequence: u64, address: Address) -> Self {
        Self {
            sequence,
            address,
            cancelled: false,
            cancel_reason: None,
        }
    }

    pub fn cancel(&mut self, reason: impl Into<String>) {
        self.cancelled = true;
        self.cancel_reason = Some(reason.into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyOrder {
    pub base: OrderBase,
    pub amount: Decimal,
    pub max_prices: Coins,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellOrder {
    pub base: OrderBase,
    pub amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapOrder {
    pub base: OrderBase,
    pub from: Coin,
    pub to_token: Denom,
}

/// Any queued order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "side", rename_all = "lowercase")]
pub enum Order {
    Buy(BuyOrder),
    Sell(SellOrder),
    Swap(SwapOrder),
}

impl Order {
    #[must_use]
    pub fn base(&self) -> &OrderBase {
        match self {
            Self::Buy(o) => &o.base,
            Self::Sell(o) => &o.base,
            Self::Swap(o) => &o.base,
        }
    }

    #[must_use]
    pub fn side(&self) -> OrderSide {
        match self {
            Self::Buy(_) => OrderSide::Buy,
            Self::Sell(_) => OrderSide::Sell,
            Self::Swap(_) => OrderSide::Swap,
        }
    }
}
