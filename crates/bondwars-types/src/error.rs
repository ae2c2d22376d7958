//! Error types for the Bondwars market engine.
//!
//! All errors use the `BW_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by subsystem:
//! - 1xx: Validation errors (malformed commands, rejected before any state change)
//! - 2xx: Authorization errors
//! - 3xx: Market / lifecycle errors
//! - 4xx: Order rejections (the order is refused or cancelled and refunded)
//! - 5xx: Ledger / store errors
//! - 6xx: Fatal invariant failures (halt the market for the block)
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{Coins, CurveKind, Denom, MarketState};

/// Central error enum for all Bondwars operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BondwarsError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// A denomination does not follow the `[a-z][a-z0-9]{2,15}` shape.
    #[error("BW_ERR_100: Invalid denomination: {0:?}")]
    InvalidDenom(String),

    /// Curve parameters are missing, unexpected, negative or out of range.
    #[error("BW_ERR_101: Invalid curve parameters: {reason}")]
    InvalidCurveParams { reason: String },

    /// The reserve token list does not fit the curve kind.
    #[error("BW_ERR_102: Invalid reserve tokens: {reason}")]
    InvalidReserveTokens { reason: String },

    /// Fee percentages are negative or add up to 100 or more.
    #[error("BW_ERR_103: Invalid fees: {reason}")]
    InvalidFees { reason: String },

    /// A command field failed validation.
    #[error("BW_ERR_104: Invalid argument {field}: {reason}")]
    InvalidArgument { field: &'static str, reason: String },

    /// An edit command carried no changes.
    #[error("BW_ERR_105: Edit does not modify any field")]
    NoEdits,

    /// The token denomination is reserved by the engine configuration.
    #[error("BW_ERR_106: Token {0} is reserved")]
    ReservedToken(Denom),

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// The submitted signer list differs from the market's signer list.
    #[error("BW_ERR_200: List of signers does not match the one in the market")]
    SignersMismatch,

    // =================================================================
    // Market / Lifecycle Errors (3xx)
    // =================================================================
    /// No market exists for this token.
    #[error("BW_ERR_300: Market not found: {0}")]
    MarketNotFound(Denom),

    /// A market already exists for this token.
    #[error("BW_ERR_301: Market already exists: {0}")]
    MarketAlreadyExists(Denom),

    /// The action is not allowed in the market's current lifecycle state.
    #[error("BW_ERR_302: Cannot {action} while market is {state}")]
    InvalidStateForAction {
        state: MarketState,
        action: &'static str,
    },

    /// The market does not allow sells.
    #[error("BW_ERR_303: Market {0} does not allow selling")]
    SellsNotAllowed(Denom),

    /// The operation has no meaning for this curve kind.
    #[error("BW_ERR_304: {operation} is not available for {kind} curves")]
    FunctionNotAvailable {
        kind: CurveKind,
        operation: &'static str,
    },

    /// Swapper pricing needs a non-zero current supply.
    #[error("BW_ERR_305: Function requires non-zero current supply")]
    RequiresNonZeroSupply,

    /// The market has no outcome payment configured.
    #[error("BW_ERR_306: Market {0} has no outcome payment configured")]
    NoOutcomePayment(Denom),

    // =================================================================
    // Order Rejections (4xx)
    // =================================================================
    /// Coin denominations do not match the market's reserve tokens.
    #[error("BW_ERR_400: Reserve denominations mismatch: {reason}")]
    ReserveDenomsMismatch { reason: String },

    /// The order amount exceeds the market's per-order quantity limit.
    #[error("BW_ERR_401: Order quantity limit exceeded: {amount}")]
    OrderQuantityLimitExceeded { amount: Coins },

    /// Filling the order would push supply above max supply.
    #[error("BW_ERR_402: Cannot mint more than max supply {max_supply}")]
    ExceedsMaxSupply { max_supply: Decimal },

    /// The cleared price plus fees exceeds the buyer's max prices.
    #[error("BW_ERR_403: Max prices exceeded: total {total}, max {max}")]
    MaxPricesExceeded { total: Coins, max: Coins },

    /// The sell would burn more tokens than the adjusted supply.
    #[error("BW_ERR_404: Cannot burn more than supply {supply}")]
    CannotBurnMoreThanSupply { supply: Decimal },

    /// The fee-adjusted swap input or output rounds to nothing.
    #[error("BW_ERR_405: Swap amount too small to give any return: {from} -> {to}")]
    SwapTooSmall { from: Denom, to: Denom },

    /// The swap would drain the output reserve completely.
    #[error("BW_ERR_406: Swap amount causes reserve depletion: {from} -> {to}")]
    SwapDepletesReserve { from: Denom, to: Denom },

    /// The resulting reserve ratio falls outside the sanity band.
    #[error("BW_ERR_407: Values violate sanity rate: {reserves}")]
    SanityRateViolated { reserves: Coins },

    /// The denomination is not one of the market's reserve tokens.
    #[error("BW_ERR_408: Token is not a valid reserve token: {0}")]
    NotAReserveToken(Denom),

    /// The batch for this window is full.
    #[error("BW_ERR_409: Batch for {0} is full")]
    BatchFull(Denom),

    /// The holder owns none of the market token.
    #[error("BW_ERR_410: No {0} tokens held")]
    NoTokensHeld(Denom),

    /// Order amounts must be positive whole tokens.
    #[error("BW_ERR_411: Invalid order amount: {amount}")]
    InvalidOrderAmount { amount: Decimal },

    /// Filling the order would push a hatching market's supply past `S0`.
    #[error("BW_ERR_412: Cannot mint past hatch supply {s0} while market is hatching")]
    ExceedsHatchSupply { s0: Decimal },

    // =================================================================
    // Ledger / Store Errors (5xx)
    // =================================================================
    /// The ledger refused a transfer or burn for lack of funds.
    #[error("BW_ERR_500: Insufficient funds in {owner}: need {needed} {denom}, have {available}")]
    InsufficientFunds {
        owner: String,
        denom: Denom,
        needed: Decimal,
        available: Decimal,
    },

    /// The store could not load or persist a record.
    #[error("BW_ERR_501: Store failure: {reason}")]
    StoreFailure { reason: String },

    // =================================================================
    // Fatal Invariant Failures (6xx)
    // =================================================================
    /// A bookkeeping or curve invariant broke.
    #[error("BW_ERR_600: Fatal: {0}")]
    Fatal(#[from] FatalError),

    // =================================================================
    // General Errors (9xx)
    // =================================================================
    /// Configuration could not be parsed.
    #[error("BW_ERR_900: Configuration error: {reason}")]
    Config { reason: String },
}

impl BondwarsError {
    /// True for fatal invariant failures that must halt the market.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal(_))
    }

    /// True for execution-time rejections of a single order, which cancel
    /// and refund that order without affecting the rest of the batch.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::ReserveDenomsMismatch { .. }
                | Self::OrderQuantityLimitExceeded { .. }
                | Self::ExceedsMaxSupply { .. }
                | Self::ExceedsHatchSupply { .. }
                | Self::MaxPricesExceeded { .. }
                | Self::CannotBurnMoreThanSupply { .. }
                | Self::SwapTooSmall { .. }
                | Self::SwapDepletesReserve { .. }
                | Self::SanityRateViolated { .. }
                | Self::NotAReserveToken(_)
                | Self::BatchFull(_)
                | Self::NoTokensHeld(_)
                | Self::InvalidOrderAmount { .. }
                | Self::InsufficientFunds { .. }
                | Self::RequiresNonZeroSupply
        )
    }

    /// True for command validation and authorization failures.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidDenom(_)
                | Self::InvalidCurveParams { .. }
                | Self::InvalidReserveTokens { .. }
                | Self::InvalidFees { .. }
                | Self::InvalidArgument { .. }
                | Self::NoEdits
                | Self::ReservedToken(_)
                | Self::SignersMismatch
        )
    }
}

/// Invariant failures that indicate a defect in curve math or bookkeeping.
///
/// These are never "corrected": the settlement pass for the affected market
/// stops and the error is surfaced to the host.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalError {
    /// A curve produced a negative price, reserve or delta.
    #[error("negative {quantity} result for market {market}")]
    NegativeCurveOutput {
        market: Denom,
        quantity: &'static str,
    },

    /// Supply would become negative.
    #[error("negative supply for market {market}")]
    NegativeSupply { market: Denom },

    /// The curve demands more reserve than the market holds for a burn.
    #[error("not enough reserve available for burn in market {market}")]
    BurnExceedsReserve { market: Denom },

    /// Market reserve bookkeeping would go below zero.
    #[error("reserve underflow in market {market} for {denom}")]
    ReserveUnderflow { market: Denom, denom: Denom },

    /// Checked decimal arithmetic overflowed.
    #[error("arithmetic overflow in {operation}")]
    ArithmeticOverflow { operation: &'static str },

    /// A pre-checked settlement step failed.
    #[error("settlement of market {market} failed: {reason}")]
    Settlement { market: Denom, reason: String },
}

/// Convenience alias used throughout the engine.
pub type Result<T> = std::result::Result<T, BondwarsError>;
