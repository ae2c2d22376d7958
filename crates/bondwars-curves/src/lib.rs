//! # bondwars-curves
//!
//! **Pure deterministic pricing for Bondwars markets.**
//!
//! This is the compute plane: given a market snapshot, reserve balances and
//! batch totals it produces prices, costs and returns. It has:
//!
//! - **Zero side effects**: no ledger calls, no store writes
//! - **Deterministic output**: fixed-point decimals only, bounded iteration
//! - **Explicit rounding**: buyers round up, sellers round down, fees round up
//! - **Fatal vs. rejection**: negative curve output is a `FatalError`

pub mod clearing;
pub mod decimal;
pub mod determinism;
pub mod evaluator;

pub use clearing::{
    BatchPrices, BuyCost, SellProceeds, buy_cost, buy_fulfillable, compute_batch_prices,
    sell_proceeds,
};
pub use determinism::{compute_state_digest, state_digest_hex, verify_state_digest};
pub use evaluator::{
    current_price_per_token, exit_fees, price_at_supply, prices_to_mint, reserve_at_supply,
    reserve_delta_for_liquidity_delta, returns_for_burn, returns_for_swap, tx_fees,
};
