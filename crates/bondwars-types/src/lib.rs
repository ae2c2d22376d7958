//! # bondwars-types
//!
//! Shared types, errors, and configuration for the **Bondwars** bonding-curve
//! market engine.
//!
//! This crate is the leaf dependency of the workspace. It defines:
//!
//! - **Identifiers**: [`Address`], [`Denom`]
//! - **Amounts**: [`Coin`], [`Coins`]
//! - **Curves**: [`CurveKind`], [`Curve`], [`PowerParams`], [`SigmoidParams`], [`AugmentedParams`]
//! - **Market model**: [`Market`], [`MarketState`]
//! - **Order model**: [`BuyRequest`], [`SellRequest`], [`SwapRequest`], [`Order`], [`OrderSide`]
//! - **Batch model**: [`Batch`]
//! - **Results**: [`Admission`], [`BuyQuote`], [`SellQuote`], [`SwapQuote`], [`SettlementReport`], [`BlockReport`]
//! - **Configuration**: [`EngineConfig`], [`MarketConfig`], [`MarketEdit`]
//! - **Errors**: [`BondwarsError`] with `BW_ERR_` prefix codes, [`FatalError`]
//! - **Constants**: module accounts and system-wide limits

pub mod batch;
pub mod coins;
pub mod config;
pub mod constants;
pub mod curve;
pub mod error;
pub mod ids;
pub mod market;
pub mod order;
pub mod report;

// Re-export all primary types at crate root for ergonomic imports:
//   use bondwars_types::{Market, Batch, Coins, ...};

pub use batch::*;
pub use coins::*;
pub use config::*;
pub use curve::*;
pub use error::*;
pub use ids::*;
pub use market::*;
pub use order::*;
pub use report::*;

// Constants are accessed via `bondwars_types::constants::FOO`
// (not re-exported to avoid name collisions).
