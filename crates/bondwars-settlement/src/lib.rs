//! # bondwars-settlement
//!
//! **Settlement plane**: the engine facade, batch settlement, lifecycle
//! transitions and invariant checks.
//!
//! ## Architecture
//!
//! [`BondwarsEngine`] owns a [`MarketStore`](bondwars_ingress::MarketStore)
//! and a [`Ledger`](bondwars_ingress::Ledger). At the end of every window it:
//! 1. Cancels buys that the final uniform price makes unaffordable
//! 2. Fixes the window's buy and sell prices
//! 3. Executes buys, then sells, then swaps; a rejected order is refunded
//! 4. Opens an augmented market whose hatch target was reached
//! 5. Records a state digest over the market and its fresh batch
//!
//! ## Lifecycle
//!
//! ```text
//! HATCH ──(supply ≥ S0, at settlement)──> OPEN ──(outcome payment)──> SETTLE
//! ```
//!
//! A settlement that fails part-way is rolled back in full and the market
//! is reported as halted for that block.

pub mod engine;
pub mod invariants;
pub mod orders;

pub use engine::BondwarsEngine;
pub use invariants::{InvariantReport, check_invariants};
pub use orders::{open_if_hatched, perform_buy, perform_sell, perform_swap, settle_batch};
