//! # bondwars-ingress
//!
//! **Admission plane**: the ledger and store seams, escrow, and batch
//! accumulation with cascading cancellation.
//!
//! ## Architecture
//!
//! 1. **Ledger**: account balances, transfers, mint and burn
//! 2. **MarketStore**: markets, batches, last batches and the order journal
//! 3. **BatchAccumulator**: validates an order, escrows or burns its funds
//!    and queues it in the market's batch
//!
//! ## Order Flow
//!
//! ```text
//! submit → BatchAccumulator.admit_*() → Ledger.transfer()/burn_from()
//!        → Batch.push_*() → cancel_unfulfillable_buys() → MarketStore.save_*()
//! ```
//!
//! Buy and swap funds sit in the batch escrow account until the window
//! settles or the order is cancelled. Sold tokens are burned on admission.

pub mod batch_accumulator;
pub mod ledger;
pub mod store;

pub use batch_accumulator::{
    Admitted, BatchAccumulator, cancel_buy, cancel_swap, cancel_unfulfillable_buys,
};
pub use ledger::{InMemoryLedger, Ledger};
pub use store::{MarketStore, MemoryStore};
