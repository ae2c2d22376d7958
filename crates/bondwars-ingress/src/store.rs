//! The store seam: market, batch and order-journal persistence.
//!
//! The engine loads a market and its batch, mutates them in memory and
//! saves them back. Nothing here knows about curves or pricing.

use std::collections::BTreeMap;

use bondwars_types::{Batch, Denom, Market, Order, Result};

/// Persistence the engine depends on.
pub trait MarketStore {
    fn load_market(&self, token: &str) -> Result<Option<Market>>;

    fn save_market(&mut self, market: &Market) -> Result<()>;

    /// The batch collecting orders for the current window.
    fn load_batch(&self, token: &str) -> Result<Option<Batch>>;

    fn save_batch(&mut self, batch: &Batch) -> Result<()>;

    /// The most recently settled batch, kept for queries.
    fn load_last_batch(&self, token: &str) -> Result<Option<Batch>>;

    fn save_last_batch(&mut self, batch: &Batch) -> Result<()>;

    /// Append an accepted order to the market's journal.
    fn append_order(&mut self, token: &str, order: &Order) -> Result<()>;

    /// All market tokens, in ascending order.
    fn market_ids(&self) -> Result<Vec<Denom>>;

    fn contains_market(&self, token: &str) -> Result<bool> {
        Ok(self.load_market(token)?.is_some())
    }
}

/// Ordered in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    markets: BTreeMap<Denom, Market>,
    batches: BTreeMap<Denom, Batch>,
    last_batches: BTreeMap<Denom, Batch>,
    journal: BTreeMap<Denom, Vec<Order>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Journal of accepted orders for `token`, oldest first.
    #[must_use]
    pub fn orders(&self, token: &str) -> &[Order] {
        self.journal.get(token).map(Vec::as_slice).unwrap_or_default()
    }
}

impl MarketStore for MemoryStore {
    fn load_market(&self, token: &str) -> Result<Option<Market>> {
        Ok(self.markets.get(token).cloned())
    }

    fn save_market(&mut self, market: &Market) -> Result<()> {
        self.markets.insert(market.token.clone(), market.clone());
        Ok(())
    }

    fn load_batch(&self, token: &str) -> Result<Option<Batch>> {
        Ok(self.batches.get(token).cloned())
    }

    fn save_batch(&mut self, batch: &Batch) -> Result<()> {
        self.batches.insert(batch.token.clone(), batch.clone());
        Ok(())
    }

    fn load_last_batch(&self, token: &str) -> Result<Option<Batch>> {
        Ok(self.last_batches.get(token).cloned())
    }

    fn save_last_batch(&mut self, batch: &Batch) -> Result<()> {
        self.last_batches.insert(batch.token.clone(), batch.clone());
        Ok(())
    }

    fn append_order(&mut self, token: &str, order: &Order) -> Result<()> {
        self.journal
            .entry(token.to_string())
            .or_default()
            .push(order.clone());
        Ok(())
    }

    fn market_ids(&self) -> Result<Vec<Denom>> {
        Ok(self.markets.keys().cloned().collect())
    }
}
