//! The engine facade: commands, the per-block scheduler entry point and
//! read-only queries over a store and a ledger.
//!
//! ```text
//! create_market / edit_market ──────────────> MarketStore
//! submit_buy / submit_sell / submit_swap ──> BatchAccumulator ──> Ledger + MarketStore
//! end_block ──> tick every batch ──> settle_window (elapsed) ──> BlockReport
//! make_outcome_payment ──> OPEN → SETTLE ──> withdraw_share
//! ```
//!
//! Every command runs against in-memory copies of the market and batch and
//! persists them only on success. Ledger moves are snapshotted first and
//! rolled back if the command fails part-way, so a failed command leaves
//! no trace.

use bondwars_curves::decimal::{self, add_coins, sub_coins};
use bondwars_curves::{
    current_price_per_token, exit_fees, price_at_supply, prices_to_mint, returns_for_burn,
    returns_for_swap, tx_fees,
};
use bondwars_ingress::{Admitted, BatchAccumulator, Ledger, MarketStore};
use bondwars_types::{
    Address, Batch, BlockReport, BondwarsError, BuyQuote, BuyRequest, Coin, Coins, EngineConfig,
    FatalError, HaltedMarket, Market, MarketConfig, MarketEdit, MarketState, Result, SellQuote,
    SellRequest, SettlementReport, StateTransition, SwapQuote, SwapRequest,
};
use rust_decimal::Decimal;

use crate::invariants::{InvariantReport, check_invariants};
use crate::orders::{self, settle_batch};

/// Bonding-curve market engine over a store `S` and a ledger `L`.
pub struct BondwarsEngine<S: MarketStore, L: Ledger> {
    config: EngineConfig,
    accumulator: BatchAccumulator,
    store: S,
    ledger: L,
}

impl<S: MarketStore, L: Ledger> BondwarsEngine<S, L> {
    #[must_use]
    pub fn new(config: EngineConfig, store: S, ledger: L) -> Self {
        let accumulator = BatchAccumulator::new(config.max_orders_per_batch);
        Self {
            config,
            accumulator,
            store,
            ledger,
        }
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for hosts funding accounts.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    // -----------------------------------------------------------------------
    // Market commands
    // -----------------------------------------------------------------------

    /// Validate `config`, store the new market and its first batch.
    pub fn create_market(&mut self, config: MarketConfig) -> Result<Market> {
        if self.config.is_reserved(&config.token) {
            return Err(BondwarsError::ReservedToken(config.token));
        }
        if self.store.contains_market(&config.token)? {
            return Err(BondwarsError::MarketAlreadyExists(config.token));
        }
        let market = config.into_market()?;
        self.store.save_market(&market)?;
        self.store
            .save_batch(&Batch::new(market.token.clone(), market.batch_blocks))?;

        tracing::info!(
            market = %market.token,
            kind = %market.kind(),
            state = %market.state,
            reserve_tokens = ?market.reserve_tokens,
            "Market created"
        );
        Ok(market)
    }

    /// Apply `edit` if `signers` matches the market's signer list exactly.
    pub fn edit_market(
        &mut self,
        token: &str,
        edit: &MarketEdit,
        signers: &[Address],
    ) -> Result<Market> {
        let mut market = self.load_market(token)?;
        if !market.signers_equal_to(signers) {
            return Err(BondwarsError::SignersMismatch);
        }
        edit.apply(&mut market)?;
        self.store.save_market(&market)?;

        tracing::info!(market = %market.token, "Market edited");
        Ok(market)
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    pub fn submit_buy(&mut self, token: &str, request: BuyRequest) -> Result<Admitted> {
        let accumulator = self.accumulator.clone();
        self.admit(token, |ledger, market, batch| {
            accumulator.admit_buy(ledger, market, batch, request)
        })
    }

    pub fn submit_sell(&mut self, token: &str, request: SellRequest) -> Result<Admitted> {
        let accumulator = self.accumulator.clone();
        self.admit(token, |ledger, market, batch| {
            accumulator.admit_sell(ledger, market, batch, request)
        })
    }

    pub fn submit_swap(&mut self, token: &str, request: SwapRequest) -> Result<Admitted> {
        let accumulator = self.accumulator.clone();
        self.admit(token, |ledger, market, batch| {
            accumulator.admit_swap(ledger, market, batch, request)
        })
    }

    fn admit(
        &mut self,
        token: &str,
        op: impl FnOnce(&mut L, &mut Market, &mut Batch) -> Result<Admitted>,
    ) -> Result<Admitted> {
        let mut market = self.load_market(token)?;
        let mut batch = self.load_batch(token)?;
        let admitted = self.atomically(|ledger| op(ledger, &mut market, &mut batch))?;

        if let Some(order) = &admitted.order {
            self.store.append_order(token, order)?;
        }
        self.store.save_market(&market)?;
        self.store.save_batch(&batch)?;
        Ok(admitted)
    }

    // -----------------------------------------------------------------------
    // Settlement
    // -----------------------------------------------------------------------

    /// Settle the market's current batch now, regardless of how many blocks
    /// remain in its window.
    pub fn settle_window(&mut self, token: &str) -> Result<SettlementReport> {
        let market = self.load_market(token)?;
        let batch = self.load_batch(token)?;
        self.settle_loaded(market, batch)
    }

    /// Count down every market's window and settle those that elapsed, in
    /// ascending token order.
    ///
    /// A market whose settlement fails is rolled back and listed as halted;
    /// its batch stays at zero blocks remaining and settles again next
    /// block. Other markets are unaffected.
    pub fn end_block(&mut self) -> Result<BlockReport> {
        let mut report = BlockReport::default();
        for token in self.store.market_ids()? {
            let mut batch = self.load_batch(&token)?;
            if !batch.tick() {
                self.store.save_batch(&batch)?;
                continue;
            }
            let market = self.load_market(&token)?;
            match self.settle_loaded(market, batch.clone()) {
                Ok(settled) => report.settled.push(settled),
                Err(e @ BondwarsError::StoreFailure { .. }) => return Err(e),
                Err(e) => {
                    tracing::error!(market = %token, error = %e, "Settlement halted");
                    self.store.save_batch(&batch)?;
                    report.halted.push(HaltedMarket {
                        token,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    fn settle_loaded(&mut self, mut market: Market, mut batch: Batch) -> Result<SettlementReport> {
        let (report, fresh) =
            self.atomically(|ledger| settle_batch(ledger, &mut market, &mut batch))?;
        self.store.save_market(&market)?;
        self.store.save_last_batch(&batch)?;
        self.store.save_batch(&fresh)?;
        Ok(report)
    }

    // -----------------------------------------------------------------------
    // Settle state
    // -----------------------------------------------------------------------

    /// Pay the market's outcome payment into its reserve and move it to
    /// Settle.
    pub fn make_outcome_payment(
        &mut self,
        token: &str,
        sender: &Address,
    ) -> Result<StateTransition> {
        let mut market = self.load_market(token)?;
        if market.state != MarketState::Open {
            return Err(BondwarsError::InvalidStateForAction {
                state: market.state,
                action: "make outcome payment",
            });
        }
        if market.outcome_payment.is_empty() {
            return Err(BondwarsError::NoOutcomePayment(market.token));
        }

        self.atomically(|ledger| {
            ledger.transfer(sender, &Address::reserve_account(), &market.outcome_payment)?;
            market.current_reserve = add_coins(&market.current_reserve, &market.outcome_payment)?;
            Ok(())
        })?;
        market.state = MarketState::Settle;
        self.store.save_market(&market)?;

        tracing::info!(
            market = %market.token,
            sender = %sender,
            payment = %market.outcome_payment,
            "Outcome payment made"
        );
        Ok(StateTransition {
            from: MarketState::Open,
            to: MarketState::Settle,
        })
    }

    /// Burn all of `holder`'s tokens and pay out their pro-rata share of
    /// the reserve, rounded down.
    pub fn withdraw_share(&mut self, token: &str, holder: &Address) -> Result<Coins> {
        let mut market = self.load_market(token)?;
        if market.state != MarketState::Settle {
            return Err(BondwarsError::InvalidStateForAction {
                state: market.state,
                action: "withdraw share",
            });
        }
        let held = self.ledger.balance_of(holder, token);
        if held <= Decimal::ZERO {
            return Err(BondwarsError::NoTokensHeld(market.token));
        }

        let owed = self.atomically(|ledger| {
            ledger.burn_from(holder, &Coins::single(market.token.clone(), held))?;
            let owed = reserve_share(&market, held)?;
            let reserve_after = orders::withdraw(&market, &market.current_reserve, &owed)?;
            let supply_after = decimal::sub(market.current_supply, held)?;
            if supply_after < Decimal::ZERO {
                return Err(FatalError::NegativeSupply {
                    market: market.token.clone(),
                }
                .into());
            }
            ledger.transfer(&Address::reserve_account(), holder, &owed)?;
            market.current_reserve = reserve_after;
            market.current_supply = supply_after;
            Ok(owed)
        })?;
        self.store.save_market(&market)?;

        tracing::info!(
            market = %market.token,
            holder = %holder,
            burned = %held,
            paid = %owed,
            "Share withdrawn"
        );
        Ok(owed)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn market(&self, token: &str) -> Result<Market> {
        self.load_market(token)
    }

    /// All markets in ascending token order.
    pub fn markets(&self) -> Result<Vec<Market>> {
        self.store
            .market_ids()?
            .iter()
            .map(|token| self.load_market(token))
            .collect()
    }

    pub fn batch(&self, token: &str) -> Result<Batch> {
        self.load_batch(token)
    }

    /// The most recently settled batch, if any window has closed yet.
    pub fn last_batch(&self, token: &str) -> Result<Option<Batch>> {
        self.load_market(token)?;
        self.store.load_last_batch(token)
    }

    pub fn current_price(&self, token: &str) -> Result<Vec<Coin>> {
        let market = self.load_market(token)?;
        let price = current_price_per_token(&market, &market.current_reserve)?;
        Ok(price.zero_filled(&market.reserve_tokens))
    }

    pub fn current_reserve(&self, token: &str) -> Result<Vec<Coin>> {
        let market = self.load_market(token)?;
        Ok(market.current_reserve.zero_filled(&market.reserve_tokens))
    }

    /// Per-token price the curve gives at an arbitrary supply.
    pub fn quote_price(&self, token: &str, supply: Decimal) -> Result<Vec<Coin>> {
        let market = self.load_market(token)?;
        let price = price_at_supply(&market, supply)?;
        Ok(price.zero_filled(&market.reserve_tokens))
    }

    /// Cost of buying `amount` tokens on top of the pending batch buys.
    pub fn quote_buy(&self, token: &str, amount: Decimal) -> Result<BuyQuote> {
        let market = self.load_market(token)?;
        let batch = self.load_batch(token)?;
        let adjusted_supply = decimal::add(market.current_supply, batch.total_buy_amount)?;
        market.ensure_mintable(decimal::add(adjusted_supply, amount)?)?;

        let prices = prices_to_mint(&market, amount, &market.current_reserve)?;
        let rounded = decimal::round_reserve_prices(&prices);
        let fees = tx_fees(&market, &prices)?;
        let total = add_coins(&rounded, &fees)?;
        let denoms = &market.reserve_tokens;
        Ok(BuyQuote {
            adjusted_supply,
            prices: rounded.zero_filled(denoms),
            tx_fees: fees.zero_filled(denoms),
            total_prices: total.zero_filled(denoms),
            total_fees: fees.zero_filled(denoms),
        })
    }

    /// Return for selling `amount` tokens net of pending batch sells.
    pub fn quote_sell(&self, token: &str, amount: Decimal) -> Result<SellQuote> {
        let market = self.load_market(token)?;
        if !market.allow_sells {
            return Err(BondwarsError::SellsNotAllowed(market.token));
        }
        let batch = self.load_batch(token)?;
        let adjusted_supply = decimal::sub(market.current_supply, batch.total_sell_amount)?;
        if adjusted_supply < amount {
            return Err(BondwarsError::CannotBurnMoreThanSupply {
                supply: adjusted_supply,
            });
        }

        let returns = returns_for_burn(&market, amount, &market.current_reserve)?;
        let rounded = decimal::round_reserve_returns(&returns);
        let tx = tx_fees(&market, &returns)?;
        let exit = exit_fees(&market, &returns)?;
        let total_fees = decimal::adjust_fees(&add_coins(&tx, &exit)?, &rounded);
        let total_returns = sub_coins(&rounded, &total_fees)?;
        let denoms = &market.reserve_tokens;
        Ok(SellQuote {
            adjusted_supply,
            returns: rounded.zero_filled(denoms),
            tx_fees: tx.zero_filled(denoms),
            exit_fees: exit.zero_filled(denoms),
            total_returns: total_returns.zero_filled(denoms),
            total_fees: total_fees.zero_filled(denoms),
        })
    }

    /// Output of swapping `from` into `to_token` against current reserves.
    pub fn quote_swap(&self, token: &str, from: &Coin, to_token: &str) -> Result<SwapQuote> {
        let market = self.load_market(token)?;
        let (output, fee) = returns_for_swap(&market, from, to_token, &market.current_reserve)?;
        Ok(SwapQuote {
            total_returns: Coins::from(output).zero_filled(&[to_token.to_string()]),
            total_fees: vec![fee],
        })
    }

    pub fn check_invariants(&self) -> Result<InvariantReport> {
        check_invariants(&self.store, &self.ledger)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn load_market(&self, token: &str) -> Result<Market> {
        self.store
            .load_market(token)?
            .ok_or_else(|| BondwarsError::MarketNotFound(token.to_string()))
    }

    fn load_batch(&self, token: &str) -> Result<Batch> {
        self.store
            .load_batch(token)?
            .ok_or_else(|| BondwarsError::MarketNotFound(token.to_string()))
    }

    fn atomically<T>(&mut self, op: impl FnOnce(&mut L) -> Result<T>) -> Result<T> {
        let snapshot = self.ledger.snapshot();
        match op(&mut self.ledger) {
            Ok(value) => Ok(value),
            Err(e) => {
                self.ledger.restore(snapshot);
                Err(e)
            }
        }
    }
}

/// `⌊reserve_i · held / supply⌋` for every reserve coin.
fn reserve_share(market: &Market, held: Decimal) -> Result<Coins> {
    market.current_reserve.try_map(|_, amount| {
        let scaled = decimal::mul(amount, held)?;
        Ok(decimal::div(scaled, market.current_supply)?.floor())
    })
}

#[cfg(test)]
mod tests {
    use bondwars_ingress::{InMemoryLedger, MemoryStore};
    use bondwars_types::{SanityEdit, constants};

    use super::*;

    type Engine = BondwarsEngine<MemoryStore, InMemoryLedger>;

    fn engine() -> Engine {
        BondwarsEngine::new(
            EngineConfig::default(),
            MemoryStore::new(),
            InMemoryLedger::new(),
        )
    }

    fn res(amount: i64) -> Coins {
        Coins::single("res", Decimal::new(amount, 0))
    }

    #[test]
    fn create_stores_market_and_batch() {
        let mut engine = engine();
        let market = engine
            .create_market(MarketConfig::dummy_power("abc"))
            .unwrap();
        assert_eq!(market.state, MarketState::Open);
        assert_eq!(engine.market("abc").unwrap(), market);
        assert_eq!(engine.batch("abc").unwrap(), Batch::new("abc", 1));
        assert!(engine.last_batch("abc").unwrap().is_none());
    }

    #[test]
    fn create_rejects_duplicates_and_reserved_tokens() {
        let mut engine = BondwarsEngine::new(
            EngineConfig {
                reserved_tokens: vec!["stake".to_string()],
                max_orders_per_batch: constants::MAX_ORDERS_PER_BATCH,
            },
            MemoryStore::new(),
            InMemoryLedger::new(),
        );
        engine
            .create_market(MarketConfig::dummy_power("abc"))
            .unwrap();
        let err = engine
            .create_market(MarketConfig::dummy_power("abc"))
            .unwrap_err();
        assert!(matches!(err, BondwarsError::MarketAlreadyExists(_)));

        let err = engine
            .create_market(MarketConfig::dummy_power("stake"))
            .unwrap_err();
        assert!(matches!(err, BondwarsError::ReservedToken(_)));
    }

    #[test]
    fn edit_requires_exact_signers() {
        let mut engine = engine();
        engine
            .create_market(MarketConfig::dummy_swapper("abc"))
            .unwrap();
        let edit = MarketEdit {
            name: Some("Renamed".to_string()),
            sanity: Some(SanityEdit::Set {
                rate: Decimal::ONE,
                margin_percentage: Decimal::new(5, 0),
            }),
            ..MarketEdit::default()
        };

        let err = engine
            .edit_market("abc", &edit, &[Address::new("mallory")])
            .unwrap_err();
        assert!(matches!(err, BondwarsError::SignersMismatch));

        let market = engine
            .edit_market("abc", &edit, &[Address::new("creator")])
            .unwrap();
        assert_eq!(market.name, "Renamed");
        assert_eq!(market.sanity_rate, Decimal::ONE);

        let err = engine
            .edit_market("abc", &MarketEdit::default(), &[Address::new("creator")])
            .unwrap_err();
        assert!(matches!(err, BondwarsError::NoEdits));
    }

    #[test]
    fn failed_submission_leaves_no_trace() {
        let mut engine = engine();
        engine
            .create_market(MarketConfig::dummy_power("abc"))
            .unwrap();
        engine.ledger_mut().deposit(&Address::new("alice"), &res(100));

        let err = engine
            .submit_buy(
                "abc",
                BuyRequest {
                    buyer: Address::new("alice"),
                    amount: Decimal::new(10, 0),
                    max_prices: res(100_000),
                },
            )
            .unwrap_err();
        assert!(matches!(err, BondwarsError::InsufficientFunds { .. }));
        assert!(engine.batch("abc").unwrap().is_empty());
        assert!(engine.store().orders("abc").is_empty());
        assert_eq!(
            engine.ledger().balance_of(&Address::new("alice"), "res"),
            Decimal::new(100, 0)
        );
    }

    #[test]
    fn end_block_waits_for_window() {
        let mut engine = engine();
        let mut config = MarketConfig::dummy_power("abc");
        config.batch_blocks = 2;
        engine.create_market(config).unwrap();

        let report = engine.end_block().unwrap();
        assert!(report.settled.is_empty());
        assert_eq!(engine.batch("abc").unwrap().blocks_remaining, 1);

        let report = engine.end_block().unwrap();
        assert_eq!(report.settled.len(), 1);
        assert!(report.is_clean());
        assert_eq!(engine.batch("abc").unwrap().blocks_remaining, 2);
        assert!(engine.last_batch("abc").unwrap().is_some());
    }

    #[test]
    fn quotes_fill_missing_denoms_with_zero() {
        let mut engine = engine();
        engine
            .create_market(MarketConfig::dummy_power("abc"))
            .unwrap();

        let quote = engine.quote_buy("abc", Decimal::new(10, 0)).unwrap();
        assert_eq!(quote.prices, vec![Coin::new("res", Decimal::new(5000, 0))]);
        assert_eq!(quote.tx_fees, vec![Coin::new("res", Decimal::ZERO)]);
        assert_eq!(quote.total_prices, vec![Coin::new("res", Decimal::new(5000, 0))]);
        assert_eq!(quote.adjusted_supply, Decimal::ZERO);

        assert_eq!(
            engine.current_reserve("abc").unwrap(),
            vec![Coin::new("res", Decimal::ZERO)]
        );
        assert_eq!(
            engine.current_price("abc").unwrap(),
            vec![Coin::new("res", Decimal::new(100, 0))]
        );
        assert_eq!(
            engine.quote_price("abc", Decimal::new(10, 0)).unwrap(),
            vec![Coin::new("res", Decimal::new(1300, 0))]
        );

        let err = engine.quote_sell("abc", Decimal::ONE).unwrap_err();
        assert!(matches!(err, BondwarsError::CannotBurnMoreThanSupply { .. }));
    }

    #[test]
    fn reserve_share_rounds_down() {
        let mut market = Market::dummy_power("abc");
        market.current_supply = Decimal::new(3, 0);
        market.current_reserve = res(100_000);
        assert_eq!(reserve_share(&market, Decimal::new(2, 0)).unwrap(), res(66_666));
        assert_eq!(reserve_share(&market, Decimal::new(3, 0)).unwrap(), res(100_000));
    }

    #[test]
    fn unknown_market_is_not_found() {
        let engine = engine();
        assert!(matches!(
            engine.market("nope").unwrap_err(),
            BondwarsError::MarketNotFound(_)
        ));
        assert!(matches!(
            engine.last_batch("nope").unwrap_err(),
            BondwarsError::MarketNotFound(_)
        ));
    }
}
