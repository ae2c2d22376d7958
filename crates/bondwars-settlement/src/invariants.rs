//! Cross-checks between the engine's bookkeeping and the ledger.
//!
//! ```text
//! supply:   ∀ market: ledger.supply(token) == current_supply − Σ live batch sells
//! reserve:  ∀ Power/Sigmoid market, ∀ reserve denom:
//!               current_reserve[denom] ≥ ⌈reserve_at_supply(current_supply)⌉
//! account:  ∀ denom: ledger.balance(reserve account) == Σ markets current_reserve[denom]
//! ```
//!
//! Sold tokens are burned on admission but only leave `current_supply` at
//! settlement, hence the pending-sell correction. Nothing here mutates
//! state; broken invariants are collected into an [`InvariantReport`].

use std::collections::BTreeSet;

use bondwars_curves::decimal::{self, add_coins};
use bondwars_curves::reserve_at_supply;
use bondwars_ingress::{Ledger, MarketStore};
use bondwars_types::{Address, Batch, BondwarsError, Coins, Curve, Denom, Market, Result};

/// Broken invariants found by one check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvariantReport {
    pub broken: Vec<String>,
}

impl InvariantReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.broken.is_empty()
    }

    #[must_use]
    pub fn count(&self) -> usize {
        self.broken.len()
    }

    fn record(&mut self, message: String) {
        tracing::warn!(invariant = %message, "Invariant broken");
        self.broken.push(message);
    }
}

/// Run every invariant over all markets in `store`.
pub fn check_invariants<S: MarketStore, L: Ledger>(store: &S, ledger: &L) -> Result<InvariantReport> {
    let mut report = InvariantReport::default();
    let mut tracked = Coins::new();
    let mut denoms = BTreeSet::new();

    for token in store.market_ids()? {
        let market = store
            .load_market(&token)?
            .ok_or_else(|| BondwarsError::MarketNotFound(token.clone()))?;
        let batch = store
            .load_batch(&token)?
            .ok_or_else(|| BondwarsError::MarketNotFound(token.clone()))?;

        check_supply(&market, &batch, ledger, &mut report)?;
        check_reserve(&market, &mut report)?;
        tracked = add_coins(&tracked, &market.current_reserve)?;
        denoms.extend(market.reserve_tokens.iter().cloned());
    }
    check_reserve_account(&tracked, &denoms, ledger, &mut report);
    Ok(report)
}

fn check_supply<L: Ledger>(
    market: &Market,
    batch: &Batch,
    ledger: &L,
    report: &mut InvariantReport,
) -> Result<()> {
    let expected = decimal::sub(market.current_supply, batch.pending_sell_amount())?;
    let actual = ledger.supply_of(&market.token);
    if actual != expected {
        report.record(format!(
            "{} supply: engine expects {expected}, ledger holds {actual}",
            market.token
        ));
    }
    Ok(())
}

fn check_reserve(market: &Market, report: &mut InvariantReport) -> Result<()> {
    if !matches!(market.curve, Curve::Power(_) | Curve::Sigmoid(_)) {
        return Ok(());
    }
    let expected = reserve_at_supply(market, market.current_supply)?.ceil();
    for denom in &market.reserve_tokens {
        let actual = market.current_reserve.amount_of(denom);
        if actual < expected {
            report.record(format!(
                "{} reserve: curve requires {expected}{denom}, market holds {actual}{denom}",
                market.token
            ));
        }
    }
    Ok(())
}

fn check_reserve_account<L: Ledger>(
    tracked: &Coins,
    denoms: &BTreeSet<Denom>,
    ledger: &L,
    report: &mut InvariantReport,
) {
    let account = Address::reserve_account();
    for denom in denoms {
        let expected = tracked.amount_of(denom);
        let actual = ledger.balance_of(&account, denom);
        if actual != expected {
            report.record(format!(
                "reserve account {denom}: markets track {expected}, ledger holds {actual}"
            ));
        }
    }
}
