//! State digest for cross-replica verification.
//!
//! Every replica settling the same window from the same state must reach
//! byte-identical market and batch state. The digest is a SHA-256 over a
//! canonical encoding of both, so replicas can compare a 32-byte value
//! instead of the full records.

use bondwars_types::{Batch, Coins, Market, OrderBase};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

/// Compute the state digest over a market and its batch.
///
/// Depends on every field that settlement can change plus the market's
/// fixed configuration. Orders are hashed in submission order.
#[must_use]
pub fn compute_state_digest(market: &Market, batch: &Batch) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"bondwars:state:v1:");

    // Market
    put_str(&mut hasher, &market.token);
    put_str(&mut hasher, &market.kind().to_string());
    for (name, value) in market.curve.params() {
        put_str(&mut hasher, &name);
        put_decimal(&mut hasher, value);
    }
    hasher.update((market.reserve_tokens.len() as u64).to_le_bytes());
    for denom in &market.reserve_tokens {
        put_str(&mut hasher, denom);
    }
    put_decimal(&mut hasher, market.tx_fee_percentage);
    put_decimal(&mut hasher, market.exit_fee_percentage);
    put_str(&mut hasher, market.fee_address.as_str());
    put_decimal(&mut hasher, market.max_supply);
    put_coins(&mut hasher, &market.order_quantity_limits);
    put_decimal(&mut hasher, market.sanity_rate);
    put_decimal(&mut hasher, market.sanity_margin_percentage);
    put_decimal(&mut hasher, market.current_supply);
    put_coins(&mut hasher, &market.current_reserve);
    hasher.update([u8::from(market.allow_sells)]);
    hasher.update(market.batch_blocks.to_le_bytes());
    put_coins(&mut hasher, &market.outcome_payment);
    put_str(&mut hasher, &market.state.to_string());

    // Batch
    hasher.update(batch.blocks_remaining.to_le_bytes());
    hasher.update(batch.next_sequence.to_le_bytes());
    put_decimal(&mut hasher, batch.total_buy_amount);
    put_decimal(&mut hasher, batch.total_sell_amount);
    put_coins(&mut hasher, &batch.buy_prices);
    put_coins(&mut hasher, &batch.sell_prices);

    hasher.update((batch.buys.len() as u64).to_le_bytes());
    for order in &batch.buys {
        put_base(&mut hasher, &order.base);
        put_decimal(&mut hasher, order.amount);
        put_coins(&mut hasher, &order.max_prices);
    }
    hasher.update((batch.sells.len() as u64).to_le_bytes());
    for order in &batch.sells {
        put_base(&mut hasher, &order.base);
        put_decimal(&mut hasher, order.amount);
    }
    hasher.update((batch.swaps.len() as u64).to_le_bytes());
    for order in &batch.swaps {
        put_base(&mut hasher, &order.base);
        put_str(&mut hasher, &order.from.denom);
        put_decimal(&mut hasher, order.from.amount);
        put_str(&mut hasher, &order.to_token);
    }

    let result = hasher.finalize();
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&result);
    digest
}

/// Hex form of [`compute_state_digest`], as carried in settlement reports.
#[must_use]
pub fn state_digest_hex(market: &Market, batch: &Batch) -> String {
    hex::encode(compute_state_digest(market, batch))
}

/// Verify that a hex digest matches the recomputed one.
#[must_use]
pub fn verify_state_digest(market: &Market, batch: &Batch, expected_hex: &str) -> bool {
    match hex::decode(expected_hex) {
        Ok(bytes) => bytes.as_slice() == compute_state_digest(market, batch).as_slice(),
        Err(_) => false,
    }
}

// Length-prefixed so adjacent fields cannot run together.
fn put_str(hasher: &mut Sha256, value: &str) {
    hasher.update((value.len() as u64).to_le_bytes());
    hasher.update(value.as_bytes());
}

// Normalized so that 100 and 100.00 hash alike.
fn put_decimal(hasher: &mut Sha256, value: Decimal) {
    put_str(hasher, &value.normalize().to_string());
}

fn put_coins(hasher: &mut Sha256, coins: &Coins) {
    hasher.update((coins.len() as u64).to_le_bytes());
    for (denom, amount) in coins.iter() {
        put_str(hasher, denom);
        put_decimal(hasher, *amount);
    }
}

fn put_base(hasher: &mut Sha256, base: &OrderBase) {
    hasher.update(base.sequence.to_le_bytes());
    put_str(hasher, base.address.as_str());
    hasher.update([u8::from(base.cancelled)]);
}
