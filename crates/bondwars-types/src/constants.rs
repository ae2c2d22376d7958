//! System-wide constants for the Bondwars market engine.

/// Module account holding every market's reserve coins.
pub const RESERVE_ACCOUNT: &str = "bondwars/reserve";

/// Module account holding escrowed buy max-prices and swap inputs
/// until the batch settles.
pub const BATCH_ESCROW_ACCOUNT: &str = "bondwars/batches";

/// Module account through which market tokens are minted and burned.
pub const MINT_BURN_ACCOUNT: &str = "bondwars/mint_burn";

/// Minimum length of a coin denomination.
pub const MIN_DENOM_LEN: usize = 3;

/// Maximum length of a coin denomination.
pub const MAX_DENOM_LEN: usize = 16;

/// Fee percentages are expressed out of this value.
pub const PERCENT: u32 = 100;

/// Maximum orders (buys + sells + swaps) accepted into one batch window.
pub const MAX_ORDERS_PER_BATCH: usize = 10_000;

/// Upper bound on Newton iterations when extracting integer roots.
pub const MAX_ROOT_ITERATIONS: usize = 256;


/// Largest curve exponent (`n` for Power, `kappa` for Augmented).
pub const MAX_CURVE_EXPONENT: u32 = 32;
