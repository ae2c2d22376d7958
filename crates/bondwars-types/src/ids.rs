//! Identifier types for Bondwars.
//!
//! Markets are keyed by the denomination of the token they mint. Accounts
//! are opaque ledger addresses; the engine never interprets them beyond
//! equality and ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{BondwarsError, Result, constants};

/// A coin denomination, e.g. `"abc"` or `"res"`.
///
/// Markets are identified by the denomination of their token.
pub type Denom = String;

/// Validates a denomination: `[a-z][a-z0-9]{2,15}`.
pub fn validate_denom(denom: &str) -> Result<()> {
    let len = denom.len();
    let mut chars = denom.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_lowercase());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    if starts_with_letter
        && rest_ok
        && (constants::MIN_DENOM_LEN..=constants::MAX_DENOM_LEN).contains(&len)
    {
        Ok(())
    } else {
        Err(BondwarsError::InvalidDenom(denom.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// An account address on the external ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Wrap a raw address string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Module account that holds all market reserves.
    #[must_use]
    pub fn reserve_account() -> Self {
        Self::new(constants::RESERVE_ACCOUNT)
    }

    /// Module account that escrows pending orders.
    #[must_use]
    pub fn batch_escrow_account() -> Self {
        Self::new(constants::BATCH_ESCROW_ACCOUNT)
    }

    /// Module account used for minting and burning market tokens.
    #[must_use]
    pub fn mint_burn_account() -> Self {
        Self::new(constants::MINT_BURN_ACCOUNT)
    }

    /// The raw address string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if the address is the empty string.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}
