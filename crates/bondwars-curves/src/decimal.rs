//! Fixed-point helpers: checked arithmetic, integer powers and roots, and
//! the rounding rules that protect the reserve.
//!
//! - prices charged to buyers round **up**
//! - returns paid to sellers round **down**
//! - fees round **up**, then get capped by the gross amount

use bondwars_types::{Coins, FatalError, Result, constants};
use rust_decimal::{Decimal, MathematicalOps};

fn overflow(operation: &'static str) -> FatalError {
    FatalError::ArithmeticOverflow { operation }
}

/// Checked `add`; overflow is fatal.
pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
    Ok(a.checked_add(b).ok_or(overflow("add"))?)
}

/// Checked `sub`; overflow is fatal.
pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
    Ok(a.checked_sub(b).ok_or(overflow("sub"))?)
}

/// Checked `mul`; overflow is fatal.
pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
    Ok(a.checked_mul(b).ok_or(overflow("mul"))?)
}

/// Checked `div`; overflow is fatal.
pub fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
    Ok(a.checked_div(b).ok_or(overflow("div"))?)
}

/// `x^n` by repeated squaring.
pub fn pow_int(x: Decimal, n: u32) -> Result<Decimal> {
    if n == 0 || x == Decimal::ONE {
        return Ok(Decimal::ONE);
    }
    if x.is_zero() {
        return Ok(Decimal::ZERO);
    }
    Ok(x.checked_powu(u64::from(n)).ok_or(overflow("pow"))?)
}

/// Square root of a non-negative value.
pub fn sqrt(x: Decimal) -> Result<Decimal> {
    Ok(x.sqrt().ok_or(overflow("sqrt"))?)
}

/// Principal `n`-th root by Newton's method, approached from above.
///
/// Non-positive inputs yield zero. The iteration count is bounded and the
/// sequence stops as soon as it no longer decreases, so the result is the
/// same on every replica.
pub fn nth_root(value: Decimal, n: u32) -> Result<Decimal> {
    if value <= Decimal::ZERO {
        return Ok(Decimal::ZERO);
    }
    if n <= 1 || value == Decimal::ONE {
        return Ok(value);
    }

    // Smallest power of ten whose n-th power reaches the value.
    let mut x = Decimal::ONE;
    if value > Decimal::ONE {
        loop {
            match x.checked_powu(u64::from(n)) {
                Some(p) if p < value => x = mul(x, Decimal::TEN)?,
                _ => break,
            }
        }
    }

    let n_dec = Decimal::from(n);
    let n_minus_one = Decimal::from(n - 1);
    for _ in 0..constants::MAX_ROOT_ITERATIONS {
        let scaled = div(value, pow_int(x, n - 1)?)?;
        let next = div(add(mul(n_minus_one, x)?, scaled)?, n_dec)?;
        if next >= x {
            break;
        }
        x = next;
    }
    Ok(x)
}

/// Round every amount up to a whole unit.
#[must_use]
pub fn round_reserve_prices(prices: &Coins) -> Coins {
    prices.map(|a| a.ceil())
}

/// Round every amount down to a whole unit; zero results drop out.
#[must_use]
pub fn round_reserve_returns(returns: &Coins) -> Coins {
    returns.map(|a| a.floor())
}

/// Round a fee up to a whole unit.
#[must_use]
pub fn round_fee(fee: Decimal) -> Decimal {
    fee.ceil()
}

/// `round_up(percentage/100 · amount)`.
pub fn fee(amount: Decimal, percentage: Decimal) -> Result<Decimal> {
    let rate = div(percentage, Decimal::from(constants::PERCENT))?;
    Ok(round_fee(mul(rate, amount)?))
}

/// Apply [`fee`] to every amount.
pub fn fees(amounts: &Coins, percentage: Decimal) -> Result<Coins> {
    amounts.try_map(|_, a| fee(a, percentage))
}

/// Cap each fee at the matching gross amount. Fees whose denom has no
/// gross amount drop to zero.
#[must_use]
pub fn adjust_fees(fees: &Coins, max: &Coins) -> Coins {
    fees.iter()
        .map(|(denom, amount)| (denom.clone(), (*amount).min(max.amount_of(denom))))
        .collect()
}

/// Multiply every amount by `factor`.
pub fn scale(coins: &Coins, factor: Decimal) -> Result<Coins> {
    coins.try_map(|_, a| mul(a, factor))
}

/// Component-wise coin sum; overflow is fatal.
pub fn add_coins(a: &Coins, b: &Coins) -> Result<Coins> {
    Ok(a.checked_add(b).ok_or(overflow("coin add"))?)
}

/// Component-wise coin difference; a negative component is fatal.
pub fn sub_coins(a: &Coins, b: &Coins) -> Result<Coins> {
    Ok(a.checked_sub(b).ok_or(overflow("coin sub"))?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn coins(pairs: &[(&str, &str)]) -> Coins {
        pairs
            .iter()
            .map(|(d, a)| ((*d).to_string(), dec(a)))
            .collect()
    }

    #[test]
    fn reserve_prices_round_up() {
        let rounded = round_reserve_prices(&coins(&[("aaa", "1.6"), ("bbb", "0.5"), ("ccc", "0.4")]));
        assert_eq!(rounded, coins(&[("aaa", "2"), ("bbb", "1"), ("ccc", "1")]));
        assert!(round_reserve_prices(&Coins::new()).is_empty());
    }

    #[test]
    fn reserve_returns_round_down_and_drop_zero() {
        let rounded = round_reserve_returns(&coins(&[("aaa", "1.4"), ("bbb", "1.9"), ("ccc", "0.5")]));
        assert_eq!(rounded, coins(&[("aaa", "1"), ("bbb", "1")]));
        assert!(!rounded.contains("ccc"));
    }

    #[test]
    fn fees_round_up() {
        assert_eq!(round_fee(dec("0.4")), dec("1"));
        assert_eq!(round_fee(dec("67.7")), dec("68"));
        assert_eq!(round_fee(dec("96.5")), dec("97"));
        assert_eq!(round_fee(dec("5")), dec("5"));
    }

    #[test]
    fn fee_is_percentage_rounded_up() {
        assert_eq!(fee(dec("1000"), dec("10")).unwrap(), dec("100"));
        assert_eq!(fee(dec("10"), dec("5")).unwrap(), dec("1"));
        assert_eq!(fee(dec("10"), dec("0")).unwrap(), Decimal::ZERO);
        assert_eq!(fee(dec("1234.5"), dec("0.5")).unwrap(), dec("7"));
    }

    #[test]
    fn adjust_fees_caps_and_drops() {
        let fees = coins(&[
            ("bbb", "2000"),
            ("ccc", "2000"),
            ("ddd", "2000"),
            ("eee", "2000"),
        ]);
        let max = coins(&[
            ("bbb", "2001"),
            ("ccc", "2000"),
            ("ddd", "1999"),
            ("fff", "2000"),
        ]);
        let adjusted = adjust_fees(&fees, &max);
        assert_eq!(
            adjusted,
            coins(&[("bbb", "2000"), ("ccc", "2000"), ("ddd", "1999")])
        );
    }

    #[test]
    fn pow_int_is_exact() {
        assert_eq!(pow_int(dec("10"), 3).unwrap(), dec("1000"));
        assert_eq!(pow_int(dec("1.5"), 2).unwrap(), dec("2.25"));
        assert_eq!(pow_int(dec("7"), 0).unwrap(), Decimal::ONE);
    }

    #[test]
    fn pow_int_large_exponents_stay_cheap() {
        assert_eq!(pow_int(Decimal::ONE, u32::MAX).unwrap(), Decimal::ONE);
        assert_eq!(pow_int(Decimal::ZERO, u32::MAX).unwrap(), Decimal::ZERO);
        assert!(pow_int(dec("2"), u32::MAX).unwrap_err().is_fatal());
    }

    #[test]
    fn pow_int_overflow_is_fatal() {
        let err = pow_int(Decimal::MAX, 2).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn nth_root_exact_cases() {
        assert_eq!(nth_root(dec("1000000"), 2).unwrap(), dec("1000"));
        assert_eq!(nth_root(dec("5"), 1).unwrap(), dec("5"));
        assert_eq!(nth_root(Decimal::ZERO, 3).unwrap(), Decimal::ZERO);
    }

    #[test]
    fn nth_root_inexact_is_close() {
        let three = nth_root(dec("27"), 3).unwrap();
        assert!((three - dec("3")).abs() < dec("0.000000000001"));

        let root = nth_root(dec("2"), 3).unwrap();
        let back = pow_int(root, 3).unwrap();
        assert!((back - dec("2")).abs() < dec("0.000000000001"));

        let small = nth_root(dec("0.001"), 3).unwrap();
        assert!((small - dec("0.1")).abs() < dec("0.000000000001"));
    }

    #[test]
    fn nth_root_is_deterministic() {
        let a = nth_root(dec("41666666666.666666666666666667"), 3).unwrap();
        let b = nth_root(dec("41666666666.666666666666666667"), 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn scale_multiplies_each() {
        let scaled = scale(&coins(&[("aaa", "2.5"), ("bbb", "4")]), dec("4")).unwrap();
        assert_eq!(scaled, coins(&[("aaa", "10"), ("bbb", "16")]));
    }
}
