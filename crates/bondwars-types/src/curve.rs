//! Curve kinds and their typed parameter sets.
//!
//! A market's curve is chosen at creation from a named decimal map and then
//! fixed for life. Validation happens once, in [`Curve::from_params`]; the
//! evaluator in `bondwars-curves` works on the typed structs only.
//!
//! | Kind      | Parameters                 | Reserve tokens |
//! |-----------|----------------------------|----------------|
//! | Power     | `m`, `n`, `c`              | 1 or more      |
//! | Sigmoid   | `a`, `b`, `c`              | 1 or more      |
//! | Swapper   | none                       | exactly 2      |
//! | Augmented | `d0`, `p0`, `theta`, `kappa` | 1 or more    |

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::{BondwarsError, Result, constants};

/// The four curve families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurveKind {
    Power,
    Sigmoid,
    Swapper,
    Augmented,
}

impl CurveKind {
    /// Parameter names a creation command must supply for this kind.
    #[must_use]
    pub fn required_params(self) -> &'static [&'static str] {
        match self {
            Self::Power => &["m", "n", "c"],
            Self::Sigmoid => &["a", "b", "c"],
            Self::Swapper => &[],
            Self::Augmented => &["d0", "p0", "theta", "kappa"],
        }
    }

    /// Exact number of reserve tokens required, if fixed.
    #[must_use]
    pub fn reserve_token_count(self) -> Option<usize> {
        match self {
            Self::Swapper => Some(2),
            Self::Power | Self::Sigmoid | Self::Augmented => None,
        }
    }
}

impl fmt::Display for CurveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Power => write!(f, "POWER"),
            Self::Sigmoid => write!(f, "SIGMOID"),
            Self::Swapper => write!(f, "SWAPPER"),
            Self::Augmented => write!(f, "AUGMENTED"),
        }
    }
}

/// `price(x) = m·xⁿ + c`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerParams {
    pub m: Decimal,
    pub n: u32,
    pub c: Decimal,
}

/// `price(x) = a·((x−b)/√((x−b)²+c) + 1)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigmoidParams {
    pub a: Decimal,
    pub b: Decimal,
    pub c: Decimal,
}

/// Augmented bonding curve parameters.
///
/// `r0` and `s0` are derived at creation. `v0` is filled in when the market
/// leaves Hatch; until then it is `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentedParams {
    /// Initial raise, in reserve units.
    pub d0: Decimal,
    /// Hatch price per token.
    pub p0: Decimal,
    /// Fraction of hatch raise routed to the fee address.
    pub theta: Decimal,
    /// Curve exponent.
    pub kappa: u32,
    /// Initial reserve: `d0·(1−theta)`.
    pub r0: Decimal,
    /// Initial supply: `d0/p0`.
    pub s0: Decimal,
    /// Invariant constant, set at the Hatch to Open transition.
    pub v0: Option<Decimal>,
}

/// A validated curve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Curve {
    Power(PowerParams),
    Sigmoid(SigmoidParams),
    Swapper,
    Augmented(AugmentedParams),
}

impl Curve {
    /// Validate a named parameter map for `kind` and build the typed curve.
    ///
    /// Every required name must be present, no other names may appear, all
    /// values must be non-negative, and the kind-specific restrictions must
    /// hold.
    pub fn from_params(kind: CurveKind, params: &BTreeMap<String, Decimal>) -> Result<Self> {
        let required = kind.required_params();
        for name in required {
            if !params.contains_key(*name) {
                return Err(invalid(format!("missing parameter {name}")));
            }
        }
        for (name, value) in params {
            if !required.contains(&name.as_str()) {
                return Err(invalid(format!("unexpected parameter {name}")));
            }
            if value.is_sign_negative() && !value.is_zero() {
                return Err(invalid(format!("{name} cannot be negative")));
            }
        }
        let get = |name: &str| params.get(name).copied().unwrap_or(Decimal::ZERO);

        match kind {
            CurveKind::Power => Ok(Self::Power(PowerParams {
                m: get("m"),
                n: whole_u32("n", get("n"))?,
                c: get("c"),
            })),
            CurveKind::Sigmoid => {
                let c = get("c");
                if c <= Decimal::ZERO {
                    return Err(invalid("c must be positive".to_string()));
                }
                Ok(Self::Sigmoid(SigmoidParams {
                    a: get("a"),
                    b: get("b"),
                    c,
                }))
            }
            CurveKind::Swapper => Ok(Self::Swapper),
            CurveKind::Augmented => {
                let d0 = get("d0");
                let p0 = get("p0");
                let theta = get("theta");
                if !d0.fract().is_zero() {
                    return Err(invalid("d0 must be an integer".to_string()));
                }
                if d0 <= Decimal::ZERO {
                    return Err(invalid("d0 must be positive".to_string()));
                }
                if p0 <= Decimal::ZERO {
                    return Err(invalid("p0 must be positive".to_string()));
                }
                if theta < Decimal::ZERO || theta >= Decimal::ONE {
                    return Err(invalid("theta must be between 0 and 1".to_string()));
                }
                let kappa = whole_u32("kappa", get("kappa"))?;
                if kappa == 0 {
                    return Err(invalid("kappa must be positive".to_string()));
                }
                let r0 = d0
                    .checked_mul(Decimal::ONE - theta)
                    .ok_or_else(|| invalid("d0 too large".to_string()))?;
                let s0 = d0
                    .checked_div(p0)
                    .ok_or_else(|| invalid("d0/p0 overflows".to_string()))?;
                Ok(Self::Augmented(AugmentedParams {
                    d0,
                    p0,
                    theta,
                    kappa,
                    r0,
                    s0,
                    v0: None,
                }))
            }
        }
    }

    #[must_use]
    pub fn kind(&self) -> CurveKind {
        match self {
            Self::Power(_) => CurveKind::Power,
            Self::Sigmoid(_) => CurveKind::Sigmoid,
            Self::Swapper => CurveKind::Swapper,
            Self::Augmented(_) => CurveKind::Augmented,
        }
    }

    /// Named view of the parameters, including derived `R0`, `S0` and,
    /// once set, `V0`.
    #[must_use]
    pub fn params(&self) -> BTreeMap<String, Decimal> {
        let mut out = BTreeMap::new();
        match self {
            Self::Power(p) => {
                out.insert("m".to_string(), p.m);
                out.insert("n".to_string(), Decimal::from(p.n));
                out.insert("c".to_string(), p.c);
            }
            Self::Sigmoid(p) => {
                out.insert("a".to_string(), p.a);
                out.insert("b".to_string(), p.b);
                out.insert("c".to_string(), p.c);
            }
            Self::Swapper => {}
            Self::Augmented(p) => {
                out.insert("d0".to_string(), p.d0);
                out.insert("p0".to_string(), p.p0);
                out.insert("theta".to_string(), p.theta);
                out.insert("kappa".to_string(), Decimal::from(p.kappa));
                out.insert("R0".to_string(), p.r0);
                out.insert("S0".to_string(), p.s0);
                if let Some(v0) = p.v0 {
                    out.insert("V0".to_string(), v0);
                }
            }
        }
        out
    }
}

fn invalid(reason: String) -> BondwarsError {
    BondwarsError::InvalidCurveParams { reason }
}

/// A whole exponent no larger than [`constants::MAX_CURVE_EXPONENT`].
fn whole_u32(name: &str, value: Decimal) -> Result<u32> {
    if !value.fract().is_zero() {
        return Err(invalid(format!("{name} must be an integer")));
    }
    value
        .to_u32()
        .filter(|v| *v <= constants::MAX_CURVE_EXPONENT)
        .ok_or_else(|| {
            invalid(format!(
                "{name} must be at most {}",
                constants::MAX_CURVE_EXPONENT
            ))
        })
}
