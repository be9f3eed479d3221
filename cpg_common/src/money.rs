use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const MDL_CURRENCY_CODE: &str = "MDL";
pub const MDL_CURRENCY_CODE_LOWER: &str = "mdl";

//--------------------------------------       Money        ----------------------------------------------------------
/// An MDL amount in bani (1 leu = 100 bani). Partner APIs report loan amounts as decimal strings or
/// floats; storing minor units keeps amount comparisons exact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in bani: {0}")]
pub struct MoneyConversionError(String);

impl Money {
    pub fn from_bani(bani: i64) -> Self {
        Self(bani)
    }

    pub fn from_lei(lei: i64) -> Self {
        Self(lei * 100)
    }

    /// Lossy conversion from the floating-point amounts some partner responses carry.
    /// Rounded to the nearest ban.
    pub fn from_mdl(amount: f64) -> Self {
        Self((amount * 100.0).round() as i64)
    }

    /// The amount in bani.
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn abs_diff(&self, other: Money) -> Money {
        Money(self.0.abs_diff(other.0) as i64)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Render the amount in lei the way partner payloads expect it: `5000` or `5000.50`,
    /// without a currency code.
    pub fn to_lei_string(&self) -> String {
        if self.0 % 100 == 0 {
            format!("{}", self.0 / 100)
        } else {
            format!("{}.{:02}", self.0 / 100, (self.0 % 100).abs())
        }
    }

    pub fn to_mdl(&self) -> f64 {
        self.0 as f64 / 100.0
    }
}

impl From<i64> for Money {
    fn from(bani: i64) -> Self {
        Self(bani)
    }
}

impl FromStr for Money {
    type Err = MoneyConversionError;

    /// Accepts decimal lei strings as the CRM stores them: `5000`, `5000.5`, `5000.50`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        let whole = whole.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))?;
        let bani = match frac.len() {
            0 => 0,
            len => {
                let frac = &frac[..frac.len().min(2)];
                let mut v = frac.parse::<i64>().map_err(|e| MoneyConversionError(format!("{s}: {e}")))?;
                if len == 1 {
                    v *= 10;
                }
                v
            },
        };
        let sign = if whole < 0 || s.starts_with('-') { -1 } else { 1 };
        Ok(Self(whole * 100 + sign * bani))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02} {MDL_CURRENCY_CODE}", self.0 / 100, (self.0 % 100).abs())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("5000".parse::<Money>().unwrap(), Money::from_lei(5000));
        assert_eq!("5000.50".parse::<Money>().unwrap(), Money::from_bani(500_050));
        assert_eq!("5000.5".parse::<Money>().unwrap(), Money::from_bani(500_050));
        assert_eq!(" 120.05 ".parse::<Money>().unwrap(), Money::from_bani(12_005));
        assert!("12,50".parse::<Money>().is_err());
    }

    #[test]
    fn renders_lei() {
        assert_eq!(Money::from_lei(5000).to_lei_string(), "5000");
        assert_eq!(Money::from_bani(500_050).to_lei_string(), "5000.50");
        assert_eq!(Money::from_bani(123_456).to_string(), "1234.56 MDL");
    }

    #[test]
    fn arithmetic_and_diff() {
        let a = Money::from_lei(4500);
        let b = Money::from_lei(5000);
        assert_eq!(b - a, Money::from_lei(500));
        assert_eq!(a.abs_diff(b), Money::from_lei(500));
        assert_eq!(b.abs_diff(a), Money::from_lei(500));
        assert_eq!(Money::from_mdl(4999.995), Money::from_bani(500_000));
    }
}
