//! Fixed-point amount types and valuation arithmetic.
//!
//! Stable-unit amounts ([`VUSD`]) carry 18 fractional decimals. Price feeds
//! answer with 8 fractional decimals; valuations scale the answer up by
//! [`ADDITIONAL_FEED_PRECISION`] and divide by the collateral token's own
//! precision. All divisions truncate toward zero, so a quoted collateral
//! value never overstates the true value and a token amount owed never
//! understates what must be paid.

use num_traits::{FromPrimitive, ToPrimitive};
use primitive_types::U256;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};

pub const E18: u128 = 1_000_000_000_000_000_000;

/// Fractional decimals of every price feed answer.
pub const FEED_DECIMALS: u32 = 8;

/// Scales an 8-decimal feed answer to the 18-decimal stable-unit precision.
pub const ADDITIONAL_FEED_PRECISION: u128 = 10u128.pow(18 - FEED_DECIMALS);

/// A stable-unit (vUSD) amount, 18-decimal fixed point.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct VUSD(u128);

impl VUSD {
    pub const ZERO: VUSD = VUSD(0);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn to_u128(self) -> u128 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: VUSD) -> Option<VUSD> {
        self.0.checked_add(other.0).map(VUSD)
    }

    pub fn checked_sub(self, other: VUSD) -> Option<VUSD> {
        self.0.checked_sub(other.0).map(VUSD)
    }
}

impl From<u128> for VUSD {
    fn from(value: u128) -> Self {
        Self(value)
    }
}

impl Add for VUSD {
    type Output = VUSD;

    fn add(self, rhs: VUSD) -> VUSD {
        VUSD(self.0 + rhs.0)
    }
}

impl AddAssign for VUSD {
    fn add_assign(&mut self, rhs: VUSD) {
        self.0 += rhs.0;
    }
}

impl Sub for VUSD {
    type Output = VUSD;

    fn sub(self, rhs: VUSD) -> VUSD {
        VUSD(self.0 - rhs.0)
    }
}

impl SubAssign for VUSD {
    fn sub_assign(&mut self, rhs: VUSD) {
        self.0 -= rhs.0;
    }
}

impl Sum for VUSD {
    fn sum<I: Iterator<Item = VUSD>>(iter: I) -> VUSD {
        iter.fold(VUSD::ZERO, |acc, x| acc + x)
    }
}

impl fmt::Display for VUSD {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let whole = self.0 / E18;
        let frac = self.0 % E18;
        if frac == 0 {
            write!(f, "{whole} vUSD")
        } else {
            let frac = format!("{frac:018}");
            write!(f, "{whole}.{} vUSD", frac.trim_end_matches('0'))
        }
    }
}

/// A collateralization ratio scaled by 1e18. `u128::MAX` stands for the
/// health of an account with no debt, which can never be liquidated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct HealthFactor(u128);

impl HealthFactor {
    pub const MAX: HealthFactor = HealthFactor(u128::MAX);

    pub const fn new(value: u128) -> Self {
        Self(value)
    }

    pub fn to_u128(self) -> u128 {
        self.0
    }

    pub fn to_f64(self) -> f64 {
        self.0 as f64 / E18 as f64
    }
}

impl fmt::Display for HealthFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == HealthFactor::MAX {
            write!(f, "MAX")
        } else {
            write!(f, "{:.4}", self.to_f64())
        }
    }
}

/// USD price of one whole collateral token, kept as a decimal for display
/// and logging. Valuation math works on the raw 8-decimal feed answer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UsdPrice(Decimal);

impl UsdPrice {
    pub fn from_e8s(answer_e8: u64) -> Self {
        let value = Decimal::from_u64(answer_e8).unwrap_or(Decimal::ZERO) / dec!(100_000_000);
        Self(value)
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }
}

impl fmt::Display for UsdPrice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

/// `a * b / c` with a 256-bit intermediate product, truncating toward zero.
/// Returns `None` when `c` is zero or the quotient exceeds `u128::MAX`.
pub fn mul_div(a: u128, b: u128, c: u128) -> Option<u128> {
    if c == 0 {
        return None;
    }
    let quotient = U256::from(a).checked_mul(U256::from(b))? / U256::from(c);
    if quotient > U256::from(u128::MAX) {
        None
    } else {
        Some(quotient.low_u128())
    }
}

pub fn pow10(exp: u8) -> Option<u128> {
    10u128.checked_pow(exp as u32)
}

/// USD value (18-decimal) of `amount` raw token units priced at `answer_e8`.
pub fn collateral_usd_value(amount: u128, answer_e8: u64, token_decimals: u8) -> Option<VUSD> {
    let scaled_price = (answer_e8 as u128).checked_mul(ADDITIONAL_FEED_PRECISION)?;
    let unit = pow10(token_decimals)?;
    mul_div(amount, scaled_price, unit).map(VUSD::new)
}

/// Raw token units worth `usd` at `answer_e8`. Inverse of
/// [`collateral_usd_value`] with the same scaling constants.
pub fn collateral_amount_from_usd(usd: VUSD, answer_e8: u64, token_decimals: u8) -> Option<u128> {
    let scaled_price = (answer_e8 as u128).checked_mul(ADDITIONAL_FEED_PRECISION)?;
    let unit = pow10(token_decimals)?;
    mul_div(usd.to_u128(), unit, scaled_price)
}
