//! Arbitrary-precision signed decimal numbers.
//!
//! A [`Decimal`] is an unscaled [`BigInt`] together with a power-of-ten scale:
//! `value = unscaled × 10^-scale`. Values are always kept normalised (no
//! trailing zeros in the unscaled part, zero has scale 0), so two decimals
//! that compare equal are also structurally equal and hash identically.
//!
//! Addition, subtraction and multiplication are exact. Division and powers
//! take a [`MathContext`] that bounds the number of significant digits.
//!
//! Scales stay within the `i32` range ([`MIN_SCALE`]..=[`MAX_SCALE`]). Any
//! operation whose result would leave it fails instead; at `MIN_SCALE`
//! itself trailing zeros are kept rather than normalised away.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};
use std::str::FromStr;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed, ToPrimitive, Zero};
use thiserror::Error;

use crate::error::{Error, Result};

/// Largest exponent magnitude accepted by [`Decimal::pow`].
pub const MAX_EXPONENT: i64 = 999_999_999;

pub const MAX_SCALE: i64 = i32::MAX as i64;
pub const MIN_SCALE: i64 = i32::MIN as i64;

/// Padding zeros written before `Display` switches to exponent notation.
const PLAIN_ZEROS: i64 = 1 << 16;

// ── Rounding ──────────────────────────────────────────────────────────────────

/// How discarded digits affect the last kept digit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RoundingMode {
    /// Away from zero.
    Up,
    /// Towards zero.
    Down,
    /// Towards positive infinity.
    Ceiling,
    /// Towards negative infinity.
    Floor,
    HalfUp,
    HalfDown,
    #[default]
    HalfEven,
    /// Fail if any non-zero digit would be discarded.
    Unnecessary,
}

impl FromStr for RoundingMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let key = s.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Ok(match key.as_str() {
            "UP" => RoundingMode::Up,
            "DOWN" => RoundingMode::Down,
            "CEILING" => RoundingMode::Ceiling,
            "FLOOR" => RoundingMode::Floor,
            "HALF_UP" => RoundingMode::HalfUp,
            "HALF_DOWN" => RoundingMode::HalfDown,
            "HALF_EVEN" => RoundingMode::HalfEven,
            "UNNECESSARY" => RoundingMode::Unnecessary,
            _ => return Err(format!("unknown rounding mode: {s}")),
        })
    }
}

/// Precision settings for inexact operations.
///
/// A precision of `0` means unlimited: results are exact, and a division
/// with a non-terminating expansion fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MathContext {
    pub precision: u32,
    pub rounding: RoundingMode,
}

impl MathContext {
    /// 34 significant digits, half-even (IEEE 754 decimal128).
    pub const DECIMAL128: MathContext = MathContext::new(34, RoundingMode::HalfEven);
    pub const UNLIMITED: MathContext = MathContext::new(0, RoundingMode::HalfUp);

    pub const fn new(precision: u32, rounding: RoundingMode) -> Self {
        MathContext { precision, rounding }
    }
}

impl Default for MathContext {
    fn default() -> Self {
        MathContext::DECIMAL128
    }
}

// ── Decimal ───────────────────────────────────────────────────────────────────

/// Failure to parse a plain base-10 decimal string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid decimal literal '{0}'")]
pub struct ParseDecimalError(String);

/// An arbitrary-precision signed decimal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Decimal {
    unscaled: BigInt,
    scale: i64,
}

fn pow10(n: u32) -> BigInt {
    BigInt::from(10u32).pow(n)
}

/// `high - low` for two in-range scales. The widest gap,
/// `MAX_SCALE - MIN_SCALE`, is exactly `u32::MAX`.
fn gap(high: i64, low: i64) -> u32 {
    u32::try_from(high - low).unwrap_or(u32::MAX)
}

fn scale_error() -> Error {
    Error::arithmetic("scale out of range")
}

fn digit_count(n: &BigInt) -> u64 {
    if n.is_zero() {
        1
    } else {
        n.magnitude().to_string().len() as u64
    }
}

impl Decimal {
    /// Build `unscaled × 10^-scale`, normalising the representation.
    /// `scale` is expected to be in range; see [`Decimal::checked`].
    pub fn new(unscaled: impl Into<BigInt>, scale: i64) -> Self {
        let mut unscaled = unscaled.into();
        if unscaled.is_zero() {
            return Decimal {
                unscaled,
                scale: 0,
            };
        }
        let ten = BigInt::from(10u32);
        let mut scale = scale;
        while scale > MIN_SCALE {
            let (q, r) = unscaled.div_rem(&ten);
            if !r.is_zero() {
                break;
            }
            unscaled = q;
            scale -= 1;
        }
        Decimal { unscaled, scale }
    }

    /// Like [`Decimal::new`], failing when the normalised scale leaves the
    /// `i32` range.
    pub fn checked(unscaled: impl Into<BigInt>, scale: i64) -> Result<Self> {
        let d = Decimal::new(unscaled, scale);
        if (MIN_SCALE..=MAX_SCALE).contains(&d.scale) {
            Ok(d)
        } else {
            Err(scale_error())
        }
    }

    pub fn zero() -> Self {
        Decimal::new(0, 0)
    }

    pub fn one() -> Self {
        Decimal::new(1, 0)
    }

    pub fn ten() -> Self {
        Decimal::new(10, 0)
    }

    pub fn unscaled(&self) -> &BigInt {
        &self.unscaled
    }

    pub fn scale(&self) -> i64 {
        self.scale
    }

    pub fn is_zero(&self) -> bool {
        self.unscaled.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.unscaled.is_negative()
    }

    pub fn is_positive(&self) -> bool {
        self.unscaled.is_positive()
    }

    /// True when the value has no fractional part.
    pub fn is_integer(&self) -> bool {
        self.scale <= 0
    }

    pub fn abs(&self) -> Decimal {
        Decimal {
            unscaled: self.unscaled.abs(),
            scale: self.scale,
        }
    }

    /// Digits before the decimal point; zero or less when `|self| < 1`.
    pub fn integer_digits(&self) -> i64 {
        digit_count(&self.unscaled) as i64 - self.scale
    }

    /// Both operands rescaled to a common scale.
    fn align(&self, other: &Decimal) -> (BigInt, BigInt, i64) {
        let scale = self.scale.max(other.scale);
        let a = &self.unscaled * pow10(gap(scale, self.scale));
        let b = &other.unscaled * pow10(gap(scale, other.scale));
        (a, b, scale)
    }

    /// Integer part, truncated towards zero.
    pub fn trunc(&self) -> BigInt {
        if self.integer_digits() <= 0 {
            BigInt::zero()
        } else if self.scale <= 0 {
            &self.unscaled * pow10(gap(0, self.scale))
        } else {
            &self.unscaled / pow10(gap(self.scale, 0))
        }
    }

    /// Integer part, rounded towards negative infinity.
    pub fn floor(&self) -> BigInt {
        if self.integer_digits() <= 0 {
            if self.is_negative() {
                -BigInt::one()
            } else {
                BigInt::zero()
            }
        } else if self.scale <= 0 {
            self.trunc()
        } else {
            self.unscaled.div_floor(&pow10(gap(self.scale, 0)))
        }
    }

    /// The integer part as an `i64`, when it fits.
    pub fn trunc_i64(&self) -> Option<i64> {
        if self.integer_digits() > 19 {
            return None;
        }
        self.trunc().to_i64()
    }

    pub fn to_i64(&self) -> Option<i64> {
        if self.is_integer() {
            self.trunc_i64()
        } else {
            None
        }
    }

    pub fn to_i32(&self) -> Option<i32> {
        self.to_i64().and_then(|n| i32::try_from(n).ok())
    }

    /// Nearest `f64`; infinite when the magnitude is out of range.
    pub fn to_f64(&self) -> f64 {
        format!("{}e{}", self.unscaled, -self.scale)
            .parse()
            .unwrap_or(f64::NAN)
    }

    /// Exact decimal expansion of a finite `f64`'s shortest representation.
    pub fn from_f64(x: f64) -> Option<Decimal> {
        if !x.is_finite() {
            return None;
        }
        format!("{x:e}").parse().ok()
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    /// Divide, rounding to `mc`.
    pub fn div(&self, divisor: &Decimal, mc: &MathContext) -> Result<Decimal> {
        if divisor.is_zero() {
            return Err(Error::arithmetic("division by zero"));
        }
        if self.is_zero() {
            return Ok(Decimal::zero());
        }
        if mc.precision == 0 {
            return self.div_exact(divisor);
        }
        let wanted = mc.precision as i64 + 2;
        let shift = (wanted + digit_count(&divisor.unscaled) as i64
            - digit_count(&self.unscaled) as i64)
            .max(0);
        let shift_digits = u32::try_from(shift).map_err(|_| scale_error())?;
        let scaled = &self.unscaled * pow10(shift_digits);
        let (q, r) = scaled.div_rem(&divisor.unscaled);
        let scale = self.scale - divisor.scale + shift;
        round_significant(q, scale, !r.is_zero(), mc)
    }

    fn div_exact(&self, divisor: &Decimal) -> Result<Decimal> {
        let g = self.unscaled.gcd(&divisor.unscaled);
        let mut num = &self.unscaled / &g;
        let mut den = &divisor.unscaled / &g;
        if den.is_negative() {
            num = -num;
            den = -den;
        }
        let two = BigInt::from(2u32);
        let five = BigInt::from(5u32);
        let mut rest = den.clone();
        let (mut twos, mut fives) = (0u64, 0u64);
        while rest.is_multiple_of(&two) {
            rest /= &two;
            twos += 1;
        }
        while rest.is_multiple_of(&five) {
            rest /= &five;
            fives += 1;
        }
        if !rest.is_one() {
            return Err(Error::arithmetic("non-terminating decimal expansion"));
        }
        let k = u32::try_from(twos.max(fives)).map_err(|_| scale_error())?;
        let q = num * pow10(k) / den;
        Decimal::checked(q, self.scale - divisor.scale + i64::from(k))
    }

    /// Integer quotient rounded towards negative infinity.
    pub fn div_floor(&self, divisor: &Decimal) -> Result<Decimal> {
        if divisor.is_zero() {
            return Err(Error::arithmetic("division by zero"));
        }
        let (a, b, _) = self.align(divisor);
        Ok(Decimal::new(a.div_floor(&b), 0))
    }

    /// Integer quotient truncated towards zero.
    pub fn div_trunc(&self, divisor: &Decimal) -> Result<Decimal> {
        if divisor.is_zero() {
            return Err(Error::arithmetic("division by zero"));
        }
        let (a, b, _) = self.align(divisor);
        Ok(Decimal::new(a / b, 0))
    }

    /// Remainder of truncating division; takes the sign of the dividend.
    pub fn rem(&self, divisor: &Decimal) -> Result<Decimal> {
        if divisor.is_zero() {
            return Err(Error::arithmetic("modulus by zero"));
        }
        let (a, b, scale) = self.align(divisor);
        Ok(Decimal::new(a % b, scale))
    }

    /// Raise to `exponent`, rounding to `mc`.
    pub fn pow(&self, exponent: &Decimal, mc: &MathContext) -> Result<Decimal> {
        if exponent.is_integer() {
            let n = exponent
                .to_i64()
                .filter(|n| n.abs() <= MAX_EXPONENT)
                .ok_or_else(|| Error::arithmetic("invalid power"))?;
            if n == 0 {
                return Ok(Decimal::one());
            }
            let magnitude = self.pow_unsigned(n.unsigned_abs(), mc)?;
            return if n > 0 {
                Ok(magnitude)
            } else {
                Decimal::one().div(&magnitude, mc)
            };
        }
        let r = self.to_f64().powf(exponent.to_f64());
        Decimal::from_f64(r)
            .ok_or_else(|| Error::arithmetic("invalid power"))?
            .round(mc)
    }

    fn pow_unsigned(&self, n: u64, mc: &MathContext) -> Result<Decimal> {
        if mc.precision == 0 {
            let scale = self
                .scale
                .checked_mul(n as i64)
                .ok_or_else(|| Error::arithmetic("invalid power"))?;
            if !(MIN_SCALE..=MAX_SCALE).contains(&scale) {
                return Err(scale_error());
            }
            return Decimal::checked(self.unscaled.pow(n as u32), scale);
        }
        // Square-and-multiply with a few guard digits.
        let rounding = match mc.rounding {
            RoundingMode::Unnecessary => RoundingMode::HalfEven,
            other => other,
        };
        let work = MathContext::new(mc.precision + n.to_string().len() as u32 + 1, rounding);
        let mut result = Decimal::one();
        let mut base = self.clone();
        let mut e = n;
        while e > 0 {
            if e & 1 == 1 {
                result = result.checked_mul(&base)?.round(&work)?;
            }
            e >>= 1;
            if e > 0 {
                base = base.checked_mul(&base)?.round(&work)?;
            }
        }
        result.round(mc)
    }

    /// Round to the significant-digit limit of `mc`.
    pub fn round(&self, mc: &MathContext) -> Result<Decimal> {
        round_significant(self.unscaled.clone(), self.scale, false, mc)
    }

    /// Exact product, failing when its scale leaves the `i32` range.
    pub fn checked_mul(&self, rhs: &Decimal) -> Result<Decimal> {
        Decimal::checked(&self.unscaled * &rhs.unscaled, self.scale + rhs.scale)
    }

    /// Round to `places` digits after the decimal point.
    pub fn round_to_scale(&self, places: i64, mode: RoundingMode) -> Result<Decimal> {
        let places = places.clamp(MIN_SCALE, MAX_SCALE);
        if self.scale <= places {
            return Ok(self.clone());
        }
        round_dropping(
            self.unscaled.clone(),
            self.scale,
            (self.scale - places) as u64,
            false,
            mode,
        )
    }
}

/// Round `unscaled × 10^-scale` to `mc.precision` significant digits.
/// `sticky` records that non-zero digits were already discarded beyond
/// the last digit of `unscaled`.
fn round_significant(unscaled: BigInt, scale: i64, sticky: bool, mc: &MathContext) -> Result<Decimal> {
    if mc.precision == 0 {
        return Decimal::checked(unscaled, scale);
    }
    let drop = digit_count(&unscaled).saturating_sub(mc.precision as u64);
    if drop == 0 && !sticky {
        return Decimal::checked(unscaled, scale);
    }
    round_dropping(unscaled, scale, drop, sticky, mc.rounding)
}

fn round_dropping(unscaled: BigInt, scale: i64, drop: u64, sticky: bool, mode: RoundingMode) -> Result<Decimal> {
    let new_scale = scale - drop as i64;
    // Dropping more digits than there are leaves a remainder below one half.
    let (kept, rem, half) = if drop > digit_count(&unscaled) {
        (BigInt::zero(), unscaled.clone(), Ordering::Less)
    } else {
        let divisor = pow10(gap(drop as i64, 0));
        let (kept, rem) = unscaled.div_rem(&divisor);
        let half = match (rem.abs() * 2u32).cmp(&divisor) {
            Ordering::Equal if sticky => Ordering::Greater,
            other => other,
        };
        (kept, rem, half)
    };
    let inexact = sticky || !rem.is_zero();
    if !inexact {
        return Decimal::checked(kept, new_scale);
    }
    let negative = unscaled.is_negative();
    let bump = match mode {
        RoundingMode::Unnecessary => {
            return Err(Error::arithmetic("rounding necessary"));
        }
        RoundingMode::Down => false,
        RoundingMode::Up => true,
        RoundingMode::Ceiling => !negative,
        RoundingMode::Floor => negative,
        RoundingMode::HalfUp => half != Ordering::Less,
        RoundingMode::HalfDown => half == Ordering::Greater,
        RoundingMode::HalfEven => {
            half == Ordering::Greater || (half == Ordering::Equal && kept.is_odd())
        }
    };
    let kept = match (bump, negative) {
        (false, _) => kept,
        (true, false) => kept + 1u32,
        (true, true) => kept - 1u32,
    };
    Decimal::checked(kept, new_scale)
}

// ── Operators ─────────────────────────────────────────────────────────────────

impl Add for &Decimal {
    type Output = Decimal;

    fn add(self, rhs: &Decimal) -> Decimal {
        let (a, b, scale) = self.align(rhs);
        Decimal::new(a + b, scale)
    }
}

impl Sub for &Decimal {
    type Output = Decimal;

    fn sub(self, rhs: &Decimal) -> Decimal {
        let (a, b, scale) = self.align(rhs);
        Decimal::new(a - b, scale)
    }
}

impl Mul for &Decimal {
    type Output = Decimal;

    fn mul(self, rhs: &Decimal) -> Decimal {
        Decimal::new(&self.unscaled * &rhs.unscaled, self.scale + rhs.scale)
    }
}

impl Neg for &Decimal {
    type Output = Decimal;

    fn neg(self) -> Decimal {
        Decimal {
            unscaled: -&self.unscaled,
            scale: self.scale,
        }
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_sign = self.unscaled.sign().cmp(&other.unscaled.sign());
        if by_sign != Ordering::Equal || self.is_zero() {
            return by_sign;
        }
        // Same sign: a longer integer part decides without rescaling.
        let by_size = self.integer_digits().cmp(&other.integer_digits());
        if by_size != Ordering::Equal {
            return if self.is_negative() { by_size.reverse() } else { by_size };
        }
        let (a, b, _) = self.align(other);
        a.cmp(&b)
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// ── Conversions ───────────────────────────────────────────────────────────────

impl From<i64> for Decimal {
    fn from(n: i64) -> Self {
        Decimal::new(n, 0)
    }
}

impl From<i32> for Decimal {
    fn from(n: i32) -> Self {
        Decimal::new(n, 0)
    }
}

impl From<BigInt> for Decimal {
    fn from(n: BigInt) -> Self {
        Decimal::new(n, 0)
    }
}

/// Plain rendering. Only values needing more than `PLAIN_ZEROS` padding
/// zeros use exponent notation (`1E+100000`), which still parses back.
impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let digits = self.unscaled.magnitude().to_string();
        if self.unscaled.is_negative() {
            f.write_str("-")?;
        }
        let padding = if self.scale <= 0 {
            -self.scale
        } else {
            self.scale - digits.len() as i64
        };
        if padding > PLAIN_ZEROS {
            let (head, tail) = digits.split_at(1);
            f.write_str(head)?;
            if !tail.is_empty() {
                write!(f, ".{tail}")?;
            }
            return write!(f, "E{:+}", self.integer_digits() - 1);
        }
        if self.scale <= 0 {
            f.write_str(&digits)?;
            if !self.is_zero() {
                f.write_str(&"0".repeat((-self.scale) as usize))?;
            }
            return Ok(());
        }
        let scale = self.scale as usize;
        if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{int}.{frac}")
        } else {
            write!(f, "0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

/// Parses `[+-]digits[.digits][(e|E)[+-]digits]`, base 10 only.
impl FromStr for Decimal {
    type Err = ParseDecimalError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let bad = || ParseDecimalError(s.to_owned());
        let (mantissa, exponent) = match s.find(['e', 'E']) {
            Some(i) => (&s[..i], s[i + 1..].parse::<i64>().map_err(|_| bad())?),
            None => (s, 0),
        };
        let (negative, mantissa) = match mantissa.as_bytes().first() {
            Some(b'-') => (true, &mantissa[1..]),
            Some(b'+') => (false, &mantissa[1..]),
            _ => (false, mantissa),
        };
        let (int, frac) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        if int.is_empty() && frac.is_empty() {
            return Err(bad());
        }
        if !int.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(bad());
        }
        let digits = format!("{int}{frac}");
        let mut unscaled: BigInt = digits.parse().map_err(|_| bad())?;
        if negative {
            unscaled = -unscaled;
        }
        let scale = (frac.len() as i64).checked_sub(exponent).ok_or_else(bad)?;
        Decimal::checked(unscaled, scale).map_err(|_| bad())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
