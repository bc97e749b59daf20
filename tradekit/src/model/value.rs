use std::{
    cmp::Ordering,
    fmt,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::model::ValidationError;

/// The rounding applied whenever a value is rescaled to its declared precision.
const ROUNDING: RoundingStrategy = RoundingStrategy::MidpointNearestEven;

fn rescale(value: Decimal, precision: u8) -> Decimal {
    let mut rescaled = value.round_dp_with_strategy(precision as u32, ROUNDING);
    rescaled.rescale(precision as u32);
    rescaled
}

/// A price in a market, normalized to the instrument's price precision.
///
/// Arithmetic that would exceed the declared precision is rounded back to it
/// (half-to-even).
#[derive(Clone, Copy, Debug, Eq)]
pub struct Price {
    value: Decimal,
    precision: u8,
}

impl Price {
    /// Constructs an instance of `Price` with the given precision.
    pub fn new(value: Decimal, precision: u8) -> Result<Self, ValidationError> {
        if precision > 18 {
            return Err(ValidationError::PrecisionExceeded(precision));
        }
        Ok(Self {
            value: rescale(value, precision),
            precision,
        })
    }

    /// Returns the maximum representable price at the given precision.
    pub fn max(precision: u8) -> Self {
        Self {
            value: Decimal::MAX.round_dp_with_strategy(precision as u32, RoundingStrategy::ToZero),
            precision,
        }
    }

    /// Returns the minimum representable price at the given precision.
    pub fn min(precision: u8) -> Self {
        Self {
            value: Decimal::MIN.round_dp_with_strategy(precision as u32, RoundingStrategy::ToZero),
            precision,
        }
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    /// Returns this price moved by `n` ticks of the given size. Used by the
    /// matching engine to apply one-tick adverse slippage.
    pub fn offset_ticks(&self, n: i64, tick_size: Decimal) -> Self {
        Self {
            value: rescale(self.value + Decimal::from(n) * tick_size, self.precision),
            precision: self.precision,
        }
    }
}

impl PartialEq for Price {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for Price {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Price {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl std::hash::Hash for Price {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl FromStr for Price {
    type Err = ValidationError;

    /// Parses a price from a decimal literal, inferring the precision from the
    /// literal's scale: `"1.00000"` yields precision 5.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s).map_err(|_| ValidationError::InvalidDecimal(s.to_string()))?;
        Self::new(value, value.scale() as u8)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Add for Price {
    type Output = Price;

    fn add(self, rhs: Price) -> Self::Output {
        Self {
            value: rescale(self.value + rhs.value, self.precision),
            precision: self.precision,
        }
    }
}

impl Sub for Price {
    type Output = Price;

    fn sub(self, rhs: Price) -> Self::Output {
        Self {
            value: rescale(self.value - rhs.value, self.precision),
            precision: self.precision,
        }
    }
}

impl Neg for Price {
    type Output = Price;

    fn neg(self) -> Self::Output {
        Self {
            value: -self.value,
            precision: self.precision,
        }
    }
}

impl Serialize for Price {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Price {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Price::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// A quantity of an instrument, normalized to the instrument's size precision.
///
/// Quantities are never negative; direction is carried by the order side.
#[derive(Clone, Copy, Debug, Eq)]
pub struct Quantity {
    value: Decimal,
    precision: u8,
}

impl Quantity {
    /// Constructs an instance of `Quantity` with the given precision.
    pub fn new(value: Decimal, precision: u8) -> Result<Self, ValidationError> {
        if precision > 18 {
            return Err(ValidationError::PrecisionExceeded(precision));
        }
        if value < Decimal::ZERO {
            return Err(ValidationError::NegativeQuantity(value));
        }
        Ok(Self {
            value: rescale(value, precision),
            precision,
        })
    }

    pub fn zero(precision: u8) -> Self {
        Self {
            value: rescale(Decimal::ZERO, precision),
            precision,
        }
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_positive(&self) -> bool {
        self.value > Decimal::ZERO
    }

    /// Returns the smaller of the two quantities, at this quantity's precision.
    pub fn min(&self, other: Quantity) -> Quantity {
        if other.value < self.value {
            Quantity {
                value: rescale(other.value, self.precision),
                precision: self.precision,
            }
        } else {
            *self
        }
    }

    /// Saturating subtraction; the result never goes below zero.
    pub fn saturating_sub(&self, other: Quantity) -> Quantity {
        let value = (self.value - other.value).max(Decimal::ZERO);
        Quantity {
            value: rescale(value, self.precision),
            precision: self.precision,
        }
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.value.cmp(&other.value)
    }
}

impl std::hash::Hash for Quantity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state);
    }
}

impl FromStr for Quantity {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value =
            Decimal::from_str(s).map_err(|_| ValidationError::InvalidDecimal(s.to_string()))?;
        Self::new(value, value.scale() as u8)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Quantity) -> Self::Output {
        Self {
            value: rescale(self.value + rhs.value, self.precision),
            precision: self.precision,
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Quantity) {
        self.value = rescale(self.value + rhs.value, self.precision);
    }
}

impl Sub for Quantity {
    type Output = Quantity;

    fn sub(self, rhs: Quantity) -> Self::Output {
        Self {
            value: rescale(self.value - rhs.value, self.precision),
            precision: self.precision,
        }
    }
}

impl SubAssign for Quantity {
    fn sub_assign(&mut self, rhs: Quantity) {
        self.value = rescale(self.value - rhs.value, self.precision);
    }
}

impl Serialize for Quantity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Quantity::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// An ISO-style currency with its standard display precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency {
    code: [u8; 4],
    precision: u8,
}

impl Currency {
    /// Constructs a currency from an alphanumeric code of at most 4 characters.
    pub fn new(code: &str, precision: u8) -> Result<Self, ValidationError> {
        if code.is_empty() || code.len() > 4 || !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(ValidationError::InvalidCurrencyCode(code.to_string()));
        }
        let mut bytes = [0u8; 4];
        bytes[..code.len()].copy_from_slice(code.as_bytes());
        Ok(Self {
            code: bytes,
            precision,
        })
    }

    /// Looks up a currency by code from the built-in table.
    pub fn from_code(code: &str) -> Result<Self, ValidationError> {
        let precision = match code {
            "USD" | "AUD" | "CAD" | "EUR" | "GBP" | "NZD" | "CHF" => 2,
            "JPY" => 0,
            "BTC" | "ETH" => 8,
            "USDT" | "USDC" => 6,
            _ => return Err(ValidationError::InvalidCurrencyCode(code.to_string())),
        };
        Self::new(code, precision)
    }

    pub fn code(&self) -> &str {
        let len = self.code.iter().position(|&b| b == 0).unwrap_or(4);
        std::str::from_utf8(&self.code[..len]).expect("currency codes are ASCII")
    }

    pub fn precision(&self) -> u8 {
        self.precision
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_code(s)
    }
}

/// An amount of a specific currency, normalized to the currency's precision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Money {
    value: Decimal,
    currency: Currency,
}

impl Money {
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self {
            value: rescale(value, currency.precision()),
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn currency(&self) -> Currency {
        self.currency
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        debug_assert_eq!(self.currency, rhs.currency);
        Money::new(self.value + rhs.value, self.currency)
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Self::Output {
        debug_assert_eq!(self.currency, rhs.currency);
        Money::new(self.value - rhs.value, self.currency)
    }
}

impl Mul<Decimal> for Money {
    type Output = Money;

    fn mul(self, rhs: Decimal) -> Self::Output {
        Money::new(self.value * rhs, self.currency)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        let (value, code) = s
            .split_once(' ')
            .ok_or_else(|| serde::de::Error::custom("expected '<amount> <currency>'"))?;
        let value = Decimal::from_str(value).map_err(serde::de::Error::custom)?;
        let currency = Currency::from_code(code).map_err(serde::de::Error::custom)?;
        Ok(Money::new(value, currency))
    }
}
