// sheethub/src/money.rs

//! Monetary values and the royalty/commission split.
//!
//! Amounts are stored as integer minor units (cents). Everything derived from
//! them (processor fee, royalty, commission) is computed in `Decimal` and
//! rounded once, at the end, with a single configured `RoundingRule`.
//!
//! Royalty and commission are rounded independently, so they need not add up
//! to `amount - fee` to the cent. That gap is accepted and not reconciled.

use crate::error::{Result, SheetHubError};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

const MINOR_PER_MAJOR: i64 = 100;
const DISPLAY_PLACES: u32 = 2;

/// An amount in minor currency units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
  pub const ZERO: Money = Money(0);

  pub const fn from_minor(minor_units: i64) -> Self {
    Money(minor_units)
  }

  pub const fn minor_units(self) -> i64 {
    self.0
  }

  pub const fn is_zero(self) -> bool {
    self.0 == 0
  }

  pub const fn is_negative(self) -> bool {
    self.0 < 0
  }

  /// Display-precision value: `minor_units / 100`, exact.
  pub fn to_major(self) -> Decimal {
    Decimal::new(self.0, DISPLAY_PLACES)
  }

  /// Parses a major-unit amount such as `"10.00"`, as returned by payment processors.
  /// Sub-cent precision is rejected rather than rounded away.
  pub fn parse_major(text: &str) -> Option<Self> {
    let value = Decimal::from_str(text.trim()).ok()?;
    let minor = value.checked_mul(Decimal::from(MINOR_PER_MAJOR))?;
    if minor.fract() != Decimal::ZERO {
      return None;
    }
    minor.to_i64().map(Money)
  }
}

impl fmt::Display for Money {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", to_display(self.to_major()))
  }
}

/// Formats a decimal with exactly two places (`3` -> `"3.00"`).
pub fn to_display(value: Decimal) -> String {
  let mut shown = value;
  shown.rescale(DISPLAY_PLACES);
  shown.to_string()
}

/// How half-way values are rounded. One rule is used for every figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundingRule {
  /// 0.005 -> 0.01, -0.005 -> -0.01.
  #[default]
  HalfUp,
  /// Banker's rounding: 0.005 -> 0.00, 0.015 -> 0.02.
  HalfEven,
}

impl RoundingRule {
  fn strategy(self) -> RoundingStrategy {
    match self {
      RoundingRule::HalfUp => RoundingStrategy::MidpointAwayFromZero,
      RoundingRule::HalfEven => RoundingStrategy::MidpointNearestEven,
    }
  }

  pub fn round(self, value: Decimal, places: u32) -> Decimal {
    value.round_dp_with_strategy(places, self.strategy())
  }
}

impl FromStr for RoundingRule {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "half_up" | "halfup" => Ok(RoundingRule::HalfUp),
      "half_even" | "halfeven" | "bankers" => Ok(RoundingRule::HalfEven),
      other => Err(format!("unknown rounding rule '{}' (expected half_up or half_even)", other)),
    }
  }
}

/// The payment processor's fee schedule: `rate * amount + fixed`, in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
  pub rate: Decimal,
  pub fixed: Decimal,
}

impl FeeSchedule {
  pub fn new(rate: Decimal, fixed: Decimal) -> Self {
    Self { rate, fixed }
  }

  /// Unrounded processor fee for a sale of `amount` major units.
  pub fn fee_for(&self, amount: Decimal) -> Decimal {
    self.rate * amount + self.fixed
  }
}

impl Default for FeeSchedule {
  fn default() -> Self {
    // 2.9% + 0.30
    Self {
      rate: Decimal::new(29, 3),
      fixed: Decimal::new(30, 2),
    }
  }
}

/// Validates a royalty percentage expressed as a fraction in `[0, 1]`.
pub fn validate_royalty_percentage(percentage: Decimal) -> Result<Decimal> {
  if percentage < Decimal::ZERO || percentage > Decimal::ONE {
    return Err(SheetHubError::InvalidRoyaltyPercentage(percentage));
  }
  Ok(percentage)
}

/// Financial breakdown of one completed sale, in major units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaleSplit {
  pub amount: Decimal,
  /// Unrounded processor fee, kept exact for auditing.
  pub processor_fee: Decimal,
  /// Creator's share after processor fees. May be negative on very small sales.
  pub royalty: Decimal,
  /// Platform's share.
  pub commission: Decimal,
}

/// Royalty/commission of a sheet at its list price, before processor fees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ListPriceSplit {
  pub royalty: Decimal,
  pub commission: Decimal,
  pub royalty_minor: i64,
  pub commission_minor: i64,
}

/// Computes sale splits with a fixed fee schedule and rounding rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RoyaltyCalculator {
  fees: FeeSchedule,
  rounding: RoundingRule,
}

impl RoyaltyCalculator {
  pub fn new(fees: FeeSchedule, rounding: RoundingRule) -> Self {
    Self { fees, rounding }
  }

  pub fn fees(&self) -> FeeSchedule {
    self.fees
  }

  pub fn rounding(&self) -> RoundingRule {
    self.rounding
  }

  pub fn round2(&self, value: Decimal) -> Decimal {
    self.rounding.round(value, DISPLAY_PLACES)
  }

  /// `royalty = round2(r * amount - fee)`, `commission = round2((1 - r) * amount)`.
  pub fn split(&self, amount: Money, royalty_percentage: Decimal) -> Result<SaleSplit> {
    let r = validate_royalty_percentage(royalty_percentage)?;
    let amount = amount.to_major();
    let processor_fee = self.fees.fee_for(amount);
    Ok(SaleSplit {
      amount,
      processor_fee,
      royalty: self.round2(r * amount - processor_fee),
      commission: self.round2((Decimal::ONE - r) * amount),
    })
  }

  pub fn list_price_split(&self, price: Money, royalty_percentage: Decimal) -> Result<ListPriceSplit> {
    let r = validate_royalty_percentage(royalty_percentage)?;
    let major = price.to_major();
    let minor = Decimal::from(price.minor_units());
    let royalty_minor = self.rounding.round(r * minor, 0);
    let commission_minor = self.rounding.round((Decimal::ONE - r) * minor, 0);
    Ok(ListPriceSplit {
      royalty: self.round2(r * major),
      commission: self.round2((Decimal::ONE - r) * major),
      royalty_minor: royalty_minor
        .to_i64()
        .ok_or_else(|| SheetHubError::Internal(format!("royalty out of range: {}", royalty_minor)))?,
      commission_minor: commission_minor
        .to_i64()
        .ok_or_else(|| SheetHubError::Internal(format!("commission out of range: {}", commission_minor)))?,
    })
  }
}
