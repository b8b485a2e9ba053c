//! Value types shared by every engine module.
//!
//! Amounts are `i64` in the tenant's base currency unit. Rates are applied through
//! `rust_decimal` and quantized half-up (midpoint away from zero) to whole units.

use crate::errors::{Error, Result};
use chrono::{Datelike, NaiveDate};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Explicit tenant scope passed to every repository call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantContext {
    pub tenant_id: i64,
}

impl TenantContext {
    #[must_use]
    pub const fn new(tenant_id: i64) -> Self {
        Self { tenant_id }
    }
}

/// What is being newly purchased: a single course or a pack of courses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum Offering {
    Course(i64),
    Pack(i64),
}

/// A calendar billing month.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Builds a validated year/month; `month` must be in `1..=12`.
    pub fn new(year: i32, month: u32) -> Result<Self> {
        if !(1..=12).contains(&month) || NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(Error::InvalidPeriod { year, month });
        }
        Ok(Self { year, month })
    }

    /// Same as [`YearMonth::new`] for values read from `i32` storage columns.
    pub fn from_columns(year: i32, month: i32) -> Result<Self> {
        let month = u32::try_from(month).map_err(|_| Error::InvalidPeriod {
            year,
            month: 0,
        })?;
        Self::new(year, month)
    }

    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    #[must_use]
    pub const fn next(self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    pub fn first_day(self) -> Result<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or(Error::InvalidPeriod {
            year: self.year,
            month: self.month,
        })
    }

    pub fn days_in_month(self) -> Result<u32> {
        let first = self.first_day()?;
        let next_first = self.next().first_day()?;
        let days = next_first.signed_duration_since(first).num_days();
        Ok(u32::try_from(days)?)
    }

    /// Month as stored in `i32` columns.
    #[must_use]
    pub fn month_column(self) -> i32 {
        // month is validated to 1..=12 at construction
        i32::try_from(self.month).unwrap_or_default()
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// Converts a stored `f64` rate to `Decimal`, keeping the shortest decimal form (0.3 stays 0.3).
#[inline]
#[must_use]
pub fn to_decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or_default()
}

/// Rounds half-up (midpoint away from zero) to a whole currency unit.
#[inline]
#[must_use]
pub fn round_half_up(value: Decimal) -> i64 {
    value
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or_default()
}

/// `round_half_up(amount * rate)`
#[inline]
#[must_use]
pub fn apply_rate(amount: i64, rate: f64) -> i64 {
    round_half_up(Decimal::from(amount) * to_decimal(rate))
}
