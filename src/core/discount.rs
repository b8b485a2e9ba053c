//! FS (friend/sibling referral) and mile (volume) discounts for a guardian's household.

use crate::{
    config::engine::MileDiscountConfig,
    core::{
        catalog,
        household,
        types::{Offering, TenantContext, apply_rate, round_half_up, to_decimal},
    },
    entities::{DiscountType, FsDiscount, contract, fs_discount},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{Condition, QueryOrder, prelude::*};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscountLine {
    /// Positive amount to subtract from the subtotal
    pub amount: i64,
    pub explanation: String,
}

/// Result of [`resolve_discounts`]. A discount worth nothing is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiscountBreakdown {
    pub fs_discount: Option<DiscountLine>,
    pub mile_discount: Option<DiscountLine>,
}

impl DiscountBreakdown {
    #[must_use]
    pub fn total(&self) -> i64 {
        [&self.fs_discount, &self.mile_discount]
            .into_iter()
            .flatten()
            .map(|line| line.amount)
            .sum()
    }
}

/// The guardian's FS discount valid on `today`.
///
/// Bounds are inclusive and an open `valid_until` never expires. When several overlap, the one
/// with the latest `valid_from` wins, then the highest id.
pub async fn active_fs_discount<C>(
    db: &C,
    ctx: TenantContext,
    guardian_id: i64,
    today: NaiveDate,
) -> Result<Option<fs_discount::Model>>
where
    C: ConnectionTrait,
{
    FsDiscount::find()
        .filter(fs_discount::Column::TenantId.eq(ctx.tenant_id))
        .filter(fs_discount::Column::GuardianId.eq(guardian_id))
        .filter(fs_discount::Column::IsActive.eq(true))
        .filter(fs_discount::Column::ValidFrom.lte(today))
        .filter(
            Condition::any()
                .add(fs_discount::Column::ValidUntil.is_null())
                .add(fs_discount::Column::ValidUntil.gte(today)),
        )
        .order_by_desc(fs_discount::Column::ValidFrom)
        .order_by_desc(fs_discount::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Amount of an FS discount against `subtotal`, never more than the subtotal and never negative.
#[must_use]
pub fn fs_discount_amount(discount: &fs_discount::Model, subtotal: i64) -> i64 {
    let subtotal = subtotal.max(0);
    let raw = match discount.discount_type {
        DiscountType::Fixed => round_half_up(to_decimal(discount.value)),
        DiscountType::Percentage => apply_rate(subtotal, discount.value / 100.0),
    };
    raw.clamp(0, subtotal)
}

/// Limits a discount to `max_percent` of the subtotal; no limit when `max_percent` is `None`.
#[must_use]
pub fn cap_by_percent(amount: i64, subtotal: i64, max_percent: Option<i32>) -> i64 {
    match max_percent {
        None => amount,
        Some(percent) => {
            let limit = apply_rate(subtotal.max(0), f64::from(percent.clamp(0, 100)) / 100.0);
            amount.min(limit)
        }
    }
}

/// `(total_miles - threshold) * unit_value`, or 0 for a household with at most one contract.
#[must_use]
pub fn mile_discount_amount(
    total_miles: i64,
    contract_count: usize,
    config: &MileDiscountConfig,
) -> i64 {
    if contract_count <= 1 {
        return 0;
    }
    (total_miles - config.threshold).max(0) * config.unit_value
}

/// Mile value of one existing contract; a contract with neither course nor pack counts 0.
async fn contract_miles<C>(db: &C, ctx: TenantContext, contract: &contract::Model) -> Result<i64>
where
    C: ConnectionTrait,
{
    match (contract.pack_id, contract.course_id) {
        (Some(pack_id), _) => catalog::offering_miles(db, ctx, Offering::Pack(pack_id)).await,
        (None, Some(course_id)) => {
            catalog::offering_miles(db, ctx, Offering::Course(course_id)).await
        }
        (None, None) => Ok(0),
    }
}

/// Household miles including the offering about to be added, and the resulting contract count.
pub async fn household_miles<C>(
    db: &C,
    ctx: TenantContext,
    guardian_id: i64,
    new_offering: Offering,
) -> Result<(i64, usize)>
where
    C: ConnectionTrait,
{
    let contracts = household::active_contracts_for_guardian(db, ctx, guardian_id).await?;

    let mut total = catalog::offering_miles(db, ctx, new_offering).await?;
    for contract in &contracts {
        total += contract_miles(db, ctx, contract).await?;
    }

    Ok((total, contracts.len() + 1))
}

/// Resolves the FS and mile discounts for a guardian adding `new_offering`.
///
/// # Arguments
/// * `subtotal` - the amount percentage FS discounts apply to
/// * `today` - the day FS validity windows are checked against
///
/// # Errors
/// `NotFound` for an unknown guardian or offering.
pub async fn resolve_discounts<C>(
    db: &C,
    ctx: TenantContext,
    guardian_id: i64,
    new_offering: Offering,
    subtotal: i64,
    today: NaiveDate,
    config: &MileDiscountConfig,
) -> Result<DiscountBreakdown>
where
    C: ConnectionTrait,
{
    household::get_guardian(db, ctx, guardian_id).await?;

    let max_percent = catalog::offering_discount_cap(db, ctx, new_offering).await?;
    let fs_discount = active_fs_discount(db, ctx, guardian_id, today)
        .await?
        .and_then(|discount| {
            let uncapped = fs_discount_amount(&discount, subtotal);
            let amount = cap_by_percent(uncapped, subtotal, max_percent);
            let mut explanation = match discount.discount_type {
                DiscountType::Fixed => format!("FS discount (fixed {})", discount.value),
                DiscountType::Percentage => {
                    format!("FS discount ({}% of {subtotal})", discount.value)
                }
            };
            if let Some(percent) = max_percent.filter(|_| amount < uncapped) {
                let _ = write!(explanation, ", limited to {percent}% of {subtotal}");
            }
            (amount > 0).then_some(DiscountLine {
                amount,
                explanation,
            })
        });

    let (total_miles, contract_count) =
        household_miles(db, ctx, guardian_id, new_offering).await?;
    let mile_amount = mile_discount_amount(total_miles, contract_count, config);
    let mile_discount = (mile_amount > 0).then(|| DiscountLine {
        amount: mile_amount,
        explanation: format!(
            "Mile discount: ({total_miles} miles - {}) x {} over {contract_count} contracts",
            config.threshold, config.unit_value
        ),
    });

    debug!(
        guardian_id,
        total_miles,
        contract_count,
        fs = fs_discount.as_ref().map_or(0, |d| d.amount),
        mile = mile_amount,
        "Resolved discounts"
    );

    Ok(DiscountBreakdown {
        fs_discount,
        mile_discount,
    })
}
