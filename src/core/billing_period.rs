//! Billing periods - open/closed state per payment provider and month.
//!
//! A period is open until someone closes it; closing is never time based. Rows are created
//! the first time a (provider, year, month) is referenced, and a missing row reads as open.
//! Invoice editability requires every active provider to have the month open.

use crate::{
    core::types::{TenantContext, YearMonth},
    entities::{BillingPeriod, PaymentProvider, billing_period, payment_provider},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*, sea_query::OnConflict};
use serde::Serialize;
use std::fmt::Write as _;
use tracing::{debug, info};

/// Months reported by [`billing_info_for_new_enrollment`]: the enrollment month and the next two.
const ENROLLMENT_LOOKAHEAD_MONTHS: usize = 3;

/// The engine's view of an invoice: whose it is and which month it bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InvoicePeriod {
    pub provider_id: i64,
    pub year: i32,
    pub month: u32,
}

/// Closing date of a provider's month; a closing day past month end falls on the last day.
pub fn closing_date(closing_day: i32, period: YearMonth) -> Result<NaiveDate> {
    if !(1..=31).contains(&closing_day) {
        return Err(Error::configuration(
            "closing_day",
            format!("{closing_day} is outside 1..=31"),
        ));
    }
    let day = u32::try_from(closing_day)?.min(period.days_in_month()?);
    NaiveDate::from_ymd_opt(period.year, period.month, day).ok_or(Error::InvalidPeriod {
        year: period.year,
        month: period.month,
    })
}

/// Billing month a charge dated `charge_date` lands in: its own month up to and including
/// the closing date, the next month after it.
pub fn billing_month_for_charge(charge_date: NaiveDate, closing_day: i32) -> Result<YearMonth> {
    let this_month = YearMonth::of(charge_date);
    if charge_date > closing_date(closing_day, this_month)? {
        Ok(this_month.next())
    } else {
        Ok(this_month)
    }
}

/// Creates a payment provider after checking its closing day.
pub async fn create_provider<C>(
    db: &C,
    ctx: TenantContext,
    code: &str,
    name: &str,
    closing_day: i32,
) -> Result<payment_provider::Model>
where
    C: ConnectionTrait,
{
    if !(1..=31).contains(&closing_day) {
        return Err(Error::configuration(
            "closing_day",
            format!("{closing_day} is outside 1..=31"),
        ));
    }

    let provider = payment_provider::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        code: Set(code.to_string()),
        name: Set(name.to_string()),
        closing_day: Set(closing_day),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(provider_id = provider.id, code, closing_day, "Created payment provider");
    Ok(provider)
}

/// Gets a payment provider of the tenant, or `NotFound`.
pub async fn get_provider<C>(db: &C, ctx: TenantContext, provider_id: i64) -> Result<payment_provider::Model>
where
    C: ConnectionTrait,
{
    PaymentProvider::find_by_id(provider_id)
        .filter(payment_provider::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("PaymentProvider", provider_id))
}

pub async fn active_providers<C>(db: &C, ctx: TenantContext) -> Result<Vec<payment_provider::Model>>
where
    C: ConnectionTrait,
{
    PaymentProvider::find()
        .filter(payment_provider::Column::TenantId.eq(ctx.tenant_id))
        .filter(payment_provider::Column::IsActive.eq(true))
        .order_by_asc(payment_provider::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

async fn find_period<C>(
    db: &C,
    ctx: TenantContext,
    provider_id: i64,
    period: YearMonth,
) -> Result<Option<billing_period::Model>>
where
    C: ConnectionTrait,
{
    BillingPeriod::find()
        .filter(billing_period::Column::TenantId.eq(ctx.tenant_id))
        .filter(billing_period::Column::ProviderId.eq(provider_id))
        .filter(billing_period::Column::Year.eq(period.year))
        .filter(billing_period::Column::Month.eq(period.month_column()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Gets the provider's period for a month, creating it open when first referenced.
///
/// # Errors
/// `NotFound` when the provider does not exist in the tenant.
pub async fn get_or_create_period<C>(
    db: &C,
    ctx: TenantContext,
    provider_id: i64,
    period: YearMonth,
) -> Result<billing_period::Model>
where
    C: ConnectionTrait,
{
    if let Some(existing) = find_period(db, ctx, provider_id, period).await? {
        return Ok(existing);
    }

    let provider = get_provider(db, ctx, provider_id).await?;
    insert_open_period(db, ctx, &provider, period).await
}

/// Inserts the open period unless a row for the same key already exists, then reads the
/// stored row back. A concurrent first reference therefore sees the other writer's row.
async fn insert_open_period<C>(
    db: &C,
    ctx: TenantContext,
    provider: &payment_provider::Model,
    period: YearMonth,
) -> Result<billing_period::Model>
where
    C: ConnectionTrait,
{
    let row = billing_period::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        provider_id: Set(provider.id),
        year: Set(period.year),
        month: Set(period.month_column()),
        closing_date: Set(closing_date(provider.closing_day, period)?),
        is_closed: Set(false),
        closed_at: Set(None),
        closed_by: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    let inserted = BillingPeriod::insert(row)
        .on_conflict(
            OnConflict::columns([
                billing_period::Column::TenantId,
                billing_period::Column::ProviderId,
                billing_period::Column::Year,
                billing_period::Column::Month,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    if inserted > 0 {
        debug!(provider_id = provider.id, %period, "Created billing period");
    }

    find_period(db, ctx, provider.id, period)
        .await?
        .ok_or_else(|| Error::not_found("BillingPeriod", provider.id))
}

/// Whether the provider's month is closed; a month never referenced is open.
pub async fn is_period_closed<C>(
    db: &C,
    ctx: TenantContext,
    provider_id: i64,
    period: YearMonth,
) -> Result<bool>
where
    C: ConnectionTrait,
{
    Ok(find_period(db, ctx, provider_id, period)
        .await?
        .is_some_and(|p| p.is_closed))
}

async fn set_closed(
    db: &DatabaseConnection,
    ctx: TenantContext,
    provider_id: i64,
    period: YearMonth,
    closed: bool,
    closed_by: Option<&str>,
) -> Result<billing_period::Model> {
    let txn = db.begin().await?;
    let current = get_or_create_period(&txn, ctx, provider_id, period).await?;

    if current.is_closed == closed {
        // already in the requested state
        txn.commit().await?;
        return Ok(current);
    }

    let mut active: billing_period::ActiveModel = current.into();
    active.is_closed = Set(closed);
    if closed {
        active.closed_at = Set(Some(Utc::now()));
        active.closed_by = Set(closed_by.map(str::to_string));
    } else {
        active.closed_at = Set(None);
        active.closed_by = Set(None);
    }
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    info!(provider_id, %period, closed, by = ?closed_by, "Billing period state changed");
    Ok(updated)
}

/// Closes the provider's month. Closing a closed period returns it unchanged.
pub async fn close_period(
    db: &DatabaseConnection,
    ctx: TenantContext,
    provider_id: i64,
    period: YearMonth,
    closed_by: Option<&str>,
) -> Result<billing_period::Model> {
    set_closed(db, ctx, provider_id, period, true, closed_by).await
}

/// Reopens the provider's month. Reopening an open period returns it unchanged.
pub async fn reopen_period(
    db: &DatabaseConnection,
    ctx: TenantContext,
    provider_id: i64,
    period: YearMonth,
) -> Result<billing_period::Model> {
    set_closed(db, ctx, provider_id, period, false, None).await
}

/// Existing periods of a month across providers.
pub async fn list_periods<C>(db: &C, ctx: TenantContext, period: YearMonth) -> Result<Vec<billing_period::Model>>
where
    C: ConnectionTrait,
{
    BillingPeriod::find()
        .filter(billing_period::Column::TenantId.eq(ctx.tenant_id))
        .filter(billing_period::Column::Year.eq(period.year))
        .filter(billing_period::Column::Month.eq(period.month_column()))
        .order_by_asc(billing_period::Column::ProviderId)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Whether any active provider has closed the month.
pub async fn is_closed_for_any_provider<C>(db: &C, ctx: TenantContext, period: YearMonth) -> Result<bool>
where
    C: ConnectionTrait,
{
    let provider_ids: Vec<i64> = active_providers(db, ctx)
        .await?
        .into_iter()
        .map(|p| p.id)
        .collect();
    if provider_ids.is_empty() {
        return Ok(false);
    }

    let closed = BillingPeriod::find()
        .filter(billing_period::Column::TenantId.eq(ctx.tenant_id))
        .filter(billing_period::Column::Year.eq(period.year))
        .filter(billing_period::Column::Month.eq(period.month_column()))
        .filter(billing_period::Column::IsClosed.eq(true))
        .filter(billing_period::Column::ProviderId.is_in(provider_ids))
        .count(db)
        .await?;
    Ok(closed > 0)
}

/// Whether an invoice can still be edited.
///
/// False as soon as any active provider has closed the invoice's month, even when the
/// invoice's own provider has not.
pub async fn can_edit_invoice<C>(db: &C, ctx: TenantContext, invoice: &InvoicePeriod) -> Result<bool>
where
    C: ConnectionTrait,
{
    let period = YearMonth::new(invoice.year, invoice.month)?;
    Ok(!is_closed_for_any_provider(db, ctx, period).await?)
}

/// Billing month for a new charge through the given provider.
pub async fn billing_month_for_new_charge<C>(
    db: &C,
    ctx: TenantContext,
    charge_date: NaiveDate,
    provider_id: i64,
) -> Result<YearMonth>
where
    C: ConnectionTrait,
{
    let provider = get_provider(db, ctx, provider_id).await?;
    billing_month_for_charge(charge_date, provider.closing_day)
}

/// Editability of one month for a new enrollment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MonthEditability {
    pub period: YearMonth,
    /// Closing date of the month for the enrollment's provider
    pub closing_date: NaiveDate,
    /// Some active provider has closed the month
    pub closed: bool,
    /// The enrollment date is on or before `closing_date`
    pub before_closing: bool,
    pub editable: bool,
}

/// Which of the next months a new member's fee adjustments can still land in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrollmentBillingInfo {
    pub enrollment_date: NaiveDate,
    pub provider_id: i64,
    pub months: Vec<MonthEditability>,
    pub first_billable_month: Option<YearMonth>,
    pub summary: String,
}

fn summarize(months: &[MonthEditability], first: Option<YearMonth>) -> String {
    let mut summary = String::new();
    for month in months.iter().take_while(|m| !m.editable) {
        let why = if month.closed {
            "closed"
        } else {
            "past its closing date"
        };
        let _ = write!(summary, "{} is {why} ({}); ", month.period, month.closing_date);
    }
    match first {
        Some(first) => {
            let _ = write!(summary, "first billable month is {first}");
        }
        None => summary.push_str("no billable month in the next three months"),
    }
    summary
}

/// Reports, for the enrollment month and the two after it, whether each can still be billed.
///
/// # Errors
/// `NotFound` when the provider does not exist in the tenant.
pub async fn billing_info_for_new_enrollment<C>(
    db: &C,
    ctx: TenantContext,
    enrollment_date: NaiveDate,
    provider_id: i64,
) -> Result<EnrollmentBillingInfo>
where
    C: ConnectionTrait,
{
    let provider = get_provider(db, ctx, provider_id).await?;

    let mut months = Vec::with_capacity(ENROLLMENT_LOOKAHEAD_MONTHS);
    let mut period = YearMonth::of(enrollment_date);
    for _ in 0..ENROLLMENT_LOOKAHEAD_MONTHS {
        let closing = closing_date(provider.closing_day, period)?;
        let closed = is_closed_for_any_provider(db, ctx, period).await?;
        let before_closing = enrollment_date <= closing;
        months.push(MonthEditability {
            period,
            closing_date: closing,
            closed,
            before_closing,
            editable: !closed && before_closing,
        });
        period = period.next();
    }

    let first_billable_month = months.iter().find(|m| m.editable).map(|m| m.period);
    let summary = summarize(&months, first_billable_month);
    debug!(provider_id, %enrollment_date, summary = %summary, "Computed enrollment billing info");

    Ok(EnrollmentBillingInfo {
        enrollment_date,
        provider_id,
        months,
        first_billable_month,
        summary,
    })
}
