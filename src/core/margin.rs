//! Margin calculation and its persisted records.
//!
//! [`calculate_margin`] is pure. The rest of this module stores one calculation per invoice
//! line, moves it through draft -> confirmed -> paid, and keeps the monthly per
//! (school, brand) summaries in step, each logical operation in a single transaction.

use crate::{
    core::{
        margin_rule::{MarginRule, SaleContext, resolve_margin_rule},
        types::{TenantContext, YearMonth, apply_rate},
    },
    entities::{
        Brand, CalculationStatus, CalculationType, FixedMarginTarget, MarginCalculation,
        MonthlyMarginSummary, School, brand, margin_calculation, monthly_margin_summary, school,
    },
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{
    QueryOrder, Set, TransactionTrait,
    prelude::*,
    sea_query::{Expr, OnConflict},
};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Amounts produced by [`calculate_margin`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MarginResult {
    pub sales_amount: i64,
    pub total_cost: i64,
    /// `sales_amount - total_cost`, kept as computed even when negative
    pub net_profit: i64,
    pub margin_pool: i64,
    pub school_margin: i64,
    pub brand_margin: i64,
    /// Part of the pool that came from the rule's fixed amount; already inside one bucket
    pub fixed_margin: i64,
}

impl MarginResult {
    fn zero(sales_amount: i64, total_cost: i64, net_profit: i64) -> Self {
        Self {
            sales_amount,
            total_cost,
            net_profit,
            ..Self::default()
        }
    }
}

/// Splits `amount` between school and brand by the rule's distribution rates.
fn distribute(amount: i64, rule: &MarginRule) -> (i64, i64) {
    (
        apply_rate(amount, rule.school_distribution_rate),
        apply_rate(amount, rule.brand_distribution_rate),
    )
}

/// Adds `fixed` to the bucket the rule names.
const fn add_fixed(school: i64, brand: i64, fixed: i64, target: FixedMarginTarget) -> (i64, i64) {
    match target {
        FixedMarginTarget::School => (school + fixed, brand),
        FixedMarginTarget::Brand => (school, brand + fixed),
    }
}

/// Computes the margin of a sale under a rule.
///
/// A sale without profit yields a result whose margin fields are all 0. The two buckets
/// are rounded independently, so `school_margin + brand_margin` may differ from
/// `margin_pool` by one unit.
#[must_use]
pub fn calculate_margin(sales_amount: i64, total_cost: i64, rule: &MarginRule) -> MarginResult {
    let net_profit = sales_amount - total_cost;
    if net_profit <= 0 {
        return MarginResult::zero(sales_amount, total_cost, net_profit);
    }

    let (margin_pool, school_margin, brand_margin, fixed_margin) = match rule.calculation_type {
        CalculationType::Percentage => {
            let pool = apply_rate(net_profit, rule.margin_rate);
            let (school, brand) = distribute(pool, rule);
            (pool, school, brand, 0)
        }
        CalculationType::Fixed => {
            let pool = rule.fixed_margin_amount.min(net_profit);
            let (school, brand) = add_fixed(0, 0, pool, rule.fixed_margin_target);
            (pool, school, brand, pool)
        }
        CalculationType::Mixed => {
            let fixed = rule.fixed_margin_amount.min(net_profit);
            let distributable = apply_rate(net_profit - fixed, rule.margin_rate);
            let (school, brand) = distribute(distributable, rule);
            let (school, brand) = add_fixed(school, brand, fixed, rule.fixed_margin_target);
            (fixed + distributable, school, brand, fixed)
        }
    };

    MarginResult {
        sales_amount,
        total_cost,
        net_profit,
        margin_pool,
        school_margin,
        brand_margin,
        fixed_margin,
    }
}

/// Names and rates captured when a calculation is stored, so the record stays reproducible
/// after the catalog or rule changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntitySnapshot {
    pub rule_id: i64,
    pub rule_name: String,
    pub calculation_type: CalculationType,
    pub margin_rate: f64,
    pub school_distribution_rate: f64,
    pub brand_distribution_rate: f64,
    pub school_name: String,
    pub brand_name: String,
}

async fn capture_snapshot<C>(
    db: &C,
    ctx: TenantContext,
    rule: &MarginRule,
    school_id: i64,
    brand_id: i64,
) -> Result<EntitySnapshot>
where
    C: ConnectionTrait,
{
    let school = School::find_by_id(school_id)
        .filter(school::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("School", school_id))?;
    let brand = Brand::find_by_id(brand_id)
        .filter(brand::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Brand", brand_id))?;

    Ok(EntitySnapshot {
        rule_id: rule.id,
        rule_name: rule.name.clone(),
        calculation_type: rule.calculation_type,
        margin_rate: rule.margin_rate,
        school_distribution_rate: rule.school_distribution_rate,
        brand_distribution_rate: rule.brand_distribution_rate,
        school_name: school.name,
        brand_name: brand.name,
    })
}

/// Input to [`record_margin_calculation`].
#[derive(Debug, Clone)]
pub struct NewMarginCalculation {
    /// Unique reference of the invoice line
    pub invoice_line_ref: String,
    pub sale: SaleContext,
    pub period: YearMonth,
    pub sales_amount: i64,
    pub total_cost: i64,
}

fn sale_of(model: &margin_calculation::Model) -> SaleContext {
    SaleContext {
        product_id: model.product_id,
        course_id: model.course_id,
        pack_id: model.pack_id,
        instructor_id: model.instructor_id,
        school_id: model.school_id,
        brand_id: model.brand_id,
        guardian_id: model.guardian_id,
    }
}

/// Copies a result and its snapshot onto an active model.
fn apply_result(
    active: &mut margin_calculation::ActiveModel,
    result: &MarginResult,
    snapshot: EntitySnapshot,
) {
    active.margin_rule_id = Set(snapshot.rule_id);
    active.rule_name = Set(snapshot.rule_name);
    active.calculation_type = Set(snapshot.calculation_type);
    active.margin_rate = Set(snapshot.margin_rate);
    active.school_distribution_rate = Set(snapshot.school_distribution_rate);
    active.brand_distribution_rate = Set(snapshot.brand_distribution_rate);
    active.school_name = Set(snapshot.school_name);
    active.brand_name = Set(snapshot.brand_name);
    active.sales_amount = Set(result.sales_amount);
    active.total_cost = Set(result.total_cost);
    active.net_profit = Set(result.net_profit);
    active.margin_pool = Set(result.margin_pool);
    active.school_margin = Set(result.school_margin);
    active.brand_margin = Set(result.brand_margin);
    active.fixed_margin = Set(result.fixed_margin);
}

/// Adds (or with `sign = -1` removes) one calculation's amounts to its monthly summary.
///
/// A single upsert on the (tenant, school, brand, year, month) key, so two writers never
/// create two summary rows for the same month.
async fn add_to_summary<C>(
    db: &C,
    ctx: TenantContext,
    calc: &margin_calculation::Model,
    sign: i64,
) -> Result<()>
where
    C: ConnectionTrait,
{
    use monthly_margin_summary::Column;

    let deltas = [
        (Column::TotalSales, sign * calc.sales_amount),
        (Column::TotalCost, sign * calc.total_cost),
        (Column::TotalNetProfit, sign * calc.net_profit),
        (Column::TotalMarginPool, sign * calc.margin_pool),
        (Column::TotalSchoolMargin, sign * calc.school_margin),
        (Column::TotalBrandMargin, sign * calc.brand_margin),
        (Column::TotalFixedMargin, sign * calc.fixed_margin),
        (Column::CalculationCount, sign),
    ];

    let mut on_conflict = OnConflict::columns([
        Column::TenantId,
        Column::SchoolId,
        Column::BrandId,
        Column::Year,
        Column::Month,
    ]);
    for (column, delta) in deltas {
        on_conflict.value(
            column,
            Expr::col((MonthlyMarginSummary, column)).add(delta),
        );
    }
    on_conflict.update_column(Column::UpdatedAt);

    let row = monthly_margin_summary::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        school_id: Set(calc.school_id),
        brand_id: Set(calc.brand_id),
        year: Set(calc.billing_year),
        month: Set(calc.billing_month),
        total_sales: Set(deltas[0].1),
        total_cost: Set(deltas[1].1),
        total_net_profit: Set(deltas[2].1),
        total_margin_pool: Set(deltas[3].1),
        total_school_margin: Set(deltas[4].1),
        total_brand_margin: Set(deltas[5].1),
        total_fixed_margin: Set(deltas[6].1),
        calculation_count: Set(sign),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };
    MonthlyMarginSummary::insert(row)
        .on_conflict(on_conflict)
        .exec_without_returning(db)
        .await?;

    Ok(())
}

/// Resolves the rule, computes the margin and stores a draft calculation for an invoice line.
///
/// The calculation row and its monthly summary update commit together or not at all.
///
/// # Errors
/// * `Configuration` on `invoice_line_ref` when the line already has a calculation
/// * `InvalidAmount` for negative sales or cost
/// * `NotFound` when no rule applies or the school or brand is unknown
pub async fn record_margin_calculation(
    db: &DatabaseConnection,
    ctx: TenantContext,
    new: NewMarginCalculation,
) -> Result<margin_calculation::Model> {
    for amount in [new.sales_amount, new.total_cost] {
        if amount < 0 {
            return Err(Error::InvalidAmount { amount });
        }
    }

    let txn = db.begin().await?;

    let duplicate = MarginCalculation::find()
        .filter(margin_calculation::Column::TenantId.eq(ctx.tenant_id))
        .filter(margin_calculation::Column::InvoiceLineRef.eq(new.invoice_line_ref.as_str()))
        .count(&txn)
        .await?;
    if duplicate > 0 {
        return Err(Error::configuration(
            "invoice_line_ref",
            format!("{} already has a margin calculation", new.invoice_line_ref),
        ));
    }

    let rule = resolve_margin_rule(&txn, ctx, &new.sale).await?;
    let result = calculate_margin(new.sales_amount, new.total_cost, &rule);
    let snapshot =
        capture_snapshot(&txn, ctx, &rule, new.sale.school_id, new.sale.brand_id).await?;

    let mut active = margin_calculation::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        invoice_line_ref: Set(new.invoice_line_ref),
        guardian_id: Set(new.sale.guardian_id),
        school_id: Set(new.sale.school_id),
        brand_id: Set(new.sale.brand_id),
        product_id: Set(new.sale.product_id),
        course_id: Set(new.sale.course_id),
        pack_id: Set(new.sale.pack_id),
        instructor_id: Set(new.sale.instructor_id),
        billing_year: Set(new.period.year),
        billing_month: Set(new.period.month_column()),
        status: Set(CalculationStatus::Draft),
        created_at: Set(Utc::now()),
        confirmed_at: Set(None),
        paid_at: Set(None),
        ..Default::default()
    };
    apply_result(&mut active, &result, snapshot);
    let model = active.insert(&txn).await?;

    add_to_summary(&txn, ctx, &model, 1).await?;
    txn.commit().await?;

    info!(
        calculation_id = model.id,
        invoice_line_ref = %model.invoice_line_ref,
        rule_id = rule.id,
        margin_pool = model.margin_pool,
        "Recorded margin calculation"
    );
    Ok(model)
}

/// Gets a margin calculation of the tenant, or `NotFound`.
pub async fn get_calculation<C>(
    db: &C,
    ctx: TenantContext,
    calculation_id: i64,
) -> Result<margin_calculation::Model>
where
    C: ConnectionTrait,
{
    MarginCalculation::find_by_id(calculation_id)
        .filter(margin_calculation::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("MarginCalculation", calculation_id))
}

async fn transition(
    db: &DatabaseConnection,
    ctx: TenantContext,
    calculation_id: i64,
    to: CalculationStatus,
) -> Result<margin_calculation::Model> {
    let txn = db.begin().await?;
    let calc = get_calculation(&txn, ctx, calculation_id).await?;

    let allowed = matches!(
        (calc.status, to),
        (CalculationStatus::Draft, CalculationStatus::Confirmed)
            | (CalculationStatus::Confirmed, CalculationStatus::Paid)
            | (CalculationStatus::Confirmed, CalculationStatus::Draft)
    );
    if !allowed {
        return Err(Error::InvalidStatusTransition {
            from: calc.status.to_string(),
            to: to.to_string(),
        });
    }

    let from = calc.status;
    let now = Utc::now();
    let mut active: margin_calculation::ActiveModel = calc.into();
    active.status = Set(to);
    match to {
        CalculationStatus::Confirmed => active.confirmed_at = Set(Some(now)),
        CalculationStatus::Paid => active.paid_at = Set(Some(now)),
        CalculationStatus::Draft => active.confirmed_at = Set(None),
    }
    let updated = active.update(&txn).await?;
    txn.commit().await?;

    info!(calculation_id, %from, %to, "Margin calculation status changed");
    Ok(updated)
}

/// draft -> confirmed
pub async fn confirm_calculation(
    db: &DatabaseConnection,
    ctx: TenantContext,
    calculation_id: i64,
) -> Result<margin_calculation::Model> {
    transition(db, ctx, calculation_id, CalculationStatus::Confirmed).await
}

/// confirmed -> paid
pub async fn mark_calculation_paid(
    db: &DatabaseConnection,
    ctx: TenantContext,
    calculation_id: i64,
) -> Result<margin_calculation::Model> {
    transition(db, ctx, calculation_id, CalculationStatus::Paid).await
}

/// confirmed -> draft, so the calculation is picked up again by [`recalculate_month`]
pub async fn reopen_calculation(
    db: &DatabaseConnection,
    ctx: TenantContext,
    calculation_id: i64,
) -> Result<margin_calculation::Model> {
    transition(db, ctx, calculation_id, CalculationStatus::Draft).await
}

/// One calculation the batch could not recompute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub calculation_id: i64,
    pub invoice_line_ref: String,
    pub guardian_id: Option<i64>,
    pub message: String,
}

/// Outcome of [`recalculate_month`]; `failures` holds at most the requested number of details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<BatchFailure>,
}

async fn recompute_draft(
    db: &DatabaseConnection,
    ctx: TenantContext,
    calculation_id: i64,
) -> Result<()> {
    let txn = db.begin().await?;
    let calc = get_calculation(&txn, ctx, calculation_id).await?;
    if calc.status != CalculationStatus::Draft {
        // confirmed while the batch was running
        return Ok(());
    }

    let sale = sale_of(&calc);
    let rule = resolve_margin_rule(&txn, ctx, &sale).await?;
    let result = calculate_margin(calc.sales_amount, calc.total_cost, &rule);
    let snapshot = capture_snapshot(&txn, ctx, &rule, sale.school_id, sale.brand_id).await?;

    let mut active: margin_calculation::ActiveModel = calc.clone().into();
    apply_result(&mut active, &result, snapshot);
    let updated = active.update(&txn).await?;
    add_to_summary(&txn, ctx, &calc, -1).await?;
    add_to_summary(&txn, ctx, &updated, 1).await?;
    txn.commit().await?;

    debug!(calculation_id, rule_id = rule.id, "Recomputed draft margin");
    Ok(())
}

/// All calculations of a billing month, oldest first.
pub async fn calculations_for_month<C>(
    db: &C,
    ctx: TenantContext,
    period: YearMonth,
) -> Result<Vec<margin_calculation::Model>>
where
    C: ConnectionTrait,
{
    MarginCalculation::find()
        .filter(margin_calculation::Column::TenantId.eq(ctx.tenant_id))
        .filter(margin_calculation::Column::BillingYear.eq(period.year))
        .filter(margin_calculation::Column::BillingMonth.eq(period.month_column()))
        .order_by_asc(margin_calculation::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Recomputes every draft calculation of a month against the current rules.
///
/// Each draft is recomputed in its own transaction together with the change to its monthly
/// summary. A draft that fails is logged and counted, and the batch moves on to the next one.
///
/// # Arguments
/// * `max_failure_details` - cap on the failure details kept in the outcome
///
/// # Errors
/// Only for failures outside a single draft, such as listing the month.
pub async fn recalculate_month(
    db: &DatabaseConnection,
    ctx: TenantContext,
    period: YearMonth,
    max_failure_details: usize,
) -> Result<BatchOutcome> {
    let drafts: Vec<_> = calculations_for_month(db, ctx, period)
        .await?
        .into_iter()
        .filter(|c| c.status == CalculationStatus::Draft)
        .collect();

    info!(%period, drafts = drafts.len(), "Recalculating margins");
    let mut outcome = BatchOutcome::default();

    for calc in drafts {
        match recompute_draft(db, ctx, calc.id).await {
            Ok(()) => outcome.succeeded += 1,
            Err(e) => {
                warn!(
                    calculation_id = calc.id,
                    invoice_line_ref = %calc.invoice_line_ref,
                    guardian_id = ?calc.guardian_id,
                    error = %e,
                    "Margin recalculation failed"
                );
                outcome.failed += 1;
                if outcome.failures.len() < max_failure_details {
                    outcome.failures.push(BatchFailure {
                        calculation_id: calc.id,
                        invoice_line_ref: calc.invoice_line_ref,
                        guardian_id: calc.guardian_id,
                        message: e.to_string(),
                    });
                }
            }
        }
    }

    info!(
        %period,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Margin recalculation finished"
    );
    Ok(outcome)
}

/// Monthly summaries of a month, ordered by school then brand.
pub async fn monthly_summaries<C>(
    db: &C,
    ctx: TenantContext,
    period: YearMonth,
) -> Result<Vec<monthly_margin_summary::Model>>
where
    C: ConnectionTrait,
{
    MonthlyMarginSummary::find()
        .filter(monthly_margin_summary::Column::TenantId.eq(ctx.tenant_id))
        .filter(monthly_margin_summary::Column::Year.eq(period.year))
        .filter(monthly_margin_summary::Column::Month.eq(period.month_column()))
        .order_by_asc(monthly_margin_summary::Column::SchoolId)
        .order_by_asc(monthly_margin_summary::Column::BrandId)
        .all(db)
        .await
        .map_err(Into::into)
}
