//! Fee resolution - concrete amounts for the fees a new enrollment or course change triggers.
//!
//! The enrollment fee is charged once per household and the welcome bag once per student.
//! Materials are charged with every enrollment at the enrollment month's stepped price.
//! Monthly-recurring lines (tuition, monthly fee, facility delta) can be prorated for members
//! joining mid-period, either by tickets or by remaining days. Each of them prefers the
//! enrollment-time product family and falls back to the regular product.
//! A fee that does not apply is left out of the breakdown and listed in `skipped` with the
//! reason; it never shows up as a zero-amount line.

use crate::{
    config::engine::FeeConfig,
    core::{
        catalog::{self, MonthlyPriceTable},
        household,
        types::{Offering, TenantContext, YearMonth, apply_rate, round_half_up},
    },
    entities::{ItemType, product},
    errors::{Error, Result},
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tracing::debug;

/// The fee lines the resolver can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeKind {
    EnrollmentFee,
    FacilityFee,
    MaterialsFee,
    WelcomeItem,
    TuitionProration,
    MonthlyFeeProration,
}

/// How monthly-recurring lines are prorated for a mid-period joiner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Proration {
    /// Full month; no tuition or monthly-fee lines are produced.
    #[default]
    None,
    /// `monthly / total_classes * additional`; `total_classes` falls back to the configured
    /// default (4). A product with a per-ticket price charges `per_ticket_price * additional`.
    Tickets {
        additional: u32,
        total_classes: Option<u32>,
    },
    /// Share of the month from the `as_of` date to month end, both days included.
    Days,
}

/// Input to [`resolve_fees`].
#[derive(Debug, Clone)]
pub struct FeeRequest {
    pub student_id: i64,
    pub guardian_id: i64,
    pub brand_id: i64,
    pub offering: Offering,
    /// Enrollment (or change) date; its month indexes the stepped price tables
    pub as_of: NaiveDate,
    pub proration: Proration,
}

/// One resolved fee.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeeLine {
    pub kind: FeeKind,
    pub product_id: i64,
    pub product_name: String,
    pub base_price: i64,
    pub calculated_price: i64,
    pub tax_rate: f64,
    pub explanation: String,
}

impl FeeLine {
    fn from_product(kind: FeeKind, product: &product::Model, amount: i64, explanation: String) -> Self {
        Self {
            kind,
            product_id: product.id,
            product_name: product.name.clone(),
            base_price: product.base_price,
            calculated_price: amount,
            tax_rate: product.tax_rate,
            explanation,
        }
    }

    /// Tax on the calculated price, half-up to a whole unit.
    #[must_use]
    pub fn tax_amount(&self) -> i64 {
        apply_rate(self.calculated_price, self.tax_rate)
    }
}

/// Why a fee was left out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum SkipReason {
    ProductNotFound,
    AlreadyPaid,
    AlreadyReceived,
    NotAboveCurrent { current: i64, candidate: i64 },
    NoAdditionalTickets,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkippedFee {
    pub kind: FeeKind,
    pub reason: SkipReason,
}

/// Result of [`resolve_fees`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct FeeBreakdown {
    pub enrollment_fee: Option<FeeLine>,
    pub facility_fee: Option<FeeLine>,
    pub materials_fee: Option<FeeLine>,
    pub welcome_item: Option<FeeLine>,
    pub tuition_proration: Option<FeeLine>,
    pub monthly_fee_proration: Option<FeeLine>,
    pub skipped: Vec<SkippedFee>,
}

impl FeeBreakdown {
    /// All charged lines in a stable order.
    #[must_use]
    pub fn lines(&self) -> Vec<&FeeLine> {
        [
            &self.enrollment_fee,
            &self.facility_fee,
            &self.materials_fee,
            &self.welcome_item,
            &self.tuition_proration,
            &self.monthly_fee_proration,
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Sum of the calculated prices, before tax.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.lines().iter().map(|line| line.calculated_price).sum()
    }

    /// Reason a fee kind was skipped, if it was.
    #[must_use]
    pub fn skip_reason(&self, kind: FeeKind) -> Option<SkipReason> {
        self.skipped
            .iter()
            .find(|s| s.kind == kind)
            .map(|s| s.reason)
    }

    fn skip(&mut self, kind: FeeKind, reason: SkipReason) {
        self.skipped.push(SkippedFee { kind, reason });
    }
}

/// Amount a new facility fee adds on top of what the student already pays, if anything.
#[must_use]
pub fn facility_delta(candidate: i64, current_max: i64) -> Option<i64> {
    (candidate > current_max).then(|| candidate - current_max)
}

/// `monthly / total_classes * additional`, half-up to a whole unit.
pub fn prorate_by_tickets(monthly: i64, total_classes: u32, additional: u32) -> Result<i64> {
    if total_classes == 0 {
        return Err(Error::InvalidAmount { amount: 0 });
    }
    // multiply first so the division is the only inexact step
    let amount =
        Decimal::from(monthly) * Decimal::from(additional) / Decimal::from(total_classes);
    Ok(round_half_up(amount))
}

/// `monthly * remaining_days / days_in_month`, counting `from` itself, half-up.
pub fn prorate_by_days(monthly: i64, from: NaiveDate) -> Result<i64> {
    let days_in_month = YearMonth::of(from).days_in_month()?;
    let remaining = days_in_month - from.day() + 1;
    let amount =
        Decimal::from(monthly) * Decimal::from(remaining) / Decimal::from(days_in_month);
    Ok(round_half_up(amount))
}

/// Enrollment-month price from the stepped table, or the base price when the slot is unset.
#[must_use]
pub fn enrollment_stepped_price(table: &MonthlyPriceTable, month: u32, base_price: i64) -> i64 {
    table.enrollment_price(month).unwrap_or(base_price)
}

/// Billing-month price from the stepped table, or the base price when the slot is unset.
#[must_use]
pub fn billing_stepped_price(table: &MonthlyPriceTable, month: u32, base_price: i64) -> i64 {
    table.billing_price(month).unwrap_or(base_price)
}

/// Applies the request's proration to a monthly amount.
///
/// `Ok(None)` means the proration leaves nothing to charge (zero additional tickets).
fn prorate(
    config: &FeeConfig,
    proration: Proration,
    monthly: i64,
    per_ticket_price: Option<i64>,
    as_of: NaiveDate,
) -> Result<Option<(i64, String)>> {
    match proration {
        Proration::None => Ok(Some((monthly, format!("{monthly} for the full month")))),
        Proration::Tickets { additional: 0, .. } => Ok(None),
        Proration::Tickets {
            additional,
            total_classes,
        } => {
            if let Some(unit) = per_ticket_price {
                let amount = unit
                    .checked_mul(i64::from(additional))
                    .ok_or(Error::InvalidAmount { amount: unit })?;
                return Ok(Some((amount, format!("{unit} per ticket x {additional} tickets"))));
            }
            let classes = total_classes.unwrap_or(config.default_classes_per_month);
            let amount = prorate_by_tickets(monthly, classes, additional)?;
            Ok(Some((
                amount,
                format!("{monthly} / {classes} classes x {additional} tickets"),
            )))
        }
        Proration::Days => {
            let amount = prorate_by_days(monthly, as_of)?;
            Ok(Some((amount, format!("{monthly} prorated from {as_of} to month end"))))
        }
    }
}

async fn resolve_product<C>(
    db: &C,
    ctx: TenantContext,
    config: &FeeConfig,
    request: &FeeRequest,
    item_type: ItemType,
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    catalog::resolve_offering_product(
        db,
        ctx,
        request.brand_id,
        request.offering,
        item_type,
        &config.enrollment_code_suffixes,
    )
    .await
}

/// The enrollment-time product when one exists, otherwise the regular product.
async fn resolve_enrollment_product<C>(
    db: &C,
    ctx: TenantContext,
    config: &FeeConfig,
    request: &FeeRequest,
    enrollment_type: ItemType,
    regular_type: ItemType,
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    match resolve_product(db, ctx, config, request, enrollment_type).await? {
        Some(product) => Ok(Some(product)),
        None => resolve_product(db, ctx, config, request, regular_type).await,
    }
}

/// Resolves every candidate fee for a student joining or changing to an offering.
///
/// # Errors
/// `NotFound` when the student, guardian, course or pack does not exist in the tenant, or the
/// student is not in the guardian's household. Missing products are never errors.
pub async fn resolve_fees<C>(
    db: &C,
    ctx: TenantContext,
    config: &FeeConfig,
    request: &FeeRequest,
) -> Result<FeeBreakdown>
where
    C: ConnectionTrait,
{
    household::get_guardian(db, ctx, request.guardian_id).await?;
    let student = household::get_student(db, ctx, request.student_id).await?;
    if student.guardian_id != request.guardian_id {
        return Err(Error::NotFound {
            entity: "Student in household",
            id: format!("{}/{}", request.guardian_id, request.student_id),
        });
    }

    let month = request.as_of.month();
    let paid_enrollment = household::has_paid_enrollment_fee(db, ctx, request.guardian_id).await?;
    let received_welcome =
        household::has_received_welcome_item(db, ctx, request.student_id).await?;
    let mut breakdown = FeeBreakdown::default();

    // Enrollment fee: once per household
    match resolve_product(db, ctx, config, request, ItemType::Enrollment).await? {
        None => breakdown.skip(FeeKind::EnrollmentFee, SkipReason::ProductNotFound),
        Some(_) if paid_enrollment => {
            breakdown.skip(FeeKind::EnrollmentFee, SkipReason::AlreadyPaid);
        }
        Some(product) => {
            breakdown.enrollment_fee = Some(FeeLine::from_product(
                FeeKind::EnrollmentFee,
                &product,
                product.base_price,
                "Enrollment fee, first enrollment in household".to_string(),
            ));
        }
    }

    // Facility fee: only the amount above what the student already pays
    let facility = resolve_enrollment_product(
        db,
        ctx,
        config,
        request,
        ItemType::EnrollmentFacility,
        ItemType::Facility,
    )
    .await?;
    match facility {
        None => breakdown.skip(FeeKind::FacilityFee, SkipReason::ProductNotFound),
        Some(product) => {
            let current =
                household::highest_current_facility_fee(db, ctx, request.student_id).await?;
            match facility_delta(product.base_price, current) {
                None => breakdown.skip(
                    FeeKind::FacilityFee,
                    SkipReason::NotAboveCurrent {
                        current,
                        candidate: product.base_price,
                    },
                ),
                Some(delta) => match prorate(config, request.proration, delta, None, request.as_of)? {
                    None => breakdown.skip(FeeKind::FacilityFee, SkipReason::NoAdditionalTickets),
                    Some((amount, how)) => {
                        breakdown.facility_fee = Some(FeeLine::from_product(
                            FeeKind::FacilityFee,
                            &product,
                            amount,
                            format!(
                                "Facility fee delta {} - current {current}; {how}",
                                product.base_price
                            ),
                        ));
                    }
                },
            }
        }
    }

    // Materials: enrollment-time textbook, stepped by enrollment month
    let materials = resolve_enrollment_product(
        db,
        ctx,
        config,
        request,
        ItemType::EnrollmentTextbook,
        ItemType::Textbook,
    )
    .await?;
    match materials {
        None => breakdown.skip(FeeKind::MaterialsFee, SkipReason::ProductNotFound),
        Some(product) => {
            let table = catalog::monthly_prices(db, product.id).await?;
            let amount = enrollment_stepped_price(&table, month, product.base_price);
            breakdown.materials_fee = Some(FeeLine::from_product(
                FeeKind::MaterialsFee,
                &product,
                amount,
                format!("Materials fee for enrollment in month {month}"),
            ));
        }
    }

    // Welcome bag: once per student
    match resolve_product(db, ctx, config, request, ItemType::Bag).await? {
        None => breakdown.skip(FeeKind::WelcomeItem, SkipReason::ProductNotFound),
        Some(_) if received_welcome => {
            breakdown.skip(FeeKind::WelcomeItem, SkipReason::AlreadyReceived);
        }
        Some(product) => {
            breakdown.welcome_item = Some(FeeLine::from_product(
                FeeKind::WelcomeItem,
                &product,
                product.base_price,
                "Welcome item, first contract of student".to_string(),
            ));
        }
    }

    // Mid-period tuition and monthly fee
    if request.proration != Proration::None {
        for (kind, enrollment_type, regular_type) in [
            (
                FeeKind::TuitionProration,
                ItemType::EnrollmentTuition,
                ItemType::Tuition,
            ),
            (
                FeeKind::MonthlyFeeProration,
                ItemType::EnrollmentMonthlyFee,
                ItemType::MonthlyFee,
            ),
        ] {
            let product =
                resolve_enrollment_product(db, ctx, config, request, enrollment_type, regular_type)
                    .await?;
            let Some(product) = product else {
                breakdown.skip(kind, SkipReason::ProductNotFound);
                continue;
            };
            let table = catalog::monthly_prices(db, product.id).await?;
            let monthly = billing_stepped_price(&table, month, product.base_price);
            let proration = prorate(
                config,
                request.proration,
                monthly,
                product.per_ticket_price,
                request.as_of,
            )?;
            let line = proration.map(
                |(amount, how)| FeeLine::from_product(kind, &product, amount, how),
            );
            match (kind, line) {
                (_, None) => breakdown.skip(kind, SkipReason::NoAdditionalTickets),
                (FeeKind::TuitionProration, line) => breakdown.tuition_proration = line,
                (_, line) => breakdown.monthly_fee_proration = line,
            }
        }
    }

    debug!(
        student_id = request.student_id,
        lines = breakdown.lines().len(),
        skipped = breakdown.skipped.len(),
        total = breakdown.total(),
        "Resolved fees"
    );
    Ok(breakdown)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::ContractStatus;
    use crate::test_utils::*;
    use sea_orm::{ActiveModelTrait, Set};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn request(fx: &CatalogFixture, family: &Family, proration: Proration) -> FeeRequest {
        FeeRequest {
            student_id: family.students[0].id,
            guardian_id: family.guardian.id,
            brand_id: fx.brand.id,
            offering: Offering::Course(fx.course.id),
            as_of: date(2025, 4, 10),
            proration,
        }
    }

    #[test]
    fn test_facility_delta_scenarios() {
        assert_eq!(facility_delta(2_500, 3_000), None);
        assert_eq!(facility_delta(3_000, 3_000), None);
        assert_eq!(facility_delta(5_000, 3_000), Some(2_000));
        assert_eq!(facility_delta(5_000, 0), Some(5_000));
    }

    #[test]
    fn test_prorate_by_tickets_rounds_half_up() {
        assert_eq!(prorate_by_tickets(12_000, 4, 1).unwrap(), 3_000);
        assert_eq!(prorate_by_tickets(10_000, 3, 2).unwrap(), 6_667);
        assert_eq!(prorate_by_tickets(10_000, 3, 1).unwrap(), 3_333);
        // 5 / 2 = 2.5 -> 3
        assert_eq!(prorate_by_tickets(5, 2, 1).unwrap(), 3);
        assert!(prorate_by_tickets(5, 0, 1).is_err());
    }

    #[test]
    fn test_prorate_by_days() {
        // 21 of 30 days left in April from the 10th
        assert_eq!(prorate_by_days(9_000, date(2025, 4, 10)).unwrap(), 6_300);
        assert_eq!(prorate_by_days(9_000, date(2025, 4, 1)).unwrap(), 9_000);
        assert_eq!(prorate_by_days(2_800, date(2025, 2, 28)).unwrap(), 100);
    }

    #[test]
    fn test_stepped_price_falls_back_to_base() {
        let table = MonthlyPriceTable::default();
        assert_eq!(enrollment_stepped_price(&table, 4, 1_000), 1_000);
        assert_eq!(billing_stepped_price(&table, 4, 8_000), 8_000);
    }

    #[tokio::test]
    async fn test_new_household_gets_all_one_time_fees() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Sato", &["Aoi"]).await?;
        create_product(&db, fx.brand.id, "ENROLL", ItemType::Enrollment, 10_000).await?;
        create_product(&db, fx.brand.id, "BAG", ItemType::Bag, 1_500).await?;
        let facility = create_product(&db, fx.brand.id, "FAC", ItemType::Facility, 3_000).await?;
        link_course_item(&db, fx.course.id, facility.id, 1).await?;

        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, Proration::None))
                .await?;

        assert_eq!(breakdown.enrollment_fee.as_ref().unwrap().calculated_price, 10_000);
        assert_eq!(breakdown.welcome_item.as_ref().unwrap().calculated_price, 1_500);
        assert_eq!(breakdown.facility_fee.as_ref().unwrap().calculated_price, 3_000);
        assert_eq!(
            breakdown.skip_reason(FeeKind::MaterialsFee),
            Some(SkipReason::ProductNotFound)
        );
        assert!(breakdown.tuition_proration.is_none());
        assert_eq!(breakdown.total(), 14_500);

        Ok(())
    }

    #[tokio::test]
    async fn test_enrollment_fee_not_charged_twice() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Ito", &["Mei", "Sora"]).await?;
        create_product(&db, fx.brand.id, "ENROLL", ItemType::Enrollment, 10_000).await?;
        let config = FeeConfig::default();

        let first = resolve_fees(&db, TENANT, &config, &request(&fx, &family, Proration::None)).await?;
        assert!(first.enrollment_fee.is_some());

        // the caller bills the first breakdown; the household now has a contract
        create_contract(&db, &fx, family.students[0].id, family.guardian.id, ContractStatus::Active)
            .await?;

        let mut sibling = request(&fx, &family, Proration::None);
        sibling.student_id = family.students[1].id;
        let second = resolve_fees(&db, TENANT, &config, &sibling).await?;
        assert!(second.enrollment_fee.is_none());
        assert_eq!(
            second.skip_reason(FeeKind::EnrollmentFee),
            Some(SkipReason::AlreadyPaid)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_facility_fee_below_current_is_omitted() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Mori", &["Ema"]).await?;
        create_product(&db, fx.brand.id, "FAC", ItemType::Facility, 2_500).await?;
        create_charge(&db, family.students[0].id, ItemType::Facility, 3_000, true).await?;

        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, Proration::None))
                .await?;

        assert!(breakdown.facility_fee.is_none());
        assert_eq!(
            breakdown.skip_reason(FeeKind::FacilityFee),
            Some(SkipReason::NotAboveCurrent {
                current: 3_000,
                candidate: 2_500
            })
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_facility_fee_charges_only_delta() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Abe", &["Nao"]).await?;
        create_product(&db, fx.brand.id, "FAC", ItemType::Facility, 5_000).await?;
        create_charge(&db, family.students[0].id, ItemType::Facility, 3_000, true).await?;

        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, Proration::None))
                .await?;

        let line = breakdown.facility_fee.unwrap();
        assert_eq!(line.base_price, 5_000);
        assert_eq!(line.calculated_price, 2_000);

        Ok(())
    }

    #[tokio::test]
    async fn test_materials_fee_uses_enrollment_month_slot() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Kato", &["Rin"]).await?;
        let textbook = create_product(
            &db,
            fx.brand.id,
            &format!("{}_1", fx.course.code),
            ItemType::EnrollmentTextbook,
            4_000,
        )
        .await?;
        set_month_price(&db, textbook.id, 4, None, Some(3_200)).await?;

        let config = FeeConfig::default();
        let april = resolve_fees(&db, TENANT, &config, &request(&fx, &family, Proration::None)).await?;
        assert_eq!(april.materials_fee.unwrap().calculated_price, 3_200);

        let mut may = request(&fx, &family, Proration::None);
        may.as_of = date(2025, 5, 2);
        let may = resolve_fees(&db, TENANT, &config, &may).await?;
        assert_eq!(may.materials_fee.unwrap().calculated_price, 4_000);

        Ok(())
    }

    #[tokio::test]
    async fn test_ticket_proration_for_mid_period_joiner() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Tanaka", &["Yui"]).await?;
        let tuition = create_product(&db, fx.brand.id, "TU", ItemType::Tuition, 12_000).await?;
        link_course_item(&db, fx.course.id, tuition.id, 1).await?;
        set_month_price(&db, tuition.id, 4, Some(10_000), None).await?;
        create_product(&db, fx.brand.id, "MF", ItemType::MonthlyFee, 1_000).await?;

        let proration = Proration::Tickets {
            additional: 2,
            total_classes: None,
        };
        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, proration))
                .await?;

        // April slot 10,000 / default 4 classes x 2
        assert_eq!(breakdown.tuition_proration.unwrap().calculated_price, 5_000);
        assert_eq!(breakdown.monthly_fee_proration.unwrap().calculated_price, 500);

        Ok(())
    }

    #[tokio::test]
    async fn test_enrollment_tuition_resolved_by_course_code() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Ueda", &["Kai"]).await?;
        create_product(&db, fx.brand.id, "ENG01_1", ItemType::EnrollmentTuition, 12_000).await?;

        let proration = Proration::Tickets {
            additional: 2,
            total_classes: None,
        };
        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, proration))
                .await?;

        let line = breakdown.tuition_proration.as_ref().unwrap();
        assert_eq!(line.calculated_price, 6_000);
        assert_eq!(line.product_name, "ENG01_1");
        assert_eq!(breakdown.skip_reason(FeeKind::TuitionProration), None);

        Ok(())
    }

    #[tokio::test]
    async fn test_enrollment_time_products_win_over_regular() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Ogawa", &["Sho"]).await?;
        create_product(&db, fx.brand.id, "TU", ItemType::Tuition, 8_000).await?;
        create_product(&db, fx.brand.id, "ENG01", ItemType::EnrollmentTuition, 12_000).await?;
        create_product(&db, fx.brand.id, "MF", ItemType::MonthlyFee, 1_000).await?;
        create_product(&db, fx.brand.id, "ENG01_2", ItemType::EnrollmentMonthlyFee, 2_000)
            .await?;
        create_product(&db, fx.brand.id, "FAC", ItemType::Facility, 3_000).await?;
        create_product(&db, fx.brand.id, "ENG01_1", ItemType::EnrollmentFacility, 4_000).await?;

        let proration = Proration::Tickets {
            additional: 1,
            total_classes: Some(4),
        };
        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, proration))
                .await?;

        assert_eq!(breakdown.tuition_proration.unwrap().calculated_price, 3_000);
        assert_eq!(breakdown.monthly_fee_proration.unwrap().calculated_price, 500);
        assert_eq!(breakdown.facility_fee.unwrap().calculated_price, 1_000);

        Ok(())
    }

    #[tokio::test]
    async fn test_day_proration_for_mid_period_joiner() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Hayashi", &["Riku"]).await?;
        create_product(&db, fx.brand.id, "TU", ItemType::Tuition, 9_000).await?;

        // joins on April 10th: 21 of 30 days
        let breakdown = resolve_fees(
            &db,
            TENANT,
            &FeeConfig::default(),
            &request(&fx, &family, Proration::Days),
        )
        .await?;

        assert_eq!(breakdown.tuition_proration.as_ref().unwrap().calculated_price, 6_300);
        assert_eq!(
            breakdown.skip_reason(FeeKind::MonthlyFeeProration),
            Some(SkipReason::ProductNotFound)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_facility_delta_prorated_by_tickets() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Ishii", &["Ren"]).await?;
        create_product(&db, fx.brand.id, "FAC", ItemType::Facility, 5_000).await?;
        create_charge(&db, family.students[0].id, ItemType::Facility, 3_000, true).await?;

        let proration = Proration::Tickets {
            additional: 2,
            total_classes: None,
        };
        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, proration))
                .await?;

        // delta 2,000 / 4 classes x 2
        let line = breakdown.facility_fee.unwrap();
        assert_eq!(line.base_price, 5_000);
        assert_eq!(line.calculated_price, 1_000);

        Ok(())
    }

    #[tokio::test]
    async fn test_per_ticket_price_overrides_monthly_share() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Noguchi", &["Tomo"]).await?;
        let tuition = create_product(&db, fx.brand.id, "TU", ItemType::Tuition, 12_000).await?;
        let mut active: product::ActiveModel = tuition.into();
        active.per_ticket_price = Set(Some(2_500));
        active.update(&db).await?;

        let proration = Proration::Tickets {
            additional: 2,
            total_classes: None,
        };
        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, proration))
                .await?;
        assert_eq!(breakdown.tuition_proration.unwrap().calculated_price, 5_000);

        // day proration ignores the per-ticket price
        let by_days = resolve_fees(
            &db,
            TENANT,
            &FeeConfig::default(),
            &request(&fx, &family, Proration::Days),
        )
        .await?;
        assert_eq!(by_days.tuition_proration.unwrap().calculated_price, 8_400);

        Ok(())
    }

    #[tokio::test]
    async fn test_materials_charged_again_for_sibling() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Endo", &["Yuna", "Taku"]).await?;
        create_product(&db, fx.brand.id, "ENG01_1", ItemType::EnrollmentTextbook, 4_000).await?;
        let config = FeeConfig::default();

        let first = resolve_fees(&db, TENANT, &config, &request(&fx, &family, Proration::None)).await?;
        assert_eq!(first.materials_fee.unwrap().calculated_price, 4_000);

        create_contract(&db, &fx, family.students[0].id, family.guardian.id, ContractStatus::Active)
            .await?;
        create_charge(&db, family.students[0].id, ItemType::EnrollmentTextbook, 4_000, true)
            .await?;

        let mut sibling = request(&fx, &family, Proration::None);
        sibling.student_id = family.students[1].id;
        let second = resolve_fees(&db, TENANT, &config, &sibling).await?;
        assert_eq!(second.materials_fee.as_ref().unwrap().calculated_price, 4_000);
        assert_eq!(second.skip_reason(FeeKind::MaterialsFee), None);

        Ok(())
    }

    #[tokio::test]
    async fn test_zero_tickets_skips_prorated_lines() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Mori", &["Ema"]).await?;
        create_product(&db, fx.brand.id, "TU", ItemType::Tuition, 12_000).await?;

        let proration = Proration::Tickets {
            additional: 0,
            total_classes: Some(4),
        };
        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, proration))
                .await?;

        assert!(breakdown.tuition_proration.is_none());
        assert_eq!(
            breakdown.skip_reason(FeeKind::TuitionProration),
            Some(SkipReason::NoAdditionalTickets)
        );
        assert_eq!(
            breakdown.skip_reason(FeeKind::MonthlyFeeProration),
            Some(SkipReason::ProductNotFound)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_welcome_item_skipped_for_returning_student() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Suzuki", &["Haru"]).await?;
        create_product(&db, fx.brand.id, "BAG", ItemType::Bag, 1_500).await?;
        create_charge(&db, family.students[0].id, ItemType::Bag, 1_500, false).await?;

        let breakdown =
            resolve_fees(&db, TENANT, &FeeConfig::default(), &request(&fx, &family, Proration::None))
                .await?;

        assert!(breakdown.welcome_item.is_none());
        assert_eq!(
            breakdown.skip_reason(FeeKind::WelcomeItem),
            Some(SkipReason::AlreadyReceived)
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_student_outside_household_rejected() -> Result<()> {
        let (db, fx) = setup_catalog().await?;
        let family = create_family(&db, "Sato", &["Aoi"]).await?;
        let other = create_family(&db, "Ito", &["Mei"]).await?;

        let mut req = request(&fx, &family, Proration::None);
        req.student_id = other.students[0].id;
        let result = resolve_fees(&db, TENANT, &FeeConfig::default(), &req).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));

        Ok(())
    }

    #[test]
    fn test_fee_line_tax_amount() {
        let line = FeeLine {
            kind: FeeKind::EnrollmentFee,
            product_id: 1,
            product_name: "Enrollment".to_string(),
            base_price: 10_005,
            calculated_price: 10_005,
            tax_rate: 0.1,
            explanation: String::new(),
        };
        // 1000.5 -> 1001
        assert_eq!(line.tax_amount(), 1_001);
    }
}
