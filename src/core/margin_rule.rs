//! Margin rules - storage, write-time validation and resolution for a sale.
//!
//! Resolution order, first match wins: instructor, product, pack, course, default.
//! Within one target kind the highest `priority` wins, then the lowest id.

use crate::{
    core::types::TenantContext,
    entities::{CalculationType, FixedMarginTarget, MarginRule as MarginRuleEntity, RuleTargetKind, margin_rule},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use tracing::{debug, info};

/// Allowed drift of `school + brand` distribution rates away from 1.
const RATE_SUM_TOLERANCE: f64 = 1e-4;

/// What a rule applies to. Exactly one reference, matching the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum RuleTarget {
    Default,
    Product(i64),
    Course(i64),
    Pack(i64),
    Instructor(i64),
}

impl RuleTarget {
    #[must_use]
    pub const fn kind(self) -> RuleTargetKind {
        match self {
            Self::Default => RuleTargetKind::Default,
            Self::Product(_) => RuleTargetKind::Product,
            Self::Course(_) => RuleTargetKind::Course,
            Self::Pack(_) => RuleTargetKind::Pack,
            Self::Instructor(_) => RuleTargetKind::Instructor,
        }
    }

    /// Builds the target from the stored kind and reference columns.
    ///
    /// Fails when the reference for the kind is missing or another kind's reference is set.
    fn from_model(model: &margin_rule::Model) -> Result<Self> {
        let refs = [
            ("product_id", RuleTargetKind::Product, model.product_id),
            ("course_id", RuleTargetKind::Course, model.course_id),
            ("pack_id", RuleTargetKind::Pack, model.pack_id),
            ("instructor_id", RuleTargetKind::Instructor, model.instructor_id),
        ];

        for (field, kind, value) in refs {
            if kind != model.rule_target && value.is_some() {
                return Err(Error::configuration(
                    field,
                    format!("set on a {:?} rule", model.rule_target),
                ));
            }
        }

        let required = |field: &str, value: Option<i64>| {
            value.ok_or_else(|| {
                Error::configuration(field, format!("required for a {:?} rule", model.rule_target))
            })
        };

        Ok(match model.rule_target {
            RuleTargetKind::Default => Self::Default,
            RuleTargetKind::Product => Self::Product(required("product_id", model.product_id)?),
            RuleTargetKind::Course => Self::Course(required("course_id", model.course_id)?),
            RuleTargetKind::Pack => Self::Pack(required("pack_id", model.pack_id)?),
            RuleTargetKind::Instructor => {
                Self::Instructor(required("instructor_id", model.instructor_id)?)
            }
        })
    }

    /// Reference columns in storage order: product, course, pack, instructor.
    const fn columns(self) -> [Option<i64>; 4] {
        match self {
            Self::Default => [None, None, None, None],
            Self::Product(id) => [Some(id), None, None, None],
            Self::Course(id) => [None, Some(id), None, None],
            Self::Pack(id) => [None, None, Some(id), None],
            Self::Instructor(id) => [None, None, None, Some(id)],
        }
    }
}

/// A validated margin rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarginRule {
    pub id: i64,
    pub name: String,
    pub target: RuleTarget,
    pub calculation_type: CalculationType,
    pub margin_rate: f64,
    pub fixed_margin_amount: i64,
    pub fixed_margin_target: FixedMarginTarget,
    pub school_distribution_rate: f64,
    pub brand_distribution_rate: f64,
    pub priority: i32,
}

impl TryFrom<margin_rule::Model> for MarginRule {
    type Error = Error;

    fn try_from(model: margin_rule::Model) -> Result<Self> {
        let target = RuleTarget::from_model(&model)?;
        validate_amounts(
            model.margin_rate,
            model.fixed_margin_amount,
            model.school_distribution_rate,
            model.brand_distribution_rate,
        )?;

        Ok(Self {
            id: model.id,
            name: model.name,
            target,
            calculation_type: model.calculation_type,
            margin_rate: model.margin_rate,
            fixed_margin_amount: model.fixed_margin_amount,
            fixed_margin_target: model.fixed_margin_target,
            school_distribution_rate: model.school_distribution_rate,
            brand_distribution_rate: model.brand_distribution_rate,
            priority: model.priority,
        })
    }
}

fn validate_amounts(
    margin_rate: f64,
    fixed_margin_amount: i64,
    school_rate: f64,
    brand_rate: f64,
) -> Result<()> {
    if !(0.0..=1.0).contains(&margin_rate) {
        return Err(Error::configuration(
            "margin_rate",
            format!("{margin_rate} is outside 0..=1"),
        ));
    }
    if fixed_margin_amount < 0 {
        return Err(Error::configuration(
            "fixed_margin_amount",
            format!("{fixed_margin_amount} is negative"),
        ));
    }
    if !(0.0..=1.0).contains(&school_rate) {
        return Err(Error::configuration(
            "school_distribution_rate",
            format!("{school_rate} is outside 0..=1"),
        ));
    }
    if !(0.0..=1.0).contains(&brand_rate) {
        return Err(Error::configuration(
            "brand_distribution_rate",
            format!("{brand_rate} is outside 0..=1"),
        ));
    }
    if (school_rate + brand_rate - 1.0).abs() > RATE_SUM_TOLERANCE {
        return Err(Error::configuration(
            "school_distribution_rate",
            format!("school {school_rate} + brand {brand_rate} must sum to 1"),
        ));
    }
    Ok(())
}

/// Input to [`create_margin_rule`].
#[derive(Debug, Clone)]
pub struct NewMarginRule {
    pub name: String,
    pub target: RuleTarget,
    pub calculation_type: CalculationType,
    pub margin_rate: f64,
    pub fixed_margin_amount: i64,
    pub fixed_margin_target: FixedMarginTarget,
    pub school_distribution_rate: f64,
    pub brand_distribution_rate: f64,
    pub priority: i32,
}

/// Validates and stores a new margin rule.
///
/// # Errors
/// `Configuration` naming the offending field when the rule is invalid; nothing is written.
pub async fn create_margin_rule<C>(db: &C, ctx: TenantContext, rule: NewMarginRule) -> Result<MarginRule>
where
    C: ConnectionTrait,
{
    if rule.name.trim().is_empty() {
        return Err(Error::configuration("name", "must not be empty"));
    }
    validate_amounts(
        rule.margin_rate,
        rule.fixed_margin_amount,
        rule.school_distribution_rate,
        rule.brand_distribution_rate,
    )?;

    let now = Utc::now();
    let [product_id, course_id, pack_id, instructor_id] = rule.target.columns();
    let model = margin_rule::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        name: Set(rule.name),
        rule_target: Set(rule.target.kind()),
        product_id: Set(product_id),
        course_id: Set(course_id),
        pack_id: Set(pack_id),
        instructor_id: Set(instructor_id),
        calculation_type: Set(rule.calculation_type),
        margin_rate: Set(rule.margin_rate),
        fixed_margin_amount: Set(rule.fixed_margin_amount),
        fixed_margin_target: Set(rule.fixed_margin_target),
        school_distribution_rate: Set(rule.school_distribution_rate),
        brand_distribution_rate: Set(rule.brand_distribution_rate),
        priority: Set(rule.priority),
        is_active: Set(true),
        is_deleted: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(rule_id = model.id, name = %model.name, target = ?rule.target, "Created margin rule");
    MarginRule::try_from(model)
}

/// Soft-deletes a rule; it is no longer considered by [`resolve_margin_rule`].
pub async fn delete_margin_rule<C>(db: &C, ctx: TenantContext, rule_id: i64) -> Result<()>
where
    C: ConnectionTrait,
{
    let model = MarginRuleEntity::find_by_id(rule_id)
        .filter(margin_rule::Column::TenantId.eq(ctx.tenant_id))
        .filter(margin_rule::Column::IsDeleted.eq(false))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("MarginRule", rule_id))?;

    let mut active: margin_rule::ActiveModel = model.into();
    active.is_deleted = Set(true);
    active.updated_at = Set(Utc::now());
    active.update(db).await?;

    info!(rule_id, "Deleted margin rule");
    Ok(())
}

/// What was sold, as seen by margin rule resolution and calculation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SaleContext {
    pub product_id: Option<i64>,
    pub course_id: Option<i64>,
    pub pack_id: Option<i64>,
    pub instructor_id: Option<i64>,
    pub school_id: i64,
    pub brand_id: i64,
    pub guardian_id: Option<i64>,
}

/// Best live rule of one kind, optionally matching a reference column.
async fn best_rule<C>(
    db: &C,
    ctx: TenantContext,
    kind: RuleTargetKind,
    reference: Option<(margin_rule::Column, i64)>,
) -> Result<Option<margin_rule::Model>>
where
    C: ConnectionTrait,
{
    let mut query = MarginRuleEntity::find()
        .filter(margin_rule::Column::TenantId.eq(ctx.tenant_id))
        .filter(margin_rule::Column::IsActive.eq(true))
        .filter(margin_rule::Column::IsDeleted.eq(false))
        .filter(margin_rule::Column::RuleTarget.eq(kind));
    if let Some((column, id)) = reference {
        query = query.filter(column.eq(id));
    }

    query
        .order_by_desc(margin_rule::Column::Priority)
        .order_by_asc(margin_rule::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Resolves the margin rule for a sale.
///
/// Call it with the transaction that will store the calculation so the rule read is
/// consistent with the write.
///
/// # Errors
/// `NotFound` when not even a default rule exists, `Configuration` when the matched row is
/// invalid.
pub async fn resolve_margin_rule<C>(db: &C, ctx: TenantContext, sale: &SaleContext) -> Result<MarginRule>
where
    C: ConnectionTrait,
{
    let candidates = [
        (RuleTargetKind::Instructor, margin_rule::Column::InstructorId, sale.instructor_id),
        (RuleTargetKind::Product, margin_rule::Column::ProductId, sale.product_id),
        (RuleTargetKind::Pack, margin_rule::Column::PackId, sale.pack_id),
        (RuleTargetKind::Course, margin_rule::Column::CourseId, sale.course_id),
    ];

    for (kind, column, id) in candidates {
        let Some(id) = id else { continue };
        if let Some(model) = best_rule(db, ctx, kind, Some((column, id))).await? {
            debug!(rule_id = model.id, ?kind, "Resolved margin rule");
            return MarginRule::try_from(model);
        }
    }

    let model = best_rule(db, ctx, RuleTargetKind::Default, None)
        .await?
        .ok_or_else(|| Error::NotFound {
            entity: "MarginRule",
            id: format!("default for tenant {}", ctx.tenant_id),
        })?;
    debug!(rule_id = model.id, "Resolved default margin rule");
    MarginRule::try_from(model)
}
