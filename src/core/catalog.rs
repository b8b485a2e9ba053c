//! Catalog lookup - finds the fee-bearing product for a brand, course or pack.
//!
//! Course-linked items win over brand-level products. Enrollment-time product families
//! are matched by code first: `{course_code}_{suffix}` for each configured suffix, then the
//! bare course code. A missing product is `Ok(None)`; callers treat it as "fee not
//! applicable".

use crate::{
    core::types::{Offering, TenantContext},
    entities::{
        Course, CourseItem, ItemType, Pack, PackCourse, Product, ProductMonthPrice, course,
        course_item, pack, pack_course, product, product_month_price,
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, prelude::*};
use tracing::{debug, warn};

/// 12-slot month-indexed price tables of one product.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MonthlyPriceTable {
    billing: [Option<i64>; 12],
    enrollment: [Option<i64>; 12],
}

impl MonthlyPriceTable {
    /// Builds the table from stored slots. Rows outside 1..=12 are ignored.
    #[must_use]
    pub fn from_rows(rows: &[product_month_price::Model]) -> Self {
        let mut table = Self::default();
        for row in rows {
            let Some(index) = Self::slot(row.month) else {
                warn!(
                    product_id = row.product_id,
                    month = row.month,
                    "Ignoring month price outside 1..=12"
                );
                continue;
            };
            table.billing[index] = row.billing_price;
            table.enrollment[index] = row.enrollment_price;
        }
        table
    }

    fn slot(month: i32) -> Option<usize> {
        usize::try_from(month)
            .ok()
            .filter(|m| (1..=12).contains(m))
            .map(|m| m - 1)
    }

    /// Price for existing members billed in `month` (1-based), if that slot is set.
    #[must_use]
    pub fn billing_price(&self, month: u32) -> Option<i64> {
        i32::try_from(month)
            .ok()
            .and_then(Self::slot)
            .and_then(|i| self.billing[i])
    }

    /// Price for members who join in `month` (1-based), if that slot is set.
    #[must_use]
    pub fn enrollment_price(&self, month: u32) -> Option<i64> {
        i32::try_from(month)
            .ok()
            .and_then(Self::slot)
            .and_then(|i| self.enrollment[i])
    }
}

/// Loads the month-stepped price tables of a product.
pub async fn monthly_prices<C>(db: &C, product_id: i64) -> Result<MonthlyPriceTable>
where
    C: ConnectionTrait,
{
    let rows = ProductMonthPrice::find()
        .filter(product_month_price::Column::ProductId.eq(product_id))
        .all(db)
        .await?;
    Ok(MonthlyPriceTable::from_rows(&rows))
}

/// Gets a course of the tenant, or `NotFound`.
pub async fn get_course<C>(db: &C, ctx: TenantContext, course_id: i64) -> Result<course::Model>
where
    C: ConnectionTrait,
{
    Course::find_by_id(course_id)
        .filter(course::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Course", course_id))
}

/// Gets a pack of the tenant, or `NotFound`.
pub async fn get_pack<C>(db: &C, ctx: TenantContext, pack_id: i64) -> Result<pack::Model>
where
    C: ConnectionTrait,
{
    Pack::find_by_id(pack_id)
        .filter(pack::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Pack", pack_id))
}

/// Courses making up an offering, in pack order for packs.
pub async fn courses_for_offering<C>(
    db: &C,
    ctx: TenantContext,
    offering: Offering,
) -> Result<Vec<course::Model>>
where
    C: ConnectionTrait,
{
    match offering {
        Offering::Course(course_id) => Ok(vec![get_course(db, ctx, course_id).await?]),
        Offering::Pack(pack_id) => {
            get_pack(db, ctx, pack_id).await?;
            let links = PackCourse::find()
                .filter(pack_course::Column::TenantId.eq(ctx.tenant_id))
                .filter(pack_course::Column::PackId.eq(pack_id))
                .order_by_asc(pack_course::Column::SortOrder)
                .all(db)
                .await?;

            let mut courses = Vec::with_capacity(links.len());
            for link in links {
                courses.push(get_course(db, ctx, link.course_id).await?);
            }
            Ok(courses)
        }
    }
}

/// Active products linked to a course, in course-item order.
pub async fn course_products<C>(
    db: &C,
    ctx: TenantContext,
    course_id: i64,
) -> Result<Vec<product::Model>>
where
    C: ConnectionTrait,
{
    let items = CourseItem::find()
        .filter(course_item::Column::TenantId.eq(ctx.tenant_id))
        .filter(course_item::Column::CourseId.eq(course_id))
        .filter(course_item::Column::IsActive.eq(true))
        .order_by_asc(course_item::Column::SortOrder)
        .all(db)
        .await?;
    if items.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = items.iter().map(|item| item.product_id).collect();
    let products = Product::find()
        .filter(product::Column::TenantId.eq(ctx.tenant_id))
        .filter(product::Column::Id.is_in(ids))
        .filter(product::Column::IsActive.eq(true))
        .all(db)
        .await?;

    // keep course-item order, not storage order
    Ok(items
        .iter()
        .filter_map(|item| products.iter().find(|p| p.id == item.product_id).cloned())
        .collect())
}

/// First active course-linked product of the given type.
pub async fn find_course_product<C>(
    db: &C,
    ctx: TenantContext,
    course_id: i64,
    item_type: ItemType,
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    Ok(course_products(db, ctx, course_id)
        .await?
        .into_iter()
        .find(|p| p.item_type == item_type))
}

/// Brand-level active product of the given type (lowest id wins).
pub async fn find_brand_product<C>(
    db: &C,
    ctx: TenantContext,
    brand_id: i64,
    item_type: ItemType,
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    Product::find()
        .filter(product::Column::TenantId.eq(ctx.tenant_id))
        .filter(product::Column::BrandId.eq(brand_id))
        .filter(product::Column::ItemType.eq(item_type))
        .filter(product::Column::IsActive.eq(true))
        .order_by_asc(product::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Active product of the brand with an exact code and type.
pub async fn find_product_by_code<C>(
    db: &C,
    ctx: TenantContext,
    brand_id: i64,
    code: &str,
    item_type: ItemType,
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    Product::find()
        .filter(product::Column::TenantId.eq(ctx.tenant_id))
        .filter(product::Column::BrandId.eq(brand_id))
        .filter(product::Column::Code.eq(code))
        .filter(product::Column::ItemType.eq(item_type))
        .filter(product::Column::IsActive.eq(true))
        .order_by_asc(product::Column::Id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Course-specific product of a type, without the brand-level fallback.
///
/// Enrollment-time families try `{code}_{suffix}` for each suffix, then the bare code.
/// Other types look through the course's linked items.
pub async fn find_course_specific_product<C>(
    db: &C,
    ctx: TenantContext,
    brand_id: i64,
    course: &course::Model,
    item_type: ItemType,
    suffixes: &[String],
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    if item_type.uses_course_code_convention() {
        for suffix in suffixes {
            let code = format!("{}_{suffix}", course.code);
            if let Some(found) = find_product_by_code(db, ctx, brand_id, &code, item_type).await? {
                debug!(code = %code, %item_type, "Resolved product by suffixed course code");
                return Ok(Some(found));
            }
        }
        if let Some(found) =
            find_product_by_code(db, ctx, brand_id, &course.code, item_type).await?
        {
            debug!(code = %course.code, %item_type, "Resolved product by bare course code");
            return Ok(Some(found));
        }
        return Ok(None);
    }

    find_course_product(db, ctx, course.id, item_type).await
}

/// Best product of `item_type` for an offering: each of its courses in order, then brand level.
pub async fn resolve_offering_product<C>(
    db: &C,
    ctx: TenantContext,
    brand_id: i64,
    offering: Offering,
    item_type: ItemType,
    suffixes: &[String],
) -> Result<Option<product::Model>>
where
    C: ConnectionTrait,
{
    for course in courses_for_offering(db, ctx, offering).await? {
        if let Some(found) =
            find_course_specific_product(db, ctx, brand_id, &course, item_type, suffixes).await?
        {
            return Ok(Some(found));
        }
    }

    let fallback = find_brand_product(db, ctx, brand_id, item_type).await?;
    if fallback.is_none() {
        debug!(brand_id, %item_type, ?offering, "No product found for fee type");
    }
    Ok(fallback)
}

/// Tightest `discount_max_percent` among the products linked to the offering's courses.
///
/// `None` when no linked product limits discounts.
pub async fn offering_discount_cap<C>(
    db: &C,
    ctx: TenantContext,
    offering: Offering,
) -> Result<Option<i32>>
where
    C: ConnectionTrait,
{
    let mut cap: Option<i32> = None;
    for course in courses_for_offering(db, ctx, offering).await? {
        for product in course_products(db, ctx, course.id).await? {
            if let Some(percent) = product.discount_max_percent {
                cap = Some(cap.map_or(percent, |current| current.min(percent)));
            }
        }
    }
    Ok(cap)
}

/// Mile value of a course: the sum over its tuition-type items, or the course's own
/// aggregate when no tuition item carries a mile.
pub async fn course_miles<C>(db: &C, ctx: TenantContext, course: &course::Model) -> Result<i64>
where
    C: ConnectionTrait,
{
    let from_items: i64 = course_products(db, ctx, course.id)
        .await?
        .iter()
        .filter(|p| p.item_type == ItemType::Tuition)
        .map(|p| i64::from(p.mile))
        .sum();

    if from_items > 0 {
        Ok(from_items)
    } else {
        Ok(i64::from(course.mile))
    }
}

/// Mile value of an offering being purchased.
pub async fn offering_miles<C>(db: &C, ctx: TenantContext, offering: Offering) -> Result<i64>
where
    C: ConnectionTrait,
{
    match offering {
        Offering::Course(course_id) => {
            let course = get_course(db, ctx, course_id).await?;
            course_miles(db, ctx, &course).await
        }
        Offering::Pack(pack_id) => Ok(i64::from(get_pack(db, ctx, pack_id).await?.mile)),
    }
}
