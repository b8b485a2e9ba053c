//! Shared test utilities for `tuition-billing`.
//!
//! This module provides common helper functions for setting up test databases
//! and creating catalog, household and provider rows with sensible defaults.

use crate::{
    core::types::TenantContext,
    entities::{
        ContractStatus, DiscountType, ItemType, brand, charge, contract, course, course_item,
        fs_discount, guardian, pack, pack_course, payment_provider, product, product_month_price,
        school, student,
    },
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};

/// Tenant every helper writes to unless told otherwise.
pub const TENANT: TenantContext = TenantContext::new(1);
/// A second tenant, for isolation tests.
pub const OTHER_TENANT: TenantContext = TenantContext::new(2);

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// The brand, school and course most tests start from.
pub struct CatalogFixture {
    pub brand: brand::Model,
    pub school: school::Model,
    pub course: course::Model,
}

/// A guardian and their students, in creation order.
pub struct Family {
    pub guardian: guardian::Model,
    pub students: Vec<student::Model>,
}

/// Creates a brand and a school in `ctx`'s tenant.
pub async fn create_brand_and_school(
    db: &DatabaseConnection,
    ctx: TenantContext,
    brand_code: &str,
    brand_name: &str,
    school_name: &str,
) -> Result<(brand::Model, school::Model)> {
    let brand = brand::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        code: Set(brand_code.to_string()),
        name: Set(brand_name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let school = school::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        name: Set(school_name.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok((brand, school))
}

/// Creates a test database with one brand, one school and one course.
///
/// # Defaults
/// * brand: `ENG` / "English School"
/// * school: "Shibuya"
/// * course: `ENG01` with mile 0
pub async fn setup_catalog() -> Result<(DatabaseConnection, CatalogFixture)> {
    let db = setup_test_db().await?;
    let (brand, school) =
        create_brand_and_school(&db, TENANT, "ENG", "English School", "Shibuya").await?;

    let course = create_course(&db, brand.id, "ENG01", 0).await?;

    Ok((
        db,
        CatalogFixture {
            brand,
            school,
            course,
        },
    ))
}

/// Creates an active product for another tenant.
///
/// # Defaults
/// * `name`: same as the code
/// * `mile`: 0
/// * `tax_rate`: 0.1
pub async fn create_product_for_tenant(
    db: &DatabaseConnection,
    ctx: TenantContext,
    brand_id: i64,
    code: &str,
    item_type: ItemType,
    base_price: i64,
) -> Result<product::Model> {
    product::ActiveModel {
        tenant_id: Set(ctx.tenant_id),
        brand_id: Set(brand_id),
        code: Set(code.to_string()),
        name: Set(code.to_string()),
        item_type: Set(item_type),
        base_price: Set(base_price),
        per_ticket_price: Set(None),
        mile: Set(0),
        discount_max_percent: Set(None),
        tax_rate: Set(0.1),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an active product in [`TENANT`].
pub async fn create_product(
    db: &DatabaseConnection,
    brand_id: i64,
    code: &str,
    item_type: ItemType,
    base_price: i64,
) -> Result<product::Model> {
    create_product_for_tenant(db, TENANT, brand_id, code, item_type, base_price).await
}

/// Creates a product carrying miles; the price is irrelevant for mile tests.
pub async fn create_product_with_mile(
    db: &DatabaseConnection,
    brand_id: i64,
    code: &str,
    item_type: ItemType,
    mile: i32,
) -> Result<product::Model> {
    let created = create_product(db, brand_id, code, item_type, 10_000).await?;
    let mut active: product::ActiveModel = created.into();
    active.mile = Set(mile);
    active.update(db).await.map_err(Into::into)
}

/// Limits the discounts a product accepts to `percent` of the subtotal.
pub async fn set_discount_max_percent(
    db: &DatabaseConnection,
    product: product::Model,
    percent: i32,
) -> Result<product::Model> {
    let mut active: product::ActiveModel = product.into();
    active.discount_max_percent = Set(Some(percent));
    active.update(db).await.map_err(Into::into)
}

pub async fn deactivate_product(db: &DatabaseConnection, product: product::Model) -> Result<()> {
    let mut active: product::ActiveModel = product.into();
    active.is_active = Set(false);
    active.update(db).await?;
    Ok(())
}

/// Sets the billing and enrollment prices of one month slot.
pub async fn set_month_price(
    db: &DatabaseConnection,
    product_id: i64,
    month: i32,
    billing_price: Option<i64>,
    enrollment_price: Option<i64>,
) -> Result<product_month_price::Model> {
    product_month_price::ActiveModel {
        product_id: Set(product_id),
        month: Set(month),
        billing_price: Set(billing_price),
        enrollment_price: Set(enrollment_price),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

pub async fn create_course(
    db: &DatabaseConnection,
    brand_id: i64,
    code: &str,
    mile: i32,
) -> Result<course::Model> {
    course::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        brand_id: Set(brand_id),
        code: Set(code.to_string()),
        name: Set(format!("Course {code}")),
        mile: Set(mile),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Links a product to a course as an active line item.
pub async fn link_course_item(
    db: &DatabaseConnection,
    course_id: i64,
    product_id: i64,
    sort_order: i32,
) -> Result<course_item::Model> {
    course_item::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        course_id: Set(course_id),
        product_id: Set(product_id),
        sort_order: Set(sort_order),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a pack whose courses are tried in the order given.
pub async fn create_pack(
    db: &DatabaseConnection,
    brand_id: i64,
    code: &str,
    mile: i32,
    course_ids: &[i64],
) -> Result<pack::Model> {
    let created = pack::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        brand_id: Set(brand_id),
        code: Set(code.to_string()),
        name: Set(format!("Pack {code}")),
        mile: Set(mile),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await?;

    for (sort_order, course_id) in (1..).zip(course_ids) {
        pack_course::ActiveModel {
            tenant_id: Set(TENANT.tenant_id),
            pack_id: Set(created.id),
            course_id: Set(*course_id),
            sort_order: Set(sort_order),
            ..Default::default()
        }
        .insert(db)
        .await?;
    }

    Ok(created)
}

/// Creates a guardian named `surname` with one student per entry in `students`.
pub async fn create_family(db: &DatabaseConnection, surname: &str, students: &[&str]) -> Result<Family> {
    let guardian = guardian::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        name: Set(surname.to_string()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    let mut created = Vec::with_capacity(students.len());
    for name in students {
        let student = student::ActiveModel {
            tenant_id: Set(TENANT.tenant_id),
            guardian_id: Set(guardian.id),
            name: Set(format!("{surname} {name}")),
            ..Default::default()
        }
        .insert(db)
        .await?;
        created.push(student);
    }

    Ok(Family {
        guardian,
        students: created,
    })
}

/// Creates a contract for the fixture's course, starting 2025-04-01.
pub async fn create_contract(
    db: &DatabaseConnection,
    fx: &CatalogFixture,
    student_id: i64,
    guardian_id: i64,
    status: ContractStatus,
) -> Result<contract::Model> {
    contract::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        student_id: Set(student_id),
        guardian_id: Set(guardian_id),
        brand_id: Set(fx.brand.id),
        school_id: Set(fx.school.id),
        course_id: Set(Some(fx.course.id)),
        pack_id: Set(None),
        status: Set(status),
        start_date: Set(NaiveDate::from_ymd_opt(2025, 4, 1).unwrap_or_default()),
        end_date: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates a charge for April 2025 with no contract or product reference.
pub async fn create_charge(
    db: &DatabaseConnection,
    student_id: i64,
    item_type: ItemType,
    unit_price: i64,
    is_active: bool,
) -> Result<charge::Model> {
    charge::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        student_id: Set(student_id),
        contract_id: Set(None),
        product_id: Set(None),
        item_type: Set(item_type),
        unit_price: Set(unit_price),
        billing_year: Set(2025),
        billing_month: Set(4),
        is_active: Set(is_active),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

pub async fn create_fs_discount(
    db: &DatabaseConnection,
    guardian_id: i64,
    discount_type: DiscountType,
    value: f64,
    valid_from: NaiveDate,
    valid_until: Option<NaiveDate>,
) -> Result<fs_discount::Model> {
    fs_discount::ActiveModel {
        tenant_id: Set(TENANT.tenant_id),
        guardian_id: Set(guardian_id),
        discount_type: Set(discount_type),
        value: Set(value),
        valid_from: Set(valid_from),
        valid_until: Set(valid_until),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

pub async fn deactivate_provider(
    db: &DatabaseConnection,
    provider: payment_provider::Model,
) -> Result<()> {
    let mut active: payment_provider::ActiveModel = provider.into();
    active.is_active = Set(false);
    active.update(db).await?;
    Ok(())
}
