//! Database configuration module.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs without hand-written SQL.

use crate::entities::{
    BillingPeriod, Brand, Charge, Contract, Course, CourseItem, FsDiscount, Guardian,
    MarginCalculation, MarginRule, MonthlyMarginSummary, Pack, PackCourse, PaymentProvider,
    Product, ProductMonthPrice, School, Student, billing_period, margin_calculation,
    monthly_margin_summary,
};
use crate::errors::Result;
use sea_orm::{
    ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema,
    sea_query::{Index, IndexCreateStatement, TableCreateStatement},
};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/tuition_billing.sqlite?mode=rwc";

/// Gets the database URL from environment variable or returns default `SQLite` path.
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by `DATABASE_URL`.
///
/// Falls back to a local `SQLite` file if no environment variable is set.
pub async fn create_connection() -> Result<DatabaseConnection> {
    Database::connect(&get_database_url())
        .await
        .map_err(Into::into)
}

fn table_for<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    let mut table = schema.create_table_from_entity(entity);
    table.if_not_exists();
    table
}

/// Composite keys the engine upserts on or looks rows up by.
fn unique_indexes() -> [IndexCreateStatement; 3] {
    [
        Index::create()
            .if_not_exists()
            .name("uq_margin_calculations_tenant_invoice_line")
            .table(MarginCalculation)
            .col(margin_calculation::Column::TenantId)
            .col(margin_calculation::Column::InvoiceLineRef)
            .unique()
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("uq_monthly_margin_summaries_school_brand_month")
            .table(MonthlyMarginSummary)
            .col(monthly_margin_summary::Column::TenantId)
            .col(monthly_margin_summary::Column::SchoolId)
            .col(monthly_margin_summary::Column::BrandId)
            .col(monthly_margin_summary::Column::Year)
            .col(monthly_margin_summary::Column::Month)
            .unique()
            .to_owned(),
        Index::create()
            .if_not_exists()
            .name("uq_billing_periods_provider_month")
            .table(BillingPeriod)
            .col(billing_period::Column::TenantId)
            .col(billing_period::Column::ProviderId)
            .col(billing_period::Column::Year)
            .col(billing_period::Column::Month)
            .unique()
            .to_owned(),
    ]
}

/// Creates every table the engine reads or writes, skipping tables that already exist.
///
/// Also creates the unique indexes on the tenant-scoped composite keys.
pub async fn create_tables<C>(db: &C) -> Result<()>
where
    C: ConnectionTrait,
{
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    let tables = [
        table_for(&schema, Brand),
        table_for(&schema, School),
        table_for(&schema, Product),
        table_for(&schema, ProductMonthPrice),
        table_for(&schema, Course),
        table_for(&schema, CourseItem),
        table_for(&schema, Pack),
        table_for(&schema, PackCourse),
        table_for(&schema, Guardian),
        table_for(&schema, Student),
        table_for(&schema, Contract),
        table_for(&schema, Charge),
        table_for(&schema, FsDiscount),
        table_for(&schema, MarginRule),
        table_for(&schema, MarginCalculation),
        table_for(&schema, MonthlyMarginSummary),
        table_for(&schema, PaymentProvider),
        table_for(&schema, BillingPeriod),
    ];

    for table in &tables {
        db.execute(builder.build(table)).await?;
    }
    for index in &unique_indexes() {
        db.execute(builder.build(index)).await?;
    }

    tracing::debug!("Ensured {} engine tables exist", tables.len());
    Ok(())
}
