//! Monthly margin summary - per (school, brand, year, month) totals of margin calculations.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monthly_margin_summaries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: i64,
    pub school_id: i64,
    pub brand_id: i64,
    pub year: i32,
    pub month: i32,
    pub total_sales: i64,
    pub total_cost: i64,
    pub total_net_profit: i64,
    pub total_margin_pool: i64,
    pub total_school_margin: i64,
    pub total_brand_margin: i64,
    pub total_fixed_margin: i64,
    pub calculation_count: i64,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
