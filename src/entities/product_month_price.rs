//! Month-stepped price slot for a product.
//!
//! Each row fills one calendar month (1..=12) of the product's billing and enrollment
//! price tables. A missing row or a `None` slot means "use the product's base price".

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_month_prices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub product_id: i64,
    /// 1-based calendar month
    pub month: i32,
    /// Price charged to existing members billed in this month
    pub billing_price: Option<i64>,
    /// Price charged to a member who joins in this month
    pub enrollment_price: Option<i64>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
