//! Margin calculation entity - the immutable margin result for one invoice line.
//!
//! Names and rates of the rule, school and brand are copied in at calculation time so the
//! record can be reproduced even after the catalog changes.

use super::margin_rule::CalculationType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CalculationStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl std::fmt::Display for CalculationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Confirmed => write!(f, "confirmed"),
            Self::Paid => write!(f, "paid"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "margin_calculations")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: i64,
    /// Reference of the invoice line this margin belongs to; one calculation per line and
    /// tenant (unique index created with the tables)
    pub invoice_line_ref: String,
    pub guardian_id: Option<i64>,
    pub school_id: i64,
    pub brand_id: i64,
    pub product_id: Option<i64>,
    pub course_id: Option<i64>,
    pub pack_id: Option<i64>,
    pub instructor_id: Option<i64>,
    pub billing_year: i32,
    pub billing_month: i32,
    pub margin_rule_id: i64,
    pub rule_name: String,
    pub calculation_type: CalculationType,
    pub margin_rate: f64,
    pub school_distribution_rate: f64,
    pub brand_distribution_rate: f64,
    pub school_name: String,
    pub brand_name: String,
    pub sales_amount: i64,
    pub total_cost: i64,
    pub net_profit: i64,
    pub margin_pool: i64,
    pub school_margin: i64,
    pub brand_margin: i64,
    pub fixed_margin: i64,
    pub status: CalculationStatus,
    pub created_at: DateTimeUtc,
    pub confirmed_at: Option<DateTimeUtc>,
    pub paid_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
