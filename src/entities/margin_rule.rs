//! Margin rule entity - how the profit of a sale is split between school and brand.
//!
//! At rest the rule target is a kind column plus one nullable reference column per kind.
//! Code outside the storage layer works with [`crate::core::margin_rule::MarginRule`], whose
//! target is a tagged enum validated when the row is converted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RuleTargetKind {
    #[sea_orm(string_value = "default")]
    Default,
    #[sea_orm(string_value = "product")]
    Product,
    #[sea_orm(string_value = "course")]
    Course,
    #[sea_orm(string_value = "pack")]
    Pack,
    #[sea_orm(string_value = "instructor")]
    Instructor,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum CalculationType {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
    #[sea_orm(string_value = "mixed")]
    Mixed,
}

impl std::fmt::Display for CalculationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Percentage => write!(f, "percentage"),
            Self::Fixed => write!(f, "fixed"),
            Self::Mixed => write!(f, "mixed"),
        }
    }
}

/// Which bucket receives the fixed part of a margin.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum FixedMarginTarget {
    #[sea_orm(string_value = "school")]
    School,
    #[sea_orm(string_value = "brand")]
    Brand,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "margin_rules")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: i64,
    pub name: String,
    pub rule_target: RuleTargetKind,
    pub product_id: Option<i64>,
    pub course_id: Option<i64>,
    pub pack_id: Option<i64>,
    pub instructor_id: Option<i64>,
    pub calculation_type: CalculationType,
    /// Fraction of net profit (0..=1) that forms the distributable pool
    pub margin_rate: f64,
    pub fixed_margin_amount: i64,
    pub fixed_margin_target: FixedMarginTarget,
    pub school_distribution_rate: f64,
    pub brand_distribution_rate: f64,
    /// Higher wins among rules of the same target kind
    pub priority: i32,
    pub is_active: bool,
    pub is_deleted: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
