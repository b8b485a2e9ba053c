//! Product entity - A billable catalog item (tuition, facility fee, textbook, welcome bag...).
//!
//! The month-stepped price tables live in [`super::product_month_price`], one row per
//! (product, calendar month).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// What kind of fee a product bills for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    #[sea_orm(string_value = "tuition")]
    Tuition,
    #[sea_orm(string_value = "monthly_fee")]
    MonthlyFee,
    #[sea_orm(string_value = "facility")]
    Facility,
    #[sea_orm(string_value = "textbook")]
    Textbook,
    #[sea_orm(string_value = "enrollment")]
    Enrollment,
    #[sea_orm(string_value = "enrollment_tuition")]
    EnrollmentTuition,
    #[sea_orm(string_value = "enrollment_monthly_fee")]
    EnrollmentMonthlyFee,
    #[sea_orm(string_value = "enrollment_facility")]
    EnrollmentFacility,
    #[sea_orm(string_value = "enrollment_textbook")]
    EnrollmentTextbook,
    #[sea_orm(string_value = "bag")]
    Bag,
    #[sea_orm(string_value = "other")]
    Other,
}

impl ItemType {
    /// Facility-type charges count towards a student's current facility fee.
    #[must_use]
    pub const fn is_facility(self) -> bool {
        matches!(self, Self::Facility | Self::EnrollmentFacility)
    }

    /// Enrollment-time families whose product codes follow `{course_code}_{suffix}`.
    #[must_use]
    pub const fn uses_course_code_convention(self) -> bool {
        matches!(
            self,
            Self::EnrollmentTuition
                | Self::EnrollmentMonthlyFee
                | Self::EnrollmentFacility
                | Self::EnrollmentTextbook
        )
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Tuition => "tuition",
            Self::MonthlyFee => "monthly_fee",
            Self::Facility => "facility",
            Self::Textbook => "textbook",
            Self::Enrollment => "enrollment",
            Self::EnrollmentTuition => "enrollment_tuition",
            Self::EnrollmentMonthlyFee => "enrollment_monthly_fee",
            Self::EnrollmentFacility => "enrollment_facility",
            Self::EnrollmentTextbook => "enrollment_textbook",
            Self::Bag => "bag",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

/// Product database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: i64,
    /// Brand that sells this product; brand-level lookups match on it
    pub brand_id: i64,
    /// Catalog code, e.g. `ENG01_1` for an enrollment-time product of course `ENG01`
    pub code: String,
    pub name: String,
    pub item_type: ItemType,
    /// Flat price in the tenant's base currency unit
    pub base_price: i64,
    /// Price of one class; ticket proration charges `per_ticket_price * tickets` when set
    pub per_ticket_price: Option<i64>,
    /// Loyalty credit this product contributes to the household mile total
    pub mile: i32,
    /// Upper bound on the FS discount, as a percent of the subtotal, for offerings containing
    /// this product
    pub discount_max_percent: Option<i32>,
    /// Tax rate as a fraction (0.10 = 10%)
    pub tax_rate: f64,
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
