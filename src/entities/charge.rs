//! Charge entity - a historical or currently billed line on a student's account.
//!
//! The engine only reads charges: enrollment and bag charges prove one-time fees were
//! already taken, and active facility charges give the student's current facility fee.

use super::product::ItemType;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "charges")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: i64,
    pub student_id: i64,
    pub contract_id: Option<i64>,
    pub product_id: Option<i64>,
    pub item_type: ItemType,
    pub unit_price: i64,
    pub billing_year: i32,
    pub billing_month: i32,
    /// Still billed every month (false once the contract line has ended)
    pub is_active: bool,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
