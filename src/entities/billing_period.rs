//! Billing period entity - open/closed state of one provider's billing month.
//!
//! Rows are created lazily the first time a (provider, year, month) is referenced.
//! A missing row means the period is open.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "billing_periods")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: i64,
    pub provider_id: i64,
    pub year: i32,
    pub month: i32,
    pub closing_date: Date,
    pub is_closed: bool,
    pub closed_at: Option<DateTimeUtc>,
    /// Who closed the period, for the audit trail
    pub closed_by: Option<String>,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
