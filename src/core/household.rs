//! Household aggregation - a guardian with their students and active contracts.
//!
//! Everything here reads live rows on each call. Nothing is cached between calls, so a
//! sibling contract added or cancelled by someone else is seen by the next calculation.

use crate::{
    core::types::TenantContext,
    entities::{
        Charge, Contract, ContractStatus, Guardian, ItemType, Student, charge, contract,
        guardian, student,
    },
    errors::{Error, Result},
};
use sea_orm::{QueryOrder, prelude::*};

/// A guardian's household as seen at one point in time.
#[derive(Debug, Clone)]
pub struct Household {
    pub guardian: guardian::Model,
    pub students: Vec<student::Model>,
    pub active_contracts: Vec<contract::Model>,
}

impl Household {
    /// Number of active contracts across all students of the household.
    #[must_use]
    pub fn contract_count(&self) -> usize {
        self.active_contracts.len()
    }
}

/// Gets a guardian of the tenant, or `NotFound`.
pub async fn get_guardian<C>(db: &C, ctx: TenantContext, guardian_id: i64) -> Result<guardian::Model>
where
    C: ConnectionTrait,
{
    Guardian::find_by_id(guardian_id)
        .filter(guardian::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Guardian", guardian_id))
}

/// Gets a student of the tenant, or `NotFound`.
pub async fn get_student<C>(db: &C, ctx: TenantContext, student_id: i64) -> Result<student::Model>
where
    C: ConnectionTrait,
{
    Student::find_by_id(student_id)
        .filter(student::Column::TenantId.eq(ctx.tenant_id))
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("Student", student_id))
}

pub async fn students_for_guardian<C>(
    db: &C,
    ctx: TenantContext,
    guardian_id: i64,
) -> Result<Vec<student::Model>>
where
    C: ConnectionTrait,
{
    Student::find()
        .filter(student::Column::TenantId.eq(ctx.tenant_id))
        .filter(student::Column::GuardianId.eq(guardian_id))
        .order_by_asc(student::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Active contracts of every student under the guardian.
pub async fn active_contracts_for_guardian<C>(
    db: &C,
    ctx: TenantContext,
    guardian_id: i64,
) -> Result<Vec<contract::Model>>
where
    C: ConnectionTrait,
{
    Contract::find()
        .filter(contract::Column::TenantId.eq(ctx.tenant_id))
        .filter(contract::Column::GuardianId.eq(guardian_id))
        .filter(contract::Column::Status.eq(ContractStatus::Active))
        .order_by_asc(contract::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Loads the household of a guardian; `NotFound` when the guardian is unknown.
pub async fn load_household<C>(db: &C, ctx: TenantContext, guardian_id: i64) -> Result<Household>
where
    C: ConnectionTrait,
{
    let guardian = get_guardian(db, ctx, guardian_id).await?;
    let students = students_for_guardian(db, ctx, guardian_id).await?;
    let active_contracts = active_contracts_for_guardian(db, ctx, guardian_id).await?;

    Ok(Household {
        guardian,
        students,
        active_contracts,
    })
}

/// Whether the household already paid the one-time enrollment fee.
///
/// True when any student under the guardian has an enrollment charge, or when the guardian
/// has any contract at all in any status. A prior contract counts as proof of payment even
/// if no enrollment charge row was kept for it.
pub async fn has_paid_enrollment_fee<C>(db: &C, ctx: TenantContext, guardian_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let contracts = Contract::find()
        .filter(contract::Column::TenantId.eq(ctx.tenant_id))
        .filter(contract::Column::GuardianId.eq(guardian_id))
        .count(db)
        .await?;
    if contracts > 0 {
        return Ok(true);
    }

    let student_ids: Vec<i64> = students_for_guardian(db, ctx, guardian_id)
        .await?
        .into_iter()
        .map(|s| s.id)
        .collect();
    if student_ids.is_empty() {
        return Ok(false);
    }

    let charges = Charge::find()
        .filter(charge::Column::TenantId.eq(ctx.tenant_id))
        .filter(charge::Column::StudentId.is_in(student_ids))
        .filter(charge::Column::ItemType.eq(ItemType::Enrollment))
        .count(db)
        .await?;
    Ok(charges > 0)
}

/// Whether the student already received the one-time welcome item (bag).
///
/// Same rule as the enrollment fee, at student granularity: a bag charge or any contract
/// of the student.
pub async fn has_received_welcome_item<C>(db: &C, ctx: TenantContext, student_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let bags = Charge::find()
        .filter(charge::Column::TenantId.eq(ctx.tenant_id))
        .filter(charge::Column::StudentId.eq(student_id))
        .filter(charge::Column::ItemType.eq(ItemType::Bag))
        .count(db)
        .await?;
    if bags > 0 {
        return Ok(true);
    }

    let contracts = Contract::find()
        .filter(contract::Column::TenantId.eq(ctx.tenant_id))
        .filter(contract::Column::StudentId.eq(student_id))
        .count(db)
        .await?;
    Ok(contracts > 0)
}

/// Highest unit price among the student's currently billed facility charges, 0 if none.
///
/// Facility fees are per student: several contracts mean one facility fee at the
/// highest rate, never a sum.
pub async fn highest_current_facility_fee<C>(db: &C, ctx: TenantContext, student_id: i64) -> Result<i64>
where
    C: ConnectionTrait,
{
    let charges = Charge::find()
        .filter(charge::Column::TenantId.eq(ctx.tenant_id))
        .filter(charge::Column::StudentId.eq(student_id))
        .filter(charge::Column::IsActive.eq(true))
        .all(db)
        .await?;

    Ok(charges
        .iter()
        .filter(|c| c.item_type.is_facility())
        .map(|c| c.unit_price)
        .max()
        .unwrap_or(0)
        .max(0))
}
