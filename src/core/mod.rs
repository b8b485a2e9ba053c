//! Core business logic - fee, discount, margin and billing period operations.
//!
//! Repository functions take any `ConnectionTrait` so they run the same on a connection
//! or inside a transaction. Operations that write several rows open their own transaction
//! and take a `DatabaseConnection`.

pub mod billing_period;
pub mod catalog;
pub mod discount;
pub mod fees;
pub mod household;
pub mod margin;
pub mod margin_rule;
pub mod types;

pub use types::{Offering, TenantContext, YearMonth};
