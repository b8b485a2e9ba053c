//! Entity module - Contains all SeaORM entity definitions for the database.
//! Catalog, household and provider tables are read-only snapshots for the engine;
//! margin calculations, monthly summaries and billing periods are written by it.

pub mod billing_period;
pub mod brand;
pub mod charge;
pub mod contract;
pub mod course;
pub mod course_item;
pub mod fs_discount;
pub mod guardian;
pub mod margin_calculation;
pub mod margin_rule;
pub mod monthly_margin_summary;
pub mod pack;
pub mod pack_course;
pub mod payment_provider;
pub mod product;
pub mod product_month_price;
pub mod school;
pub mod student;

// Re-export specific types to avoid conflicts
pub use billing_period::Entity as BillingPeriod;
pub use brand::Entity as Brand;
pub use charge::Entity as Charge;
pub use contract::{ContractStatus, Entity as Contract};
pub use course::Entity as Course;
pub use course_item::Entity as CourseItem;
pub use fs_discount::{DiscountType, Entity as FsDiscount};
pub use guardian::Entity as Guardian;
pub use margin_calculation::{CalculationStatus, Entity as MarginCalculation};
pub use margin_rule::{
    CalculationType, Entity as MarginRule, FixedMarginTarget, RuleTargetKind,
};
pub use monthly_margin_summary::Entity as MonthlyMarginSummary;
pub use pack::Entity as Pack;
pub use pack_course::Entity as PackCourse;
pub use payment_provider::Entity as PaymentProvider;
pub use product::{Entity as Product, ItemType};
pub use product_month_price::Entity as ProductMonthPrice;
pub use school::Entity as School;
pub use student::Entity as Student;
