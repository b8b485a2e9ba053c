//! Unified error types and result handling.
//!
//! Every fallible engine call returns [`Result`]. Catalog gaps are not errors (a missing
//! product just means a fee is not applicable), so the variants here cover configuration
//! problems, missing household context, invalid inputs and storage failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A margin rule or other engine record failed validation at write time.
    #[error("Configuration error on `{field}`: {message}")]
    Configuration { field: String, message: String },

    /// A record the caller asked to operate on does not exist in the tenant.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The engine configuration file could not be loaded or holds invalid values.
    #[error("Config error: {message}")]
    Config { message: String },

    #[error("Invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("Invalid billing period: {year}-{month:02}")]
    InvalidPeriod { year: i32, month: u32 },

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },

    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("Integer conversion error: {0}")]
    IntConversion(#[from] std::num::TryFromIntError),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`] on a numeric id.
    pub(crate) fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Shorthand for a [`Error::Configuration`] on a named field.
    pub(crate) fn configuration(field: &str, message: impl Into<String>) -> Self {
        Self::Configuration {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
