#![allow(clippy::result_large_err)]

use chrono::Utc;
use dotenvy::dotenv;
use std::env;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tuition_billing::{
    config::{self, database},
    core::{TenantContext, YearMonth, margin},
    errors::{Error, Result},
};

/// Parses `YYYY-MM` from the command line, defaulting to the current month.
fn period_from_args() -> Result<YearMonth> {
    let Some(arg) = env::args().nth(1) else {
        return Ok(YearMonth::of(Utc::now().date_naive()));
    };

    let invalid = || Error::Config {
        message: format!("Expected a billing month as YYYY-MM, got `{arg}`"),
    };
    let (year, month) = arg.split_once('-').ok_or_else(invalid)?;
    let year = year.parse().map_err(|_| invalid())?;
    let month = month.parse().map_err(|_| invalid())?;
    YearMonth::new(year, month)
}

fn tenant_from_env() -> Result<TenantContext> {
    let raw = env::var("TENANT_ID")
        .inspect_err(|e| error!("TENANT_ID not found: {}", e))
        .map_err(Error::EnvVar)?;
    let tenant_id = raw.parse().map_err(|_| Error::Config {
        message: format!("TENANT_ID must be an integer, got `{raw}`"),
    })?;
    Ok(TenantContext::new(tenant_id))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();

    // 3. Engine configuration
    let engine_config = config::engine::load_default_config()
        .inspect_err(|e| error!("Failed to load engine configuration: {}", e))?;

    // 4. Database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    info!("Database initialized successfully.");

    // 5. Monthly margin recomputation
    let ctx = tenant_from_env()?;
    let period = period_from_args()?;
    let outcome = margin::recalculate_month(
        &db,
        ctx,
        period,
        engine_config.batch.max_failure_details,
    )
    .await?;

    for failure in &outcome.failures {
        warn!(
            calculation_id = failure.calculation_id,
            invoice_line_ref = %failure.invoice_line_ref,
            "{}",
            failure.message
        );
    }
    info!(
        tenant_id = ctx.tenant_id,
        %period,
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        "Monthly margin recomputation done"
    );

    Ok(())
}
