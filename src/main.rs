//! Monthly debt generator.
//!
//! Meant to be run by an external scheduler once per billing cycle. Takes no
//! arguments, prints the run report, and exits non-zero only when the run as a
//! whole could not happen.

use cable_billing::{
    config::{
        billing::load_default_config,
        database::{create_connection, create_tables, get_database_url},
        users::get_bootstrap_admin,
    },
    core::{
        access::RequestContext,
        monthly::{format_monthly_run_report, generate_monthly_debts},
        user::seed_admin,
    },
    errors::Result,
};
use dotenvy::dotenv;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file, non-fatal since env vars can be set externally
    dotenv().ok();

    // 3. Billing settings
    let config = load_default_config()
        .inspect_err(|e| error!("Failed to load configuration: {}", e))?;

    // 4. Database; the default SQLite file lives under ./data
    if get_database_url().starts_with("sqlite://data/") {
        std::fs::create_dir_all("data")?;
    }
    let db = create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    create_tables(&db).await?;
    info!("Database ready");

    // 5. First administrator, if configured and missing
    if let Some(admin) = get_bootstrap_admin() {
        seed_admin(&db, &admin).await?;
    }

    // 6. Generate this month's debts
    let report = generate_monthly_debts(&db, &RequestContext::system(), &config.billing)
        .await
        .inspect_err(|e| error!("Monthly generation failed: {}", e))?;
    println!("{}", format_monthly_run_report(&report));

    Ok(())
}
