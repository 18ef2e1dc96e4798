//! Monthly debt generation
//!
//! Issues one debt per active client for the current billing cycle. A client is
//! skipped when its fees add up to nothing, or when it already has a debt falling
//! due in the current calendar month, so running the generator twice in the same
//! month creates nothing the second time. Clients are processed independently: one
//! failure is reported and the run moves on.

use crate::{
    config::billing::BillingConfig,
    core::{
        access::{Operation, RequestContext},
        audit::{self, AuditEntry},
        debt::{self as debts, NewDebt},
        report::format_amount,
    },
    entities::{Client, Debt, client, debt},
    errors::{Error, Result},
};
use chrono::{Datelike, Months, NaiveDate};
use sea_orm::{QueryOrder, prelude::*};
use serde::Serialize;
use tracing::{error, info, instrument};

/// What happened to one client during a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ClientOutcome {
    /// A debt was issued
    Created {
        /// The new debt
        debt_id: i64,
        /// Amount billed
        amount: f64,
    },
    /// Fees add up to zero
    SkippedNoFee,
    /// A debt already falls due this month
    SkippedAlreadyBilled,
    /// Debt creation failed
    Failed {
        /// Error message
        reason: String,
    },
}

/// Represents the result of the generator for a single client.
#[derive(Debug, Clone, Serialize)]
pub struct ClientBillingResult {
    /// Client billed or skipped
    pub client_id: i64,
    /// "First Last"
    pub client_name: String,
    /// What the run did for this client
    pub outcome: ClientOutcome,
}

/// Represents the result of one generator run over all active clients.
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyRunReport {
    /// First day of the billed month
    pub period: NaiveDate,
    /// Due date given to every debt issued by the run
    pub due_date: NaiveDate,
    /// Concept given to every debt issued by the run
    pub concept: String,
    /// One entry per active client, in id order
    pub results: Vec<ClientBillingResult>,
}

impl MonthlyRunReport {
    /// Number of debts issued.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ClientOutcome::Created { .. }))
            .count()
    }

    /// Number of clients skipped for either reason.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    ClientOutcome::SkippedNoFee | ClientOutcome::SkippedAlreadyBilled
                )
            })
            .count()
    }

    /// Number of clients whose debt could not be created.
    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| matches!(r.outcome, ClientOutcome::Failed { .. }))
            .count()
    }

    /// Sum of all issued debts.
    #[must_use]
    pub fn total_billed(&self) -> f64 {
        self.results
            .iter()
            .map(|r| match r.outcome {
                ClientOutcome::Created { amount, .. } => amount,
                _ => 0.0,
            })
            .sum()
    }
}

/// First day of `date`'s month and first day of the following month.
pub(crate) fn month_bounds(date: NaiveDate) -> Result<(NaiveDate, NaiveDate)> {
    date.with_day(1)
        .and_then(|start| Some((start, start.checked_add_months(Months::new(1))?)))
        .ok_or_else(|| Error::Validation {
            message: format!("No calendar month around {date}"),
        })
}

/// True if the client already has a debt due within `[start, end)`.
async fn already_billed(
    db: &DatabaseConnection,
    client_id: i64,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<bool> {
    let existing = Debt::find()
        .filter(debt::Column::ClientId.eq(client_id))
        .filter(debt::Column::DueDate.gte(start))
        .filter(debt::Column::DueDate.lt(end))
        .count(db)
        .await?;
    Ok(existing > 0)
}

async fn bill_client(
    db: &DatabaseConnection,
    client: &client::Model,
    concept: &str,
    due_date: NaiveDate,
    period: (NaiveDate, NaiveDate),
) -> Result<ClientOutcome> {
    let total = client.total_fee();
    if total <= 0.0 {
        return Ok(ClientOutcome::SkippedNoFee);
    }
    if already_billed(db, client.id, period.0, period.1).await? {
        return Ok(ClientOutcome::SkippedAlreadyBilled);
    }

    let created = debts::insert_debt(
        db,
        NewDebt {
            client_id: client.id,
            concept: concept.to_string(),
            original_amount: total,
            due_date,
        },
    )
    .await?;
    Ok(ClientOutcome::Created {
        debt_id: created.id,
        amount: created.original_amount,
    })
}

/// Issues this month's debts. See [`generate_monthly_debts_on`].
pub async fn generate_monthly_debts(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    billing: &BillingConfig,
) -> Result<MonthlyRunReport> {
    generate_monthly_debts_on(db, ctx, billing, debts::today()).await
}

/// Issues one debt per active client for the month containing `today`.
///
/// # Arguments
/// * `db` - Database connection
/// * `ctx` - Caller; must be allowed to run monthly billing
/// * `billing` - Due day and concept prefix
/// * `today` - Any day of the month to bill
///
/// # Returns
/// A report with one outcome per active client. Per-client failures are
/// reported there, not as an `Err`.
#[instrument(skip(db, ctx, billing))]
pub async fn generate_monthly_debts_on(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    billing: &BillingConfig,
    today: NaiveDate,
) -> Result<MonthlyRunReport> {
    ctx.require(Operation::RunMonthlyBilling)?;
    billing.validate()?;

    let (period, next_period) = month_bounds(today)?;
    let due_date = period.with_day(billing.due_day).ok_or_else(|| Error::Config {
        message: format!("Invalid due day {}", billing.due_day),
    })?;
    let concept = format!("{} {}", billing.concept_prefix.trim(), today.format("%B %Y"));

    let clients = Client::find()
        .filter(client::Column::Active.eq(true))
        .order_by_asc(client::Column::Id)
        .all(db)
        .await?;
    info!("Generating monthly debts for {} active clients", clients.len());

    let mut results = Vec::with_capacity(clients.len());
    for client in clients {
        let outcome = match bill_client(db, &client, &concept, due_date, (period, next_period)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Could not bill client {}: {}", client.id, e);
                ClientOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        results.push(ClientBillingResult {
            client_id: client.id,
            client_name: client.full_name(),
            outcome,
        });
    }

    let report = MonthlyRunReport {
        period,
        due_date,
        concept,
        results,
    };
    info!(
        "Monthly generation finished: {} created, {} skipped, {} failed",
        report.created_count(),
        report.skipped_count(),
        report.failed_count()
    );

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "monthly debts generated")
            .on("deudas", None)
            .after(Some(serde_json::json!({
                "period": report.period,
                "created": report.created_count(),
                "skipped": report.skipped_count(),
                "failed": report.failed_count(),
            }))),
    )
    .await;

    Ok(report)
}

/// Formats a run report into a human-readable summary string.
#[must_use]
pub fn format_monthly_run_report(report: &MonthlyRunReport) -> String {
    use std::fmt::Write;

    let mut summary = format!(
        "Monthly Billing - {} - Processed {} clients\n",
        report.period.format("%B %Y"),
        report.results.len()
    );

    // Writing to a String cannot fail
    let _ = write!(
        summary,
        "  Created: {} | Skipped: {} | Failed: {} | Billed: {} (due {})\n\n",
        report.created_count(),
        report.skipped_count(),
        report.failed_count(),
        format_amount(report.total_billed()),
        report.due_date
    );

    for result in &report.results {
        let line = match &result.outcome {
            ClientOutcome::Created { debt_id, amount } => {
                format!("Created debt {debt_id} for {}", format_amount(*amount))
            }
            ClientOutcome::SkippedNoFee => "Skipped, no fees assigned".to_string(),
            ClientOutcome::SkippedAlreadyBilled => "Skipped, already billed this month".to_string(),
            ClientOutcome::Failed { reason } => format!("FAILED: {reason}"),
        };
        let _ = writeln!(
            summary,
            "  #{} {} | {}",
            result.client_id, result.client_name, line
        );
    }

    summary
}
