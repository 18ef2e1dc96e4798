//! Dashboard figures.
//!
//! Read-only aggregates over clients, users, debts and payments. All functions are
//! framework-agnostic and return structured data for whatever renders the
//! dashboard.

use crate::{
    core::{
        access::{Operation, RequestContext},
        monthly::month_bounds,
        payment::PaymentWithClient,
    },
    entities::{Client, Debt, DebtStatus, Payment, User, client, debt, payment, user},
    errors::Result,
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, QuerySelect, prelude::*};
use serde::Serialize;

/// An unpaid debt past its due date, with its client.
pub type OverdueDebt = (debt::Model, Option<client::Model>);

/// Everything the dashboard shows.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    /// Registered clients, active or not
    pub total_clients: u64,
    /// Users that can log in
    pub total_active_users: u64,
    /// Sum of pending amounts over debts not marked paid
    pub total_pending_debt: f64,
    /// Sum of payments dated in the current month
    pub payments_this_month: f64,
    /// Latest payments with their client
    pub recent_payments: Vec<PaymentWithClient>,
    /// Latest registered clients
    pub recent_clients: Vec<client::Model>,
    /// Debts past due, oldest first
    pub overdue_debts: Vec<OverdueDebt>,
}

/// Number of rows shown in the "recent" lists.
pub const RECENT_LIMIT: u64 = 5;

/// Number of registered clients, active or not.
pub async fn total_clients(db: &DatabaseConnection, ctx: &RequestContext) -> Result<u64> {
    ctx.require(Operation::ViewDashboard)?;
    Client::find().count(db).await.map_err(Into::into)
}

/// Number of users that can log in.
pub async fn total_active_users(db: &DatabaseConnection, ctx: &RequestContext) -> Result<u64> {
    ctx.require(Operation::ViewDashboard)?;
    User::find()
        .filter(user::Column::Active.eq(true))
        .count(db)
        .await
        .map_err(Into::into)
}

/// Sum of `pending_amount` over every debt not marked paid.
pub async fn total_pending_debt(db: &DatabaseConnection, ctx: &RequestContext) -> Result<f64> {
    ctx.require(Operation::ViewDashboard)?;
    let open = Debt::find()
        .filter(debt::Column::Status.ne(DebtStatus::Paid))
        .all(db)
        .await?;
    Ok(open.iter().map(|d| d.pending_amount).sum())
}

/// Sum of payment amounts dated in the month containing `today`.
pub async fn total_payments_in_month(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    today: NaiveDate,
) -> Result<f64> {
    ctx.require(Operation::ViewDashboard)?;
    let (start, end) = month_bounds(today)?;

    let payments = Payment::find()
        .filter(payment::Column::PaymentDate.gte(start))
        .filter(payment::Column::PaymentDate.lt(end))
        .all(db)
        .await?;
    Ok(payments.iter().map(|p| p.amount).sum())
}

/// Most recently entered payments with their client.
pub async fn recent_payments(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    limit: u64,
) -> Result<Vec<PaymentWithClient>> {
    ctx.require(Operation::ViewDashboard)?;
    Payment::find()
        .find_also_related(Client)
        .order_by_desc(payment::Column::RegisteredAt)
        .order_by_desc(payment::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Most recently registered clients.
pub async fn recent_clients(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    limit: u64,
) -> Result<Vec<client::Model>> {
    ctx.require(Operation::ViewDashboard)?;
    Client::find()
        .order_by_desc(client::Column::RegisteredAt)
        .order_by_desc(client::Column::Id)
        .limit(limit)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Debts with something pending whose due date is before `today`.
///
/// Filters on the dates rather than the stored status, so debts whose status
/// has not been refreshed yet are included.
pub async fn overdue_debts(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    today: NaiveDate,
) -> Result<Vec<OverdueDebt>> {
    ctx.require(Operation::ViewDashboard)?;
    Debt::find()
        .find_also_related(Client)
        .filter(debt::Column::Status.ne(DebtStatus::Paid))
        .filter(debt::Column::PendingAmount.gt(0.0))
        .filter(debt::Column::DueDate.lt(today))
        .order_by_asc(debt::Column::DueDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Collects every dashboard figure as of `today`.
///
/// # Errors
/// Returns [`PermissionDenied`](crate::errors::Error::PermissionDenied) for roles that may not view the dashboard.
pub async fn dashboard_summary(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    today: NaiveDate,
) -> Result<DashboardSummary> {
    ctx.require(Operation::ViewDashboard)?;

    Ok(DashboardSummary {
        total_clients: total_clients(db, ctx).await?,
        total_active_users: total_active_users(db, ctx).await?,
        total_pending_debt: total_pending_debt(db, ctx).await?,
        payments_this_month: total_payments_in_month(db, ctx, today).await?,
        recent_payments: recent_payments(db, ctx, RECENT_LIMIT).await?,
        recent_clients: recent_clients(db, ctx, RECENT_LIMIT).await?,
        overdue_debts: overdue_debts(db, ctx, today).await?,
    })
}

/// Formats an amount as currency with thousands separators, e.g. `$1,500.00`.
#[must_use]
pub fn format_amount(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let fixed = format!("{:.2}", amount.abs());
    let (whole, cents) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, digit) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    format!("{sign}${grouped}.{cents}")
}
