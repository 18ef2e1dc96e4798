//! Payment business logic - Recording payments and applying them to debts.
//!
//! Applying a payment to a debt is one database transaction: the payment row is
//! inserted, the debt's pending amount is reduced by a single conditional
//! `UPDATE` that cannot go below zero, and the debt's status is re-derived. Two
//! payments racing on the same debt therefore always leave
//! `pending = max(0, pending - a - b)`.
//!
//! An amount larger than what is pending is accepted, clamped, and the surplus is
//! reported back in [`PaymentApplication::overpayment`].

use crate::{
    core::{
        access::{Operation, RequestContext},
        audit::{self, AuditEntry, snapshot},
        debt::{recompute_status_on, today},
    },
    entities::{Client, Debt, Payment, client, debt, payment},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{
    Condition, DbErr, QueryOrder, Set, SqlErr, TransactionTrait, prelude::*, sea_query::Expr,
};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

const TABLE: &str = "pagos";

/// A payment listed with the client who made it.
pub type PaymentWithClient = (payment::Model, Option<client::Model>);

/// Fields for a payment applied against a debt.
#[derive(Debug, Clone)]
pub struct PaymentForDebt {
    /// Client who paid. Stored as given, not checked against the debt's owner.
    pub client_id: i64,
    /// Debt to reduce
    pub debt_id: i64,
    /// Amount received, must be positive
    pub amount: f64,
    /// Defaults to today
    pub payment_date: Option<NaiveDate>,
    /// Cash, transfer, card...
    pub method: Option<String>,
    /// Receipt or transfer number
    pub reference: Option<String>,
    /// Free-text note
    pub description: Option<String>,
}

/// Fields for a payment not tied to a debt.
#[derive(Debug, Clone)]
pub struct NewPayment {
    /// Client who paid
    pub client_id: i64,
    /// Amount received, must be positive
    pub amount: f64,
    /// Defaults to today
    pub payment_date: Option<NaiveDate>,
    /// Cash, transfer, card...
    pub method: Option<String>,
    /// Receipt or transfer number
    pub reference: Option<String>,
    /// Free-text note
    pub description: Option<String>,
}

/// Editable payment fields. Amount and links are fixed once recorded.
#[derive(Debug, Clone, Default)]
pub struct PaymentPatch {
    /// Date the money was received
    pub payment_date: Option<NaiveDate>,
    /// Payment method
    pub method: Option<Option<String>>,
    /// Receipt or transfer number
    pub reference: Option<Option<String>>,
    /// Free-text note
    pub description: Option<Option<String>>,
}

impl PaymentPatch {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.payment_date.is_none()
            && self.method.is_none()
            && self.reference.is_none()
            && self.description.is_none()
    }
}

/// Outcome of applying a payment to a debt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentApplication {
    /// The stored payment
    pub payment: payment::Model,
    /// The debt after the payment
    pub debt: debt::Model,
    /// Part of the amount that exceeded what was pending
    pub overpayment: f64,
}

fn validate_amount(amount: f64) -> Result<()> {
    if amount <= 0.0 || !amount.is_finite() {
        return Err(Error::InvalidAmount { amount });
    }
    Ok(())
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// A payment referencing a missing client fails its foreign key.
fn client_fk_or(err: DbErr, client_id: i64) -> Error {
    match err.sql_err() {
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => Error::ClientNotFound { id: client_id },
        _ => err.into(),
    }
}

/// Applies a payment to a debt.
///
/// Inside one transaction: insert the payment, reduce the debt's pending amount
/// by `amount` (floored at zero), link the payment to the debt with the amount
/// actually applied, and re-derive the debt's status. A failed status refresh is
/// logged and does not undo the payment. An audit record is written after commit.
///
/// # Errors
/// - [`Error::InvalidAmount`] if `amount` is zero, negative or not finite
/// - [`Error::ClientNotFound`] if the client does not exist
/// - [`Error::DebtNotFound`] if the debt does not exist; nothing is persisted
#[instrument(skip(db, ctx, input), fields(debt_id = input.debt_id, amount = input.amount))]
pub async fn process_payment_for_debt(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    input: PaymentForDebt,
) -> Result<PaymentApplication> {
    ctx.require(Operation::ManagePayments)?;
    validate_amount(input.amount)?;

    let today = today();
    let debt_id = input.debt_id;
    let amount = input.amount;

    let txn = db.begin().await?;

    let inserted = payment::ActiveModel {
        client_id: Set(input.client_id),
        debt_id: Set(None),
        amount: Set(amount),
        applied_amount: Set(0.0),
        payment_date: Set(input.payment_date.unwrap_or(today)),
        method: Set(trimmed(input.method)),
        reference: Set(trimmed(input.reference)),
        description: Set(trimmed(input.description)),
        registered_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(&txn)
    .await
    .map_err(|e| client_fk_or(e, input.client_id))?;

    let before = Debt::find_by_id(debt_id)
        .one(&txn)
        .await?
        .ok_or(Error::DebtNotFound { id: debt_id })?;
    if before.client_id != input.client_id {
        debug!(
            "Payment client {} differs from debt owner {}",
            input.client_id, before.client_id
        );
    }

    // pending = max(0, pending - amount), evaluated by the store
    Debt::update_many()
        .col_expr(
            debt::Column::PendingAmount,
            Expr::cust_with_values("MAX(0.0, pending_amount - ?)", [amount]),
        )
        .filter(debt::Column::Id.eq(debt_id))
        .exec(&txn)
        .await?;

    let reduced = Debt::find_by_id(debt_id)
        .one(&txn)
        .await?
        .ok_or(Error::DebtNotFound { id: debt_id })?;
    let applied = before.pending_amount - reduced.pending_amount;
    let overpayment = amount - applied;

    let mut link: payment::ActiveModel = inserted.into();
    link.debt_id = Set(Some(debt_id));
    link.applied_amount = Set(applied);
    let payment = link.update(&txn).await?;

    let debt = match recompute_status_on(&txn, debt_id, today).await {
        Ok(refreshed) => refreshed,
        Err(e) => {
            warn!("Payment {} applied but status of debt {} not refreshed: {}", payment.id, debt_id, e);
            reduced
        }
    };

    txn.commit().await?;

    if overpayment > 0.0 {
        warn!(
            "Payment {} exceeds pending amount of debt {} by {:.2}",
            payment.id, debt_id, overpayment
        );
    }
    info!(
        "Payment {} of {:.2} applied to debt {}: pending {:.2} -> {:.2} ({})",
        payment.id, amount, debt_id, before.pending_amount, debt.pending_amount, debt.status
    );

    let application = PaymentApplication {
        payment,
        debt,
        overpayment,
    };

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "payment applied")
            .on(TABLE, Some(application.payment.id))
            .before(snapshot(&before))
            .after(snapshot(&application)),
    )
    .await;

    Ok(application)
}

/// Records a payment without applying it to any debt.
///
/// # Errors
/// - [`Error::InvalidAmount`] if `amount` is zero, negative or not finite
/// - [`Error::ClientNotFound`] if the client does not exist
#[instrument(skip(db, ctx, new), fields(client_id = new.client_id))]
pub async fn record_payment(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    new: NewPayment,
) -> Result<payment::Model> {
    ctx.require(Operation::ManagePayments)?;
    validate_amount(new.amount)?;

    let created = payment::ActiveModel {
        client_id: Set(new.client_id),
        debt_id: Set(None),
        amount: Set(new.amount),
        applied_amount: Set(0.0),
        payment_date: Set(new.payment_date.unwrap_or_else(today)),
        method: Set(trimmed(new.method)),
        reference: Set(trimmed(new.reference)),
        description: Set(trimmed(new.description)),
        registered_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(|e| client_fk_or(e, new.client_id))?;

    info!("Payment {} of {:.2} recorded for client {}", created.id, created.amount, created.client_id);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "payment recorded")
            .on(TABLE, Some(created.id))
            .after(snapshot(&created)),
    )
    .await;

    Ok(created)
}

/// Finds a payment by id.
pub async fn get_payment(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    payment_id: i64,
) -> Result<Option<payment::Model>> {
    ctx.require(Operation::ReadPayments)?;
    Payment::find_by_id(payment_id).one(db).await.map_err(Into::into)
}

/// Lists payments with their client, most recent first.
/// `search` matches client first name, last name or national ID.
pub async fn list_payments(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    search: Option<&str>,
) -> Result<Vec<PaymentWithClient>> {
    ctx.require(Operation::ReadPayments)?;

    let mut query = Payment::find().find_also_related(Client);
    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        query = query.filter(
            Condition::any()
                .add(client::Column::FirstName.contains(term))
                .add(client::Column::LastName.contains(term))
                .add(client::Column::NationalId.contains(term)),
        );
    }

    query
        .order_by_desc(payment::Column::PaymentDate)
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Lists one client's payments, most recent first.
pub async fn list_payments_for_client(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    client_id: i64,
) -> Result<Vec<payment::Model>> {
    ctx.require_client_scope(client_id)?;
    Payment::find()
        .filter(payment::Column::ClientId.eq(client_id))
        .order_by_desc(payment::Column::PaymentDate)
        .order_by_desc(payment::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Corrects the descriptive fields of a payment.
///
/// # Errors
/// - [`Error::Validation`] for an empty patch
/// - [`Error::PaymentNotFound`] if the payment does not exist
#[instrument(skip(db, ctx, patch))]
pub async fn update_payment(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    payment_id: i64,
    patch: PaymentPatch,
) -> Result<payment::Model> {
    ctx.require(Operation::ManagePayments)?;
    if patch.is_empty() {
        return Err(Error::Validation {
            message: "Nothing to update".to_string(),
        });
    }

    let original = Payment::find_by_id(payment_id)
        .one(db)
        .await?
        .ok_or(Error::PaymentNotFound { id: payment_id })?;

    let mut active: payment::ActiveModel = original.clone().into();
    if let Some(date) = patch.payment_date {
        active.payment_date = Set(date);
    }
    if let Some(method) = patch.method {
        active.method = Set(trimmed(method));
    }
    if let Some(reference) = patch.reference {
        active.reference = Set(trimmed(reference));
    }
    if let Some(description) = patch.description {
        active.description = Set(trimmed(description));
    }
    let updated = active.update(db).await?;

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "payment updated")
            .on(TABLE, Some(payment_id))
            .before(snapshot(&original))
            .after(snapshot(&updated)),
    )
    .await;

    Ok(updated)
}

/// Deletes a payment. If it had been applied to a debt, the applied amount is
/// returned to the debt's pending balance (never above the original amount) and
/// the debt's status is re-derived, all in one transaction.
///
/// # Errors
/// Returns [`Error::PaymentNotFound`] if the payment does not exist.
#[instrument(skip(db, ctx))]
pub async fn delete_payment(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    payment_id: i64,
) -> Result<()> {
    ctx.require(Operation::ManagePayments)?;

    let txn = db.begin().await?;

    let original = Payment::find_by_id(payment_id)
        .one(&txn)
        .await?
        .ok_or(Error::PaymentNotFound { id: payment_id })?;
    let before = snapshot(&original);
    let reversal = original
        .debt_id
        .filter(|_| original.applied_amount > 0.0)
        .map(|debt_id| (debt_id, original.applied_amount));

    original.delete(&txn).await?;

    if let Some((debt_id, applied)) = reversal {
        // pending = min(original, pending + applied)
        Debt::update_many()
            .col_expr(
                debt::Column::PendingAmount,
                Expr::cust_with_values("MIN(original_amount, pending_amount + ?)", [applied]),
            )
            .filter(debt::Column::Id.eq(debt_id))
            .exec(&txn)
            .await?;
        if let Err(e) = recompute_status_on(&txn, debt_id, today()).await {
            warn!("Status of debt {} not refreshed after reversal: {}", debt_id, e);
        }
        info!("Returned {:.2} to debt {}", applied, debt_id);
    }

    txn.commit().await?;
    info!("Payment {} deleted", payment_id);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "payment deleted")
            .on(TABLE, Some(payment_id))
            .before(before),
    )
    .await;

    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::debt::{self as debts, AccountStanding};
    use crate::entities::{AuditRecord, DebtStatus, Role};
    use crate::test_utils::*;
    use chrono::Duration;

    fn pay(client_id: i64, debt_id: i64, amount: f64) -> PaymentForDebt {
        PaymentForDebt {
            client_id,
            debt_id,
            amount,
            payment_date: None,
            method: Some("cash".to_string()),
            reference: None,
            description: None,
        }
    }

    #[tokio::test]
    async fn test_partial_then_final_payment() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();

        let first = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 500.0)).await?;
        assert_eq!(first.debt.pending_amount, 1000.0);
        assert_eq!(first.debt.status, DebtStatus::PartiallyPaid);
        assert_eq!(first.payment.applied_amount, 500.0);
        assert_eq!(first.payment.debt_id, Some(debt.id));
        assert_eq!(first.overpayment, 0.0);

        let second = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 1000.0)).await?;
        assert_eq!(second.debt.pending_amount, 0.0);
        assert_eq!(second.debt.status, DebtStatus::Paid);

        let payments = Payment::find()
            .filter(payment::Column::ClientId.eq(client.id))
            .count(&db)
            .await?;
        assert_eq!(payments, 2);
        assert!(!debts::has_pending_debts(&db, client.id).await?);
        Ok(())
    }

    #[tokio::test]
    async fn test_overpayment_is_clamped_and_reported() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;

        let result = process_payment_for_debt(&db, &admin_ctx(), pay(client.id, debt.id, 2000.0)).await?;
        assert_eq!(result.debt.pending_amount, 0.0);
        assert_eq!(result.debt.status, DebtStatus::Paid);
        assert_eq!(result.payment.amount, 2000.0);
        assert_eq!(result.payment.applied_amount, 1500.0);
        assert_eq!(result.overpayment, 500.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_amounts_persist_nothing() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();

        for amount in [0.0, -100.0, f64::NAN] {
            let result = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, amount)).await;
            assert!(matches!(result, Err(Error::InvalidAmount { .. })));
        }

        assert_eq!(Payment::find().count(&db).await?, 0);
        let stored = Debt::find_by_id(debt.id).one(&db).await?.unwrap();
        assert_eq!(stored.pending_amount, 1500.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_debt_rolls_back_payment() -> Result<()> {
        let (db, client, _debt) = setup_with_debt().await?;

        let result = process_payment_for_debt(&db, &admin_ctx(), pay(client.id, 999, 100.0)).await;
        assert!(matches!(result, Err(Error::DebtNotFound { id: 999 })));
        assert_eq!(Payment::find().count(&db).await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_client_is_reported() -> Result<()> {
        let (db, _client, debt) = setup_with_debt().await?;

        let result = process_payment_for_debt(&db, &admin_ctx(), pay(4040, debt.id, 100.0)).await;
        assert!(matches!(result, Err(Error::ClientNotFound { id: 4040 })));
        let stored = Debt::find_by_id(debt.id).one(&db).await?.unwrap();
        assert_eq!(stored.pending_amount, 1500.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_payment_on_overdue_debt_stays_overdue() -> Result<()> {
        let db = setup_test_db().await?;
        let client = create_test_client(&db, "30111222").await?;
        let debt = create_test_debt(&db, client.id, 1500.0, today() - Duration::days(2)).await?;

        let result = process_payment_for_debt(&db, &admin_ctx(), pay(client.id, debt.id, 500.0)).await?;
        assert_eq!(result.debt.pending_amount, 1000.0);
        assert_eq!(result.debt.status, DebtStatus::Overdue);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_never_lose_an_update() -> Result<()> {
        // In-memory databases are limited to one connection, so use a file.
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let path = std::env::temp_dir().join(format!(
            "cable_billing_{}_{nanos}.sqlite",
            std::process::id()
        ));
        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = sea_orm::Database::connect(
            sea_orm::ConnectOptions::new(url)
                .max_connections(8)
                .sqlx_logging(false)
                .to_owned(),
        )
        .await?;
        crate::config::database::create_tables(&db).await?;

        let client = create_test_client(&db, "30111222").await?;
        let debt = create_test_debt(&db, client.id, 10_000.0, today() + Duration::days(10)).await?;

        let shared = std::sync::Arc::new(db);
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let db = std::sync::Arc::clone(&shared);
                let input = pay(client.id, debt.id, 100.0);
                tokio::spawn(async move { process_payment_for_debt(&*db, &admin_ctx(), input).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap()?;
        }
        let db = std::sync::Arc::try_unwrap(shared).expect("all tasks finished");

        let stored = Debt::find_by_id(debt.id).one(&db).await?.unwrap();
        let applied: f64 = Payment::find()
            .filter(payment::Column::DebtId.eq(debt.id))
            .all(&db)
            .await?
            .iter()
            .map(|p| p.applied_amount)
            .sum();
        assert_eq!(stored.pending_amount, 8000.0);
        assert_eq!(applied, 2000.0);
        assert_eq!(stored.pending_amount + applied, stored.original_amount);
        assert_eq!(stored.status, DebtStatus::PartiallyPaid);

        db.close().await?;
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_status_refresh_keeps_the_payment() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        db.execute_unprepared(
            "CREATE TRIGGER lock_debt_status BEFORE UPDATE OF status ON deudas \
             BEGIN SELECT RAISE(ABORT, 'status locked'); END;",
        )
        .await?;

        let result = process_payment_for_debt(&db, &admin_ctx(), pay(client.id, debt.id, 600.0)).await?;
        assert_eq!(result.payment.applied_amount, 600.0);
        assert_eq!(result.debt.pending_amount, 900.0);
        assert_eq!(result.debt.status, DebtStatus::Pending);

        let stored = Debt::find_by_id(debt.id).one(&db).await?.unwrap();
        assert_eq!(stored.pending_amount, 900.0);
        assert_eq!(stored.status, DebtStatus::Pending);
        assert_eq!(Payment::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_pending_never_leaves_bounds() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();

        for amount in [100.0, 1200.0, 300.0, 50.0] {
            let result = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, amount)).await?;
            assert!(result.debt.pending_amount >= 0.0);
            assert!(result.debt.pending_amount <= result.debt.original_amount);
        }
        let stored = Debt::find_by_id(debt.id).one(&db).await?.unwrap();
        assert_eq!(stored.pending_amount, 0.0);
        assert_eq!(stored.status, DebtStatus::Paid);
        Ok(())
    }

    #[tokio::test]
    async fn test_status_check_before_and_after_settling() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();

        let check = debts::client_payment_status(&db, &ctx, client.id).await?;
        assert_eq!(check.status, AccountStanding::InDebt);

        process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 1500.0)).await?;
        let check = debts::client_payment_status(&db, &ctx, client.id).await?;
        assert_eq!(check.status, AccountStanding::UpToDate);
        Ok(())
    }

    #[tokio::test]
    async fn test_viewer_cannot_apply_payments() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let viewer = RequestContext::new(3, Role::Viewer);

        let result = process_payment_for_debt(&db, &viewer, pay(client.id, debt.id, 10.0)).await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_application_is_audited() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx().with_source_address("192.168.1.20");

        let result = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 500.0)).await?;

        let row = AuditRecord::find()
            .filter(crate::entities::AuditRecordColumn::Action.eq("payment applied"))
            .one(&db)
            .await?
            .unwrap();
        assert_eq!(row.affected_record_id, Some(result.payment.id));
        assert_eq!(row.source_address.as_deref(), Some("192.168.1.20"));
        assert_eq!(row.before_state.unwrap()["pending_amount"], 1500.0);
        assert_eq!(row.after_state.unwrap()["debt"]["pending_amount"], 1000.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_record_and_list_payments() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = admin_ctx();
        let juan = create_custom_client(&db, "111", "Juan", "Perez", 100.0, 0.0, 0.0).await?;
        let ana = create_custom_client(&db, "222", "Ana", "Gomez", 100.0, 0.0, 0.0).await?;

        let new = |client_id, amount, day| NewPayment {
            client_id,
            amount,
            payment_date: NaiveDate::from_ymd_opt(2026, 9, day),
            method: Some("  transfer ".to_string()),
            reference: Some(String::new()),
            description: None,
        };
        let first = record_payment(&db, &ctx, new(juan.id, 100.0, 1)).await?;
        assert_eq!(first.method.as_deref(), Some("transfer"));
        assert_eq!(first.reference, None);
        assert_eq!(first.debt_id, None);
        record_payment(&db, &ctx, new(ana.id, 200.0, 15)).await?;

        let all = list_payments(&db, &ctx, None).await?;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0.amount, 200.0);
        assert_eq!(all[0].1.as_ref().unwrap().first_name, "Ana");

        let found = list_payments(&db, &ctx, Some("perez")).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.id, first.id);

        let own = list_payments_for_client(&db, &ctx, juan.id).await?;
        assert_eq!(own.len(), 1);

        assert!(matches!(
            record_payment(&db, &ctx, new(999, 10.0, 1)).await,
            Err(Error::ClientNotFound { id: 999 })
        ));
        assert!(matches!(
            record_payment(&db, &ctx, new(juan.id, -1.0, 1)).await,
            Err(Error::InvalidAmount { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_payment_descriptive_fields() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();
        let applied = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 300.0)).await?;

        let patch = PaymentPatch {
            method: Some(None),
            reference: Some(Some("TRX-778".to_string())),
            ..PaymentPatch::default()
        };
        let updated = update_payment(&db, &ctx, applied.payment.id, patch).await?;
        assert_eq!(updated.method, None);
        assert_eq!(updated.reference.as_deref(), Some("TRX-778"));
        assert_eq!(updated.amount, 300.0);

        assert!(matches!(
            update_payment(&db, &ctx, applied.payment.id, PaymentPatch::default()).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            update_payment(
                &db,
                &ctx,
                999,
                PaymentPatch {
                    method: Some(Some("cash".to_string())),
                    ..PaymentPatch::default()
                }
            )
            .await,
            Err(Error::PaymentNotFound { id: 999 })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_payment_restores_applied_amount() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();

        let over = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 2000.0)).await?;
        assert_eq!(over.debt.status, DebtStatus::Paid);

        delete_payment(&db, &ctx, over.payment.id).await?;

        let stored = Debt::find_by_id(debt.id).one(&db).await?.unwrap();
        assert_eq!(stored.pending_amount, 1500.0);
        assert_eq!(stored.status, DebtStatus::Pending);
        assert!(Payment::find_by_id(over.payment.id).one(&db).await?.is_none());

        assert!(matches!(
            delete_payment(&db, &ctx, over.payment.id).await,
            Err(Error::PaymentNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_deleting_debt_unlinks_payments() -> Result<()> {
        let (db, client, debt) = setup_with_debt().await?;
        let ctx = admin_ctx();
        let applied = process_payment_for_debt(&db, &ctx, pay(client.id, debt.id, 300.0)).await?;

        debts::delete_debt(&db, &ctx, debt.id).await?;

        let kept = Payment::find_by_id(applied.payment.id).one(&db).await?.unwrap();
        assert_eq!(kept.debt_id, None);
        assert_eq!(kept.amount, 300.0);

        // Nothing left to restore
        delete_payment(&db, &ctx, kept.id).await?;
        Ok(())
    }
}
