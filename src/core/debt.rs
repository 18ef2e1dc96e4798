//! Debt business logic - Creation, status derivation, patching and deletion of debts.
//!
//! A debt's status is never trusted as stored: it is a function of the pending and
//! original amounts, the due date and the current date ([`derive_status`]). It is
//! recomputed after every mutation and refreshed whenever debts are listed; the
//! stored value is only rewritten when the derived one differs.
//!
//! All amounts satisfy `0 <= pending_amount <= original_amount` after every
//! operation in this module and in [`crate::core::payment`].

use crate::{
    core::{
        access::{Operation, RequestContext},
        audit::{self, AuditEntry, snapshot},
    },
    entities::{Client, Debt, DebtStatus, debt},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

const TABLE: &str = "deudas";

/// Today's date as used for status derivation.
#[must_use]
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Derives a debt's status.
///
/// - nothing pending → [`DebtStatus::Paid`]
/// - something pending and past the due date → [`DebtStatus::Overdue`], however much was paid
/// - partly paid, not yet due → [`DebtStatus::PartiallyPaid`]
/// - untouched, not yet due → [`DebtStatus::Pending`]
#[must_use]
pub fn derive_status(
    pending: f64,
    original: f64,
    due_date: NaiveDate,
    today: NaiveDate,
) -> DebtStatus {
    if pending <= 0.0 {
        DebtStatus::Paid
    } else if today > due_date {
        DebtStatus::Overdue
    } else if pending < original {
        DebtStatus::PartiallyPaid
    } else {
        DebtStatus::Pending
    }
}

fn validate_amounts(original: f64, pending: f64) -> Result<()> {
    if original <= 0.0 || !original.is_finite() {
        return Err(Error::InvalidAmount { amount: original });
    }
    if !pending.is_finite() || pending < 0.0 || pending > original {
        return Err(Error::Validation {
            message: format!("Pending amount {pending:.2} must be between 0 and {original:.2}"),
        });
    }
    Ok(())
}

/// Fields for a new debt.
#[derive(Debug, Clone)]
pub struct NewDebt {
    /// Client who owes the debt
    pub client_id: i64,
    /// What the debt is for
    pub concept: String,
    /// Amount billed, must be positive
    pub original_amount: f64,
    /// Due date
    pub due_date: NaiveDate,
}

/// Partial update of a debt. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default)]
pub struct DebtPatch {
    /// Move the debt to another client
    pub client_id: Option<i64>,
    /// What the debt is for
    pub concept: Option<String>,
    /// Amount billed
    pub original_amount: Option<f64>,
    /// Amount still owed
    pub pending_amount: Option<f64>,
    /// Due date
    pub due_date: Option<NaiveDate>,
    /// Stored as given; the next recomputation may overwrite it
    pub status: Option<DebtStatus>,
}

impl DebtPatch {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.client_id.is_none()
            && self.concept.is_none()
            && self.original_amount.is_none()
            && self.pending_amount.is_none()
            && self.due_date.is_none()
            && self.status.is_none()
    }
}

/// Inserts a debt with `pending = original` and status `pending`, after checking the
/// client exists. Shared by [`create_debt`] and the monthly generator.
pub(crate) async fn insert_debt<C>(db: &C, new: NewDebt) -> Result<debt::Model>
where
    C: ConnectionTrait,
{
    let concept = new.concept.trim().to_string();
    if concept.is_empty() {
        return Err(Error::Validation {
            message: "Debt concept cannot be empty".to_string(),
        });
    }
    validate_amounts(new.original_amount, new.original_amount)?;

    if Client::find_by_id(new.client_id).one(db).await?.is_none() {
        return Err(Error::ClientNotFound { id: new.client_id });
    }

    let model = debt::ActiveModel {
        client_id: Set(new.client_id),
        concept: Set(concept),
        original_amount: Set(new.original_amount),
        pending_amount: Set(new.original_amount),
        due_date: Set(new.due_date),
        status: Set(DebtStatus::Pending),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    model.insert(db).await.map_err(Into::into)
}

/// Creates a debt for a client.
///
/// # Errors
/// - [`Error::InvalidAmount`] if the amount is zero, negative or not finite
/// - [`Error::Validation`] for an empty concept
/// - [`Error::ClientNotFound`] if the client does not exist
#[instrument(skip(db, ctx, new), fields(client_id = new.client_id))]
pub async fn create_debt(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    new: NewDebt,
) -> Result<debt::Model> {
    ctx.require(Operation::ManageDebts)?;

    let created = insert_debt(db, new).await?;
    info!(
        "Debt {} created for client {}: {:.2}",
        created.id, created.client_id, created.original_amount
    );

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "debt created")
            .on(TABLE, Some(created.id))
            .after(snapshot(&created)),
    )
    .await;

    Ok(created)
}

/// Rewrites `model.status` if it differs from the derived one. Returns the up-to-date model.
async fn refresh_model<C>(db: &C, model: debt::Model, today: NaiveDate) -> Result<debt::Model>
where
    C: ConnectionTrait,
{
    let derived = derive_status(
        model.pending_amount,
        model.original_amount,
        model.due_date,
        today,
    );
    if derived == model.status {
        return Ok(model);
    }

    debug!("Debt {} status {} -> {}", model.id, model.status, derived);
    let mut active: debt::ActiveModel = model.into();
    active.status = Set(derived);
    active.update(db).await.map_err(Into::into)
}

/// Recomputes and persists a debt's status as of `today`.
///
/// Idempotent: a second call with no intervening mutation writes nothing.
///
/// # Errors
/// Returns [`Error::DebtNotFound`] if the debt does not exist.
pub async fn recompute_status_on<C>(db: &C, debt_id: i64, today: NaiveDate) -> Result<debt::Model>
where
    C: ConnectionTrait,
{
    let model = Debt::find_by_id(debt_id)
        .one(db)
        .await?
        .ok_or(Error::DebtNotFound { id: debt_id })?;
    refresh_model(db, model, today).await
}

/// Recomputes and persists a debt's status as of today.
pub async fn recompute_status<C>(db: &C, debt_id: i64) -> Result<debt::Model>
where
    C: ConnectionTrait,
{
    recompute_status_on(db, debt_id, today()).await
}

/// Refreshes a listing. A failed refresh keeps the stored row and is only logged.
async fn refresh_listing(
    db: &DatabaseConnection,
    debts: Vec<debt::Model>,
    today: NaiveDate,
) -> Vec<debt::Model> {
    let mut refreshed = Vec::with_capacity(debts.len());
    for model in debts {
        let fallback = model.clone();
        match refresh_model(db, model, today).await {
            Ok(current) => refreshed.push(current),
            Err(e) => {
                warn!("Could not refresh status of debt {}: {}", fallback.id, e);
                refreshed.push(fallback);
            }
        }
    }
    refreshed
}

/// Finds a debt by id, subject to the caller's client scope.
pub async fn get_debt(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    debt_id: i64,
) -> Result<Option<debt::Model>> {
    let Some(model) = Debt::find_by_id(debt_id).one(db).await? else {
        return Ok(None);
    };
    ctx.require_client_scope(model.client_id)?;
    Ok(Some(model))
}

/// Lists every debt by due date, newest first within a date, with statuses refreshed.
pub async fn list_debts(
    db: &DatabaseConnection,
    ctx: &RequestContext,
) -> Result<Vec<debt::Model>> {
    ctx.require(Operation::ReadAllDebts)?;
    let debts = Debt::find()
        .order_by_asc(debt::Column::DueDate)
        .order_by_desc(debt::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(refresh_listing(db, debts, today()).await)
}

/// Lists one client's debts. Client logins may only list their own.
pub async fn list_debts_for_client(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    client_id: i64,
) -> Result<Vec<debt::Model>> {
    ctx.require_client_scope(client_id)?;
    let debts = Debt::find()
        .filter(debt::Column::ClientId.eq(client_id))
        .order_by_asc(debt::Column::DueDate)
        .order_by_desc(debt::Column::CreatedAt)
        .all(db)
        .await?;
    Ok(refresh_listing(db, debts, today()).await)
}

/// Applies a typed patch to a debt. Last writer wins.
///
/// A status given in the patch is stored verbatim. Without one, the status is
/// recomputed from the patched amounts and due date.
///
/// # Errors
/// - [`Error::Validation`] for an empty patch, an empty concept, or amounts that
///   would break `0 <= pending <= original`
/// - [`Error::InvalidAmount`] for a non-positive original amount
/// - [`Error::DebtNotFound`] / [`Error::ClientNotFound`] for missing rows
#[instrument(skip(db, ctx, patch))]
pub async fn update_debt(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    debt_id: i64,
    patch: DebtPatch,
) -> Result<debt::Model> {
    ctx.require(Operation::ManageDebts)?;

    if patch.is_empty() {
        return Err(Error::Validation {
            message: "Nothing to update".to_string(),
        });
    }

    let original = Debt::find_by_id(debt_id)
        .one(db)
        .await?
        .ok_or(Error::DebtNotFound { id: debt_id })?;

    let original_amount = patch.original_amount.unwrap_or(original.original_amount);
    let pending_amount = patch.pending_amount.unwrap_or(original.pending_amount);
    validate_amounts(original_amount, pending_amount)?;

    let mut active: debt::ActiveModel = original.clone().into();
    if let Some(client_id) = patch.client_id {
        if Client::find_by_id(client_id).one(db).await?.is_none() {
            return Err(Error::ClientNotFound { id: client_id });
        }
        active.client_id = Set(client_id);
    }
    if let Some(concept) = patch.concept {
        let concept = concept.trim().to_string();
        if concept.is_empty() {
            return Err(Error::Validation {
                message: "Debt concept cannot be empty".to_string(),
            });
        }
        active.concept = Set(concept);
    }
    active.original_amount = Set(original_amount);
    active.pending_amount = Set(pending_amount);
    let due_date = patch.due_date.unwrap_or(original.due_date);
    active.due_date = Set(due_date);
    active.status = Set(patch.status.unwrap_or_else(|| {
        derive_status(pending_amount, original_amount, due_date, today())
    }));

    let updated = active.update(db).await?;

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "debt updated")
            .on(TABLE, Some(debt_id))
            .before(snapshot(&original))
            .after(snapshot(&updated)),
    )
    .await;

    Ok(updated)
}

/// Hard-deletes a debt. Payments that were applied to it keep their amounts and lose
/// the link.
///
/// # Errors
/// Returns [`Error::DebtNotFound`] if the debt does not exist.
#[instrument(skip(db, ctx))]
pub async fn delete_debt(db: &DatabaseConnection, ctx: &RequestContext, debt_id: i64) -> Result<()> {
    ctx.require(Operation::ManageDebts)?;

    let original = Debt::find_by_id(debt_id)
        .one(db)
        .await?
        .ok_or(Error::DebtNotFound { id: debt_id })?;

    let before = snapshot(&original);
    original.delete(db).await?;
    info!("Debt {} deleted", debt_id);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "debt deleted")
            .on(TABLE, Some(debt_id))
            .before(before),
    )
    .await;

    Ok(())
}

/// True if the client has any debt not marked paid.
pub(crate) async fn has_pending_debts<C>(db: &C, client_id: i64) -> Result<bool>
where
    C: ConnectionTrait,
{
    let open = Debt::find()
        .filter(debt::Column::ClientId.eq(client_id))
        .filter(debt::Column::Status.ne(DebtStatus::Paid))
        .count(db)
        .await?;
    Ok(open > 0)
}

/// Whether a client may submit a new payment without settling older debt first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStanding {
    /// No unpaid debt
    #[serde(rename = "al_dia")]
    UpToDate,
    /// At least one unpaid debt
    #[serde(rename = "con_deuda")]
    InDebt,
}

/// Body returned to the payment form: `{"status": "al_dia" | "con_deuda"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheck {
    /// Standing of the client
    pub status: AccountStanding,
}

/// Status check used to gate the client-facing payment form.
pub async fn client_payment_status(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    client_id: i64,
) -> Result<StatusCheck> {
    ctx.require_client_scope(client_id)?;
    let status = if has_pending_debts(db, client_id).await? {
        AccountStanding::InDebt
    } else {
        AccountStanding::UpToDate
    };
    Ok(StatusCheck { status })
}
