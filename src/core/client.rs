//! Client ledger - CRUD for subscriber billing profiles.
//!
//! National IDs are unique. A duplicate is reported as
//! [`Error::DuplicateNationalId`] whether it is caught by the pre-insert lookup or
//! by the store's unique index, and no row is created either way.
//! Every successful mutation writes an audit record.

use crate::{
    core::{
        access::{Operation, RequestContext},
        audit::{self, AuditEntry, snapshot},
    },
    entities::{Client, client},
    errors::{Error, Result},
};
use sea_orm::{Condition, QueryOrder, Set, prelude::*};
use tracing::{info, instrument};

const TABLE: &str = "cliente";

/// Fields for a new client.
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    /// National identity document number
    pub national_id: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Service address
    pub address: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Cable-only monthly fee
    pub cable_fee: f64,
    /// Internet-only monthly fee
    pub internet_fee: f64,
    /// Combined monthly fee
    pub combined_fee: f64,
}

/// Partial update of a client. `None` leaves the column unchanged;
/// `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default)]
pub struct ClientPatch {
    /// New national ID, must stay unique
    pub national_id: Option<String>,
    /// Given name
    pub first_name: Option<String>,
    /// Family name
    pub last_name: Option<String>,
    /// Service address
    pub address: Option<Option<String>>,
    /// Contact email
    pub email: Option<Option<String>>,
    /// Cable-only monthly fee
    pub cable_fee: Option<f64>,
    /// Internet-only monthly fee
    pub internet_fee: Option<f64>,
    /// Combined monthly fee
    pub combined_fee: Option<f64>,
    /// Inactive clients are skipped by the monthly run
    pub active: Option<bool>,
}

impl ClientPatch {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.national_id.is_none()
            && self.first_name.is_none()
            && self.last_name.is_none()
            && self.address.is_none()
            && self.email.is_none()
            && self.cable_fee.is_none()
            && self.internet_fee.is_none()
            && self.combined_fee.is_none()
            && self.active.is_none()
    }
}

fn require_text(value: &str, field: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation {
            message: format!("{field} cannot be empty"),
        });
    }
    Ok(trimmed.to_string())
}

fn validate_fee(fee: f64) -> Result<f64> {
    if fee < 0.0 || !fee.is_finite() {
        return Err(Error::InvalidAmount { amount: fee });
    }
    Ok(fee)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn duplicate_or(err: Error, national_id: &str) -> Error {
    if err.is_duplicate() {
        Error::DuplicateNationalId {
            national_id: national_id.to_string(),
        }
    } else {
        err
    }
}

async fn national_id_taken(
    db: &DatabaseConnection,
    national_id: &str,
    except_id: Option<i64>,
) -> Result<bool> {
    let mut query = Client::find().filter(client::Column::NationalId.eq(national_id));
    if let Some(id) = except_id {
        query = query.filter(client::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

/// Registers a new client.
///
/// # Errors
/// - [`Error::Validation`] for a blank national ID or name
/// - [`Error::InvalidAmount`] for a negative or non-finite fee
/// - [`Error::DuplicateNationalId`] if the national ID is already registered
#[instrument(skip(db, ctx, new), fields(national_id = %new.national_id))]
pub async fn create_client(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    new: NewClient,
) -> Result<client::Model> {
    ctx.require(Operation::ManageClients)?;

    let national_id = require_text(&new.national_id, "National ID")?;
    let first_name = require_text(&new.first_name, "First name")?;
    let last_name = require_text(&new.last_name, "Last name")?;
    let cable_fee = validate_fee(new.cable_fee)?;
    let internet_fee = validate_fee(new.internet_fee)?;
    let combined_fee = validate_fee(new.combined_fee)?;

    if national_id_taken(db, &national_id, None).await? {
        return Err(Error::DuplicateNationalId { national_id });
    }

    let model = client::ActiveModel {
        national_id: Set(national_id.clone()),
        first_name: Set(first_name),
        last_name: Set(last_name),
        address: Set(non_blank(new.address)),
        email: Set(non_blank(new.email)),
        cable_fee: Set(cable_fee),
        internet_fee: Set(internet_fee),
        combined_fee: Set(combined_fee),
        active: Set(true),
        registered_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let created = model
        .insert(db)
        .await
        .map_err(|e| duplicate_or(e.into(), &national_id))?;
    info!("Client {} created", created.id);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "client created")
            .on(TABLE, Some(created.id))
            .after(snapshot(&created)),
    )
    .await;

    Ok(created)
}

/// Finds a client by id.
pub async fn get_client(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    client_id: i64,
) -> Result<Option<client::Model>> {
    ctx.require(Operation::ReadClients)?;
    Client::find_by_id(client_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists clients by last name, then first name. `search` matches either name or the
/// national ID as a substring.
pub async fn list_clients(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    search: Option<&str>,
) -> Result<Vec<client::Model>> {
    ctx.require(Operation::ReadClients)?;

    let mut query = Client::find();
    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        query = query.filter(
            Condition::any()
                .add(client::Column::FirstName.contains(term))
                .add(client::Column::LastName.contains(term))
                .add(client::Column::NationalId.contains(term)),
        );
    }

    query
        .order_by_asc(client::Column::LastName)
        .order_by_asc(client::Column::FirstName)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a typed patch to a client.
///
/// # Errors
/// - [`Error::Validation`] for an empty patch or blank required text
/// - [`Error::ClientNotFound`] if the client does not exist
/// - [`Error::DuplicateNationalId`] if the new national ID belongs to another client
#[instrument(skip(db, ctx, patch))]
pub async fn update_client(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    client_id: i64,
    patch: ClientPatch,
) -> Result<client::Model> {
    ctx.require(Operation::ManageClients)?;

    if patch.is_empty() {
        return Err(Error::Validation {
            message: "Nothing to update".to_string(),
        });
    }

    let original = Client::find_by_id(client_id)
        .one(db)
        .await?
        .ok_or(Error::ClientNotFound { id: client_id })?;
    let mut active: client::ActiveModel = original.clone().into();

    let mut checked_id = original.national_id.clone();
    if let Some(national_id) = patch.national_id {
        let national_id = require_text(&national_id, "National ID")?;
        if national_id_taken(db, &national_id, Some(client_id)).await? {
            return Err(Error::DuplicateNationalId { national_id });
        }
        checked_id.clone_from(&national_id);
        active.national_id = Set(national_id);
    }
    if let Some(first_name) = patch.first_name {
        active.first_name = Set(require_text(&first_name, "First name")?);
    }
    if let Some(last_name) = patch.last_name {
        active.last_name = Set(require_text(&last_name, "Last name")?);
    }
    if let Some(address) = patch.address {
        active.address = Set(non_blank(address));
    }
    if let Some(email) = patch.email {
        active.email = Set(non_blank(email));
    }
    if let Some(fee) = patch.cable_fee {
        active.cable_fee = Set(validate_fee(fee)?);
    }
    if let Some(fee) = patch.internet_fee {
        active.internet_fee = Set(validate_fee(fee)?);
    }
    if let Some(fee) = patch.combined_fee {
        active.combined_fee = Set(validate_fee(fee)?);
    }
    if let Some(flag) = patch.active {
        active.active = Set(flag);
    }

    let updated = active
        .update(db)
        .await
        .map_err(|e| duplicate_or(e.into(), &checked_id))?;

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "client updated")
            .on(TABLE, Some(client_id))
            .before(snapshot(&original))
            .after(snapshot(&updated)),
    )
    .await;

    Ok(updated)
}

/// Hard-deletes a client. Its debts and payments go with it.
///
/// # Errors
/// Returns [`Error::ClientNotFound`] if the client does not exist.
#[instrument(skip(db, ctx))]
pub async fn delete_client(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    client_id: i64,
) -> Result<()> {
    ctx.require(Operation::ManageClients)?;

    let original = Client::find_by_id(client_id)
        .one(db)
        .await?
        .ok_or(Error::ClientNotFound { id: client_id })?;

    let before = snapshot(&original);
    original.delete(db).await?;
    info!("Client {} deleted", client_id);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "client deleted")
            .on(TABLE, Some(client_id))
            .before(before),
    )
    .await;

    Ok(())
}
