//! Audit trail business logic.
//!
//! One row per state-changing action: who, what, which row, the state before and
//! after, and where the request came from. Rows are only ever inserted.
//!
//! Mutating operations go through [`record_or_warn`]: a failed audit write is logged
//! and the primary operation still reports success.

use crate::{
    core::access::{Operation, RequestContext},
    entities::{AuditRecord, audit_record},
    errors::Result,
};
use sea_orm::{QueryOrder, Set, prelude::*};
use serde::Serialize;
use tracing::warn;

/// An audit row waiting to be written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditEntry {
    /// User who acted, `None` when unauthenticated
    pub actor_id: Option<i64>,
    /// Description of the action
    pub action: String,
    /// Table touched
    pub affected_table: Option<String>,
    /// Row touched
    pub affected_record_id: Option<i64>,
    /// State before the change
    pub before: Option<Json>,
    /// State after the change
    pub after: Option<Json>,
    /// Request source address
    pub source_address: Option<String>,
}

impl AuditEntry {
    /// Entry attributed to the principal of `ctx`.
    #[must_use]
    pub fn new(ctx: &RequestContext, action: impl Into<String>) -> Self {
        Self {
            actor_id: ctx.user_id,
            action: action.into(),
            source_address: ctx.source_address.clone(),
            ..Self::default()
        }
    }

    /// Entry with no actor, e.g. a failed login.
    #[must_use]
    pub fn anonymous(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Self::default()
        }
    }

    /// Names the affected table and row.
    #[must_use]
    pub fn on(mut self, table: &str, record_id: Option<i64>) -> Self {
        self.affected_table = Some(table.to_string());
        self.affected_record_id = record_id;
        self
    }

    /// Sets the before-state snapshot.
    #[must_use]
    pub fn before(mut self, state: Option<Json>) -> Self {
        self.before = state;
        self
    }

    /// Sets the after-state snapshot.
    #[must_use]
    pub fn after(mut self, state: Option<Json>) -> Self {
        self.after = state;
        self
    }
}

/// Serializes `value` for an audit column. Failure only drops the snapshot.
pub fn snapshot<T: Serialize>(value: &T) -> Option<Json> {
    serde_json::to_value(value)
        .inspect_err(|e| warn!("Could not serialize audit snapshot: {}", e))
        .ok()
}

/// Persists one audit row and returns its id.
pub async fn record<C>(db: &C, entry: AuditEntry) -> Result<i64>
where
    C: ConnectionTrait,
{
    let row = audit_record::ActiveModel {
        actor_id: Set(entry.actor_id),
        action: Set(entry.action),
        affected_table: Set(entry.affected_table),
        affected_record_id: Set(entry.affected_record_id),
        before_state: Set(entry.before),
        after_state: Set(entry.after),
        source_address: Set(entry.source_address),
        recorded_at: Set(chrono::Utc::now()),
        ..Default::default()
    };

    let inserted = row.insert(db).await?;
    Ok(inserted.id)
}

/// Like [`record`], but a failure is logged instead of returned.
pub async fn record_or_warn<C>(db: &C, entry: AuditEntry) -> Option<i64>
where
    C: ConnectionTrait,
{
    let action = entry.action.clone();
    record(db, entry)
        .await
        .inspect_err(|e| warn!("Audit write for '{}' failed: {}", action, e))
        .ok()
}

/// All audit rows, newest first.
pub async fn list_audit_records(
    db: &DatabaseConnection,
    ctx: &RequestContext,
) -> Result<Vec<audit_record::Model>> {
    ctx.require(Operation::ReadAudit)?;
    AuditRecord::find()
        .order_by_desc(audit_record::Column::RecordedAt)
        .order_by_desc(audit_record::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Audit rows attributed to one user, newest first.
pub async fn list_audit_records_for_user(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    user_id: i64,
) -> Result<Vec<audit_record::Model>> {
    ctx.require(Operation::ReadAudit)?;
    AuditRecord::find()
        .filter(audit_record::Column::ActorId.eq(user_id))
        .order_by_desc(audit_record::Column::RecordedAt)
        .order_by_desc(audit_record::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}
