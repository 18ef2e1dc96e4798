//! Audit record entity - Append-only trail of state-changing actions.
//!
//! Rows are never updated or deleted. The actor column carries no foreign key so
//! removing a user leaves the history untouched.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit record database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "auditoria")]
pub struct Model {
    /// Unique identifier for the record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// User who acted, `None` for unauthenticated actions such as failed logins
    pub actor_id: Option<i64>,
    /// What happened, e.g. "client created"
    pub action: String,
    /// Table touched by the action
    pub affected_table: Option<String>,
    /// Primary key of the touched row
    pub affected_record_id: Option<i64>,
    /// Snapshot before the change
    pub before_state: Option<Json>,
    /// Snapshot after the change
    pub after_state: Option<Json>,
    /// Network address the request came from
    pub source_address: Option<String>,
    /// When the action happened
    pub recorded_at: DateTimeUtc,
}

/// The audit table references nothing.
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
