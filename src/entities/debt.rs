//! Debt entity - A billable obligation owed by one client.
//!
//! `pending_amount` starts equal to `original_amount` and only moves down as
//! payments are applied. `status` is derived from the amounts and the due date
//! (see [`crate::core::debt::derive_status`]).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle label of a debt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum DebtStatus {
    /// Nothing paid yet and not past due
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Partly paid and not past due
    #[sea_orm(string_value = "partially_paid")]
    PartiallyPaid,
    /// Past due with a balance remaining
    #[sea_orm(string_value = "overdue")]
    Overdue,
    /// Nothing left to pay
    #[sea_orm(string_value = "paid")]
    Paid,
}

impl DebtStatus {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::PartiallyPaid => "partially_paid",
            Self::Overdue => "overdue",
            Self::Paid => "paid",
        }
    }
}

impl std::fmt::Display for DebtStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Debt database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "deudas")]
pub struct Model {
    /// Unique identifier for the debt
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Client who owes this debt
    pub client_id: i64,
    /// What the debt is for (e.g. "Monthly Service October 2026")
    pub concept: String,
    /// Amount billed
    pub original_amount: f64,
    /// Amount still owed, `0 <= pending_amount <= original_amount`
    pub pending_amount: f64,
    /// Last day the debt can be paid without becoming overdue
    pub due_date: Date,
    /// Derived lifecycle label
    pub status: DebtStatus,
    /// When the debt was created
    pub created_at: DateTimeUtc,
}

/// Defines relationships between Debt and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each debt belongs to one client
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id",
        on_delete = "Cascade"
    )]
    Client,
    /// Payments that were applied to this debt
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
