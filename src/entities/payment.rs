//! Payment entity - A money transfer received from a client.
//!
//! A payment always belongs to a client. When it was applied to a debt the link
//! and the portion that actually reduced the balance are kept on the row, so the
//! reconciliation can be audited and reversed.
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Payment database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "pagos")]
pub struct Model {
    /// Unique identifier for the payment
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Client who paid
    pub client_id: i64,
    /// Debt this payment was applied to, if any
    pub debt_id: Option<i64>,
    /// Amount received
    pub amount: f64,
    /// Part of `amount` that reduced the debt (less than `amount` on overpayment)
    pub applied_amount: f64,
    /// Date the money was received
    pub payment_date: Date,
    /// Cash, transfer, card...
    pub method: Option<String>,
    /// Bank or receipt reference
    pub reference: Option<String>,
    /// Free-text note
    pub description: Option<String>,
    /// When the payment was entered into the system
    pub registered_at: DateTimeUtc,
}

/// Defines relationships between Payment and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each payment belongs to one client
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id",
        on_delete = "Cascade"
    )]
    Client,
    /// Debt the payment was applied to
    #[sea_orm(
        belongs_to = "super::debt::Entity",
        from = "Column::DebtId",
        to = "super::debt::Column::Id",
        on_delete = "SetNull"
    )]
    Debt,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::debt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Debt.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
