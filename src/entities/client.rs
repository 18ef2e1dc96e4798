//! Client entity - A subscriber and its monthly billing profile.
//!
//! The three fee columns describe what the client is billed each cycle. They are
//! mutually exclusive in practice but the generator sums them unconditionally.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Client database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cliente")]
pub struct Model {
    /// Unique identifier for the client
    #[sea_orm(primary_key)]
    pub id: i64,
    /// National identity document number, unique across all clients
    #[sea_orm(unique)]
    pub national_id: String,
    /// Given name
    pub first_name: String,
    /// Family name
    pub last_name: String,
    /// Service address
    pub address: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Monthly fee for cable-only service
    pub cable_fee: f64,
    /// Monthly fee for internet-only service
    pub internet_fee: f64,
    /// Monthly fee for the combined cable + internet bundle
    pub combined_fee: f64,
    /// Inactive clients are skipped by the monthly generator
    pub active: bool,
    /// When the client was registered
    pub registered_at: DateTimeUtc,
}

impl Model {
    /// Sum of every fee on the profile.
    #[must_use]
    pub fn total_fee(&self) -> f64 {
        self.cable_fee + self.internet_fee + self.combined_fee
    }

    /// "First Last" for reports.
    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Defines relationships between Client and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One client has many debts
    #[sea_orm(has_many = "super::debt::Entity")]
    Debts,
    /// One client has many payments
    #[sea_orm(has_many = "super::payment::Entity")]
    Payments,
}

impl Related<super::debt::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Debts.def()
    }
}

impl Related<super::payment::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Payments.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
