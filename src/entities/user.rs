//! User entity - Back-office login accounts.
//!
//! Passwords are stored as PHC hash strings (or, for accounts that have not
//! logged in since the hash migration, as legacy SHA-256 hex digests).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Role attached to a login. Stored with the names the back office has always used.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum Role {
    /// Full access, including the audit log
    #[sea_orm(string_value = "administrador")]
    #[serde(rename = "administrador")]
    Admin,
    /// Day-to-day data entry
    #[sea_orm(string_value = "editor")]
    #[serde(rename = "editor")]
    Editor,
    /// Read-only staff account
    #[sea_orm(string_value = "visor")]
    #[serde(rename = "visor")]
    Viewer,
    /// A subscriber looking at their own account
    #[sea_orm(string_value = "cliente")]
    #[serde(rename = "cliente")]
    Client,
}

impl Role {
    /// Stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "administrador",
            Self::Editor => "editor",
            Self::Viewer => "visor",
            Self::Client => "cliente",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "usuario")]
pub struct Model {
    /// Unique identifier for the user
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Login name
    #[sea_orm(unique)]
    pub username: String,
    /// Salted password hash, never serialized
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// Contact email
    pub email: Option<String>,
    /// Permission level
    pub role: Role,
    /// Inactive users cannot log in
    pub active: bool,
    /// Client record a `cliente` login is allowed to see
    pub client_id: Option<i64>,
    /// When the account was created
    pub created_at: DateTimeUtc,
}

/// `User` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
