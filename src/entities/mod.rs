//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the back-office tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod audit_record;
pub mod client;
pub mod debt;
pub mod payment;
pub mod user;

// Re-export specific types to avoid conflicts
pub use audit_record::{
    Column as AuditRecordColumn, Entity as AuditRecord, Model as AuditRecordModel,
};
pub use client::{Column as ClientColumn, Entity as Client, Model as ClientModel};
pub use debt::{Column as DebtColumn, DebtStatus, Entity as Debt, Model as DebtModel};
pub use payment::{Column as PaymentColumn, Entity as Payment, Model as PaymentModel};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel, Role};
