//! Core business logic - framework-agnostic operations over the billing tables.
//!
//! Every operation that acts on behalf of a person takes a [`access::RequestContext`]
//! and checks it before touching the database.

/// Request context and the role capability map
pub mod access;
/// Append-only audit trail
pub mod audit;
/// Client ledger (billing profiles)
pub mod client;
/// Password hashing and two-tier verification
pub mod credentials;
/// Debt lifecycle and status derivation
pub mod debt;
/// Monthly debt generation
pub mod monthly;
/// Payment recording and application against debts
pub mod payment;
/// Dashboard figures
pub mod report;
/// User accounts and login
pub mod user;
