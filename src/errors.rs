//! Unified error type for the billing core.
//!
//! Store failures are classified when they cross into this type so callers can
//! tell an unreachable database from a duplicate key from any other rejected write.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Every failure the billing core reports.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration file or environment value is missing or malformed.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// The store could not be reached.
    #[error("Database unreachable: {message}")]
    ConnectionFailure {
        /// Driver message
        message: String,
    },

    /// No client with this id.
    #[error("Client not found: {id}")]
    ClientNotFound {
        /// Requested id
        id: i64,
    },

    /// No debt with this id.
    #[error("Debt not found: {id}")]
    DebtNotFound {
        /// Requested id
        id: i64,
    },

    /// No payment with this id.
    #[error("Payment not found: {id}")]
    PaymentNotFound {
        /// Requested id
        id: i64,
    },

    /// No user with this id.
    #[error("User not found: {id}")]
    UserNotFound {
        /// Requested id
        id: i64,
    },

    /// Another client already uses this national id.
    #[error("A client with national ID {national_id} is already registered")]
    DuplicateNationalId {
        /// The national id already in use
        national_id: String,
    },

    /// The store rejected a write on a unique index.
    #[error("Duplicate entry: {message}")]
    DuplicateKey {
        /// Driver message naming the index
        message: String,
    },

    /// Input failed a business rule.
    #[error("Validation failed: {message}")]
    Validation {
        /// Which rule failed
        message: String,
    },

    /// Amount is negative, zero where not allowed, or not finite.
    #[error("Invalid amount: {amount}")]
    InvalidAmount {
        /// The rejected amount
        amount: f64,
    },

    /// The caller's role does not allow the operation.
    #[error("Role '{role}' is not allowed to {operation}")]
    PermissionDenied {
        /// Caller's role
        role: String,
        /// Operation that was refused
        operation: String,
    },

    /// Login failed. Does not say which half was wrong.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Argon2 could not hash or parse a password hash.
    #[error("Password hashing failed: {message}")]
    PasswordHash {
        /// Argon2 message
        message: String,
    },

    /// Any other store failure.
    #[error("Database error: {0}")]
    Persistence(DbErr),

    /// File system failure, e.g. reading `config.toml`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable present but not valid unicode.
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    /// Audit snapshot could not be serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        if matches!(err, DbErr::Conn(_) | DbErr::ConnectionAcquire(_)) {
            return Self::ConnectionFailure {
                message: err.to_string(),
            };
        }
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(message)) => Self::DuplicateKey { message },
            _ => Self::Persistence(err),
        }
    }
}

impl From<argon2::password_hash::Error> for Error {
    fn from(err: argon2::password_hash::Error) -> Self {
        Self::PasswordHash {
            message: err.to_string(),
        }
    }
}

/// Message class shown to the person operating the back office.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageClass {
    /// The request was understood but rejected; the operator can correct it.
    Warning,
    /// Infrastructure failure; nothing the operator typed caused it.
    Error,
}

impl Error {
    /// Maps the error onto the warning/error split used by every mutating page.
    #[must_use]
    pub const fn message_class(&self) -> MessageClass {
        match self {
            Self::ClientNotFound { .. }
            | Self::DebtNotFound { .. }
            | Self::PaymentNotFound { .. }
            | Self::UserNotFound { .. }
            | Self::DuplicateNationalId { .. }
            | Self::DuplicateKey { .. }
            | Self::Validation { .. }
            | Self::InvalidAmount { .. }
            | Self::PermissionDenied { .. }
            | Self::InvalidCredentials => MessageClass::Warning,
            Self::Config { .. }
            | Self::ConnectionFailure { .. }
            | Self::PasswordHash { .. }
            | Self::Persistence(_)
            | Self::Io(_)
            | Self::EnvVar(_)
            | Self::Json(_) => MessageClass::Error,
        }
    }

    /// True for both flavours of duplicate-key rejection.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(
            self,
            Self::DuplicateNationalId { .. } | Self::DuplicateKey { .. }
        )
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
