/// Billing cycle settings loaded from config.toml
pub mod billing;

/// Database configuration and connection management
pub mod database;

/// Bootstrap administrator credentials from environment variables
pub mod users;
