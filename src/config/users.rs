//! Bootstrap administrator configuration.
//!
//! A fresh database has no login able to create other logins. The generator binary
//! reads `ADMIN_USERNAME` and `ADMIN_PASSWORD` from the environment (usually via
//! `.env`) and seeds an administrator when none exists.

/// Credentials for the first administrator account.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    /// Login name
    pub username: String,
    /// Plain-text password, hashed before it is stored
    pub password: String,
}

/// Reads the bootstrap administrator from the environment.
///
/// # Returns
///
/// `Some` only when both variables are set and non-empty.
#[must_use]
pub fn get_bootstrap_admin() -> Option<BootstrapAdmin> {
    let username = std::env::var("ADMIN_USERNAME").ok()?;
    let password = std::env::var("ADMIN_PASSWORD").ok()?;
    from_parts(username, password)
}

fn from_parts(username: String, password: String) -> Option<BootstrapAdmin> {
    if username.trim().is_empty() || password.is_empty() {
        return None;
    }
    Some(BootstrapAdmin {
        username: username.trim().to_string(),
        password,
    })
}
