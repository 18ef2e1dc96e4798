//! Billing cycle configuration loaded from config.toml
//!
//! The monthly generator needs two settings: which day of the month new debts fall
//! due, and the prefix of the debt concept. Both have defaults so a missing file is
//! not an error.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Billing cycle settings
    #[serde(default)]
    pub billing: BillingConfig,
}

/// Settings for the monthly debt generator
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BillingConfig {
    /// Day of the month monthly debts fall due
    pub due_day: u32,
    /// Concept prefix, followed by "<Month> <Year>"
    pub concept_prefix: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            due_day: 5,
            concept_prefix: "Monthly Service".to_string(),
        }
    }
}

impl BillingConfig {
    /// Rejects due days that do not exist in every month.
    pub fn validate(&self) -> Result<()> {
        if !(1..=28).contains(&self.due_day) {
            return Err(Error::Config {
                message: format!("billing.due_day must be between 1 and 28, got {}", self.due_day),
            });
        }
        if self.concept_prefix.trim().is_empty() {
            return Err(Error::Config {
                message: "billing.concept_prefix cannot be empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads configuration from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - The billing section holds out-of-range values
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file: {e}"),
    })?;

    let config: Config = toml::from_str(&contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })?;
    config.billing.validate()?;
    Ok(config)
}

/// Loads ./config.toml, or the defaults when the file does not exist.
pub fn load_default_config() -> Result<Config> {
    let path = Path::new("config.toml");
    if !path.exists() {
        tracing::info!("config.toml not found, using default billing settings");
        return Ok(Config::default());
    }
    load_config(path)
}
