//! Shared test utilities for the billing core.
//!
//! This module provides common helper functions for setting up test databases
//! and creating test entities with sensible defaults.

use crate::{
    core::{
        access::RequestContext,
        client::{self, NewClient},
        debt::{self, NewDebt},
        user::{self, NewUser},
    },
    entities::{self, Role},
    errors::Result,
};
use chrono::{Duration, NaiveDate};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Administrator context attributed to user 1.
#[must_use]
pub fn admin_ctx() -> RequestContext {
    RequestContext::new(1, Role::Admin)
}

/// Client fields with sensible defaults.
///
/// # Defaults
/// * name: "Juan Perez"
/// * `cable_fee`: 1000.0
/// * `internet_fee`: 500.0
/// * `combined_fee`: 0.0
#[must_use]
pub fn sample_client(national_id: &str) -> NewClient {
    NewClient {
        national_id: national_id.to_string(),
        first_name: "Juan".to_string(),
        last_name: "Perez".to_string(),
        address: Some("Av. Siempre Viva 742".to_string()),
        email: None,
        cable_fee: 1000.0,
        internet_fee: 500.0,
        combined_fee: 0.0,
    }
}

/// Creates a test client from [`sample_client`].
pub async fn create_test_client(
    db: &DatabaseConnection,
    national_id: &str,
) -> Result<entities::client::Model> {
    client::create_client(db, &admin_ctx(), sample_client(national_id)).await
}

/// Creates a test client with custom name and fees.
pub async fn create_custom_client(
    db: &DatabaseConnection,
    national_id: &str,
    first_name: &str,
    last_name: &str,
    cable_fee: f64,
    internet_fee: f64,
    combined_fee: f64,
) -> Result<entities::client::Model> {
    client::create_client(
        db,
        &admin_ctx(),
        NewClient {
            national_id: national_id.to_string(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            cable_fee,
            internet_fee,
            combined_fee,
            ..NewClient::default()
        },
    )
    .await
}

/// Creates a debt in status `pending` with `pending == original`.
pub async fn create_test_debt(
    db: &DatabaseConnection,
    client_id: i64,
    amount: f64,
    due_date: NaiveDate,
) -> Result<entities::debt::Model> {
    debt::insert_debt(
        db,
        NewDebt {
            client_id,
            concept: "Monthly Service".to_string(),
            original_amount: amount,
            due_date,
        },
    )
    .await
}

/// Database with one client and one 1500.00 debt due in ten days.
pub async fn setup_with_debt() -> Result<(
    DatabaseConnection,
    entities::client::Model,
    entities::debt::Model,
)> {
    let db = setup_test_db().await?;
    let client = create_test_client(&db, "30111222").await?;
    let due = debt::today() + Duration::days(10);
    let debt = create_test_debt(&db, client.id, 1500.0, due).await?;
    Ok((db, client, debt))
}

/// Creates an active user with no linked client.
pub async fn create_test_user(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    role: Role,
) -> Result<entities::user::Model> {
    user::create_user(
        db,
        &admin_ctx(),
        NewUser {
            username: username.to_string(),
            password: password.to_string(),
            email: None,
            role,
            client_id: None,
        },
    )
    .await
}
