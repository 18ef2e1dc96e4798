//! User account business logic - Back-office logins, roles and authentication.
//!
//! Passwords are only ever stored hashed. Accounts still holding a legacy digest
//! are upgraded to the current scheme the first time they log in successfully.

use crate::{
    config::users::BootstrapAdmin,
    core::{
        access::{Operation, RequestContext},
        audit::{self, AuditEntry, snapshot},
        credentials::{Verification, hash_password, verify_password},
    },
    entities::{Client, Role, User, user},
    errors::{Error, Result},
};
use chrono::Utc;
use sea_orm::{QueryOrder, Set, prelude::*};
use tracing::{info, instrument, warn};

const TABLE: &str = "usuario";

/// Fields for a new user account.
#[derive(Debug, Clone)]
pub struct NewUser {
    /// Login name, unique
    pub username: String,
    /// Plain text, hashed before storage
    pub password: String,
    /// Contact address
    pub email: Option<String>,
    /// What the account may do
    pub role: Role,
    /// Client record a `cliente` login may see
    pub client_id: Option<i64>,
}

/// Partial update of a user. `None` leaves the column unchanged;
/// `Some(None)` clears an optional column.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    /// New login name
    pub username: Option<String>,
    /// New plain-text password, rehashed
    pub password: Option<String>,
    /// Contact address
    pub email: Option<Option<String>>,
    /// New role
    pub role: Option<Role>,
    /// Inactive accounts cannot log in
    pub active: Option<bool>,
    /// Linked client for `cliente` logins
    pub client_id: Option<Option<i64>>,
}

impl UserPatch {
    /// True when no field is set.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.username.is_none()
            && self.password.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.active.is_none()
            && self.client_id.is_none()
    }
}

fn require_username(username: &str) -> Result<String> {
    let trimmed = username.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation {
            message: "Username cannot be empty".to_string(),
        });
    }
    Ok(trimmed.to_string())
}

fn require_password(password: &str) -> Result<()> {
    if password.is_empty() {
        return Err(Error::Validation {
            message: "Password cannot be empty".to_string(),
        });
    }
    Ok(())
}

fn username_taken_error(username: &str) -> Error {
    Error::DuplicateKey {
        message: format!("username '{username}' already exists"),
    }
}

async fn username_taken(
    db: &DatabaseConnection,
    username: &str,
    except_id: Option<i64>,
) -> Result<bool> {
    let mut query = User::find().filter(user::Column::Username.eq(username));
    if let Some(id) = except_id {
        query = query.filter(user::Column::Id.ne(id));
    }
    Ok(query.count(db).await? > 0)
}

async fn ensure_client_exists(db: &DatabaseConnection, client_id: Option<i64>) -> Result<()> {
    if let Some(id) = client_id {
        if Client::find_by_id(id).one(db).await?.is_none() {
            return Err(Error::ClientNotFound { id });
        }
    }
    Ok(())
}

async fn insert_user(db: &DatabaseConnection, new: NewUser) -> Result<user::Model> {
    let username = require_username(&new.username)?;
    require_password(&new.password)?;
    if username_taken(db, &username, None).await? {
        return Err(username_taken_error(&username));
    }
    ensure_client_exists(db, new.client_id).await?;

    let model = user::ActiveModel {
        username: Set(username.clone()),
        password_hash: Set(hash_password(&new.password)?),
        email: Set(new.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty())),
        role: Set(new.role),
        active: Set(true),
        client_id: Set(new.client_id),
        created_at: Set(Utc::now()),
        ..Default::default()
    };
    model.insert(db).await.map_err(|e| match Error::from(e) {
        Error::DuplicateKey { .. } => username_taken_error(&username),
        other => other,
    })
}

/// Creates a user account.
///
/// # Errors
/// - [`Error::Validation`] for an empty username or password
/// - [`Error::DuplicateKey`] if the username is taken
/// - [`Error::ClientNotFound`] if the linked client does not exist
#[instrument(skip(db, ctx, new), fields(username = %new.username, role = %new.role))]
pub async fn create_user(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    new: NewUser,
) -> Result<user::Model> {
    ctx.require(Operation::ManageUsers)?;

    let created = insert_user(db, new).await?;
    info!("User {} created with role {}", created.username, created.role);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "user created")
            .on(TABLE, Some(created.id))
            .after(snapshot(&created)),
    )
    .await;

    Ok(created)
}

/// Looks up a user by id.
pub async fn get_user(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    user_id: i64,
) -> Result<Option<user::Model>> {
    ctx.require(Operation::ReadUsers)?;
    User::find_by_id(user_id).one(db).await.map_err(Into::into)
}

/// Looks up a user by login name, ignoring surrounding whitespace.
pub async fn get_user_by_username(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    username: &str,
) -> Result<Option<user::Model>> {
    ctx.require(Operation::ReadUsers)?;
    User::find()
        .filter(user::Column::Username.eq(username.trim()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// All users ordered by username.
pub async fn list_users(db: &DatabaseConnection, ctx: &RequestContext) -> Result<Vec<user::Model>> {
    ctx.require(Operation::ReadUsers)?;
    User::find()
        .order_by_asc(user::Column::Username)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Users holding `role`, ordered by username.
pub async fn list_users_by_role(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    role: Role,
) -> Result<Vec<user::Model>> {
    ctx.require(Operation::ReadUsers)?;
    User::find()
        .filter(user::Column::Role.eq(role))
        .order_by_asc(user::Column::Username)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a typed patch to a user. A new password is hashed before storage.
///
/// # Errors
/// - [`Error::Validation`] for an empty patch, username or password
/// - [`Error::UserNotFound`] if the user does not exist
/// - [`Error::DuplicateKey`] if the new username is taken
#[instrument(skip(db, ctx, patch))]
pub async fn update_user(
    db: &DatabaseConnection,
    ctx: &RequestContext,
    user_id: i64,
    patch: UserPatch,
) -> Result<user::Model> {
    ctx.require(Operation::ManageUsers)?;
    if patch.is_empty() {
        return Err(Error::Validation {
            message: "Nothing to update".to_string(),
        });
    }

    let original = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::UserNotFound { id: user_id })?;

    let mut active: user::ActiveModel = original.clone().into();
    if let Some(username) = patch.username {
        let username = require_username(&username)?;
        if username_taken(db, &username, Some(user_id)).await? {
            return Err(username_taken_error(&username));
        }
        active.username = Set(username);
    }
    if let Some(password) = patch.password {
        require_password(&password)?;
        active.password_hash = Set(hash_password(&password)?);
    }
    if let Some(email) = patch.email {
        active.email = Set(email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()));
    }
    if let Some(role) = patch.role {
        active.role = Set(role);
    }
    if let Some(flag) = patch.active {
        active.active = Set(flag);
    }
    if let Some(client_id) = patch.client_id {
        ensure_client_exists(db, client_id).await?;
        active.client_id = Set(client_id);
    }

    let updated = active.update(db).await?;

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "user updated")
            .on(TABLE, Some(user_id))
            .before(snapshot(&original))
            .after(snapshot(&updated)),
    )
    .await;

    Ok(updated)
}

/// Hard-deletes a user. Audit rows keep the old actor id.
///
/// # Errors
/// Returns [`Error::UserNotFound`] if the user does not exist.
#[instrument(skip(db, ctx))]
pub async fn delete_user(db: &DatabaseConnection, ctx: &RequestContext, user_id: i64) -> Result<()> {
    ctx.require(Operation::ManageUsers)?;

    let original = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(Error::UserNotFound { id: user_id })?;

    let before = snapshot(&original);
    original.delete(db).await?;
    info!("User {} deleted", user_id);

    audit::record_or_warn(
        db,
        AuditEntry::new(ctx, "user deleted")
            .on(TABLE, Some(user_id))
            .before(before),
    )
    .await;

    Ok(())
}

async fn login_failed(db: &DatabaseConnection, username: &str, source_address: Option<&str>) -> Error {
    let mut entry = AuditEntry::anonymous("login failed")
        .on(TABLE, None)
        .after(Some(serde_json::json!({ "username": username })));
    entry.source_address = source_address.map(str::to_string);
    audit::record_or_warn(db, entry).await;
    Error::InvalidCredentials
}

/// Verifies a username and password and returns the context to act under.
///
/// Only active accounts can log in. A correct password stored under the legacy
/// scheme (or outdated parameters) is rehashed and saved; if that save fails the
/// login still succeeds and the failure is logged.
///
/// # Errors
/// Returns [`Error::InvalidCredentials`] for an unknown or inactive user or a
/// wrong password, without saying which.
#[instrument(skip(db, password))]
pub async fn authenticate(
    db: &DatabaseConnection,
    username: &str,
    password: &str,
    source_address: Option<&str>,
) -> Result<RequestContext> {
    let username = username.trim();
    let found = User::find()
        .filter(user::Column::Username.eq(username))
        .filter(user::Column::Active.eq(true))
        .one(db)
        .await?;

    let Some(account) = found else {
        return Err(login_failed(db, username, source_address).await);
    };

    let verification = verify_password(password, &account.password_hash);
    if !verification.is_match() {
        warn!("Failed login for '{}'", username);
        return Err(login_failed(db, username, source_address).await);
    }

    let mut ctx = RequestContext::new(account.id, account.role);
    ctx.client_id = account.client_id;
    ctx.source_address = source_address.map(str::to_string);

    if verification == Verification::NeedsRehash {
        let user_id = account.id;
        let rehashed = match hash_password(password) {
            Ok(hash) => {
                let mut active: user::ActiveModel = account.into();
                active.password_hash = Set(hash);
                active.update(db).await.map_err(Error::from)
            }
            Err(e) => Err(e),
        };
        match rehashed {
            Ok(_) => {
                info!("Password of user {} upgraded to the current hash scheme", user_id);
                audit::record_or_warn(
                    db,
                    AuditEntry::new(&ctx, "password rehashed").on(TABLE, Some(user_id)),
                )
                .await;
            }
            Err(e) => warn!("Could not rehash password of user {}: {}", user_id, e),
        }
    }

    audit::record_or_warn(
        db,
        AuditEntry::new(&ctx, "login succeeded").on(TABLE, ctx.user_id),
    )
    .await;

    Ok(ctx)
}

/// Creates the bootstrap administrator unless an administrator already exists.
///
/// # Returns
/// The new account, or `None` when nothing had to be created.
#[instrument(skip(db, admin), fields(username = %admin.username))]
pub async fn seed_admin(
    db: &DatabaseConnection,
    admin: &BootstrapAdmin,
) -> Result<Option<user::Model>> {
    let admins = User::find()
        .filter(user::Column::Role.eq(Role::Admin))
        .count(db)
        .await?;
    if admins > 0 {
        return Ok(None);
    }

    let created = insert_user(
        db,
        NewUser {
            username: admin.username.clone(),
            password: admin.password.clone(),
            email: None,
            role: Role::Admin,
            client_id: None,
        },
    )
    .await?;
    info!("Seeded administrator '{}'", created.username);

    audit::record_or_warn(
        db,
        AuditEntry::new(&RequestContext::system(), "administrator seeded")
            .on(TABLE, Some(created.id))
            .after(snapshot(&created)),
    )
    .await;

    Ok(Some(created))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::credentials::legacy_digest;
    use crate::entities::{AuditRecord, AuditRecordColumn};
    use crate::test_utils::*;

    async fn audit_actions(db: &DatabaseConnection) -> Vec<String> {
        AuditRecord::find()
            .order_by_asc(AuditRecordColumn::Id)
            .all(db)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.action)
            .collect()
    }

    #[tokio::test]
    async fn test_create_user_hashes_and_hides_password() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_user(&db, "maria", "s3cret", Role::Editor).await?;

        assert_ne!(created.password_hash, "s3cret");
        assert!(created.password_hash.starts_with("$argon2id$"));
        assert!(created.active);

        let json = serde_json::to_value(&created)?;
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "editor");

        let row = AuditRecord::find().one(&db).await?.unwrap();
        assert_eq!(row.action, "user created");
        assert!(row.after_state.unwrap().get("password_hash").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicates_and_blanks() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_user(&db, "maria", "pw", Role::Editor).await?;

        assert!(matches!(
            create_test_user(&db, " maria ", "pw", Role::Viewer).await,
            Err(Error::DuplicateKey { .. })
        ));
        assert!(matches!(
            create_test_user(&db, "  ", "pw", Role::Viewer).await,
            Err(Error::Validation { .. })
        ));
        assert!(matches!(
            create_test_user(&db, "pedro", "", Role::Viewer).await,
            Err(Error::Validation { .. })
        ));
        assert_eq!(User::find().count(&db).await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_editor_manages_users_viewer_cannot() -> Result<()> {
        let db = setup_test_db().await?;
        let viewer = RequestContext::new(2, Role::Viewer);
        let result = create_user(
            &db,
            &viewer,
            NewUser {
                username: "x".to_string(),
                password: "y".to_string(),
                email: None,
                role: Role::Admin,
                client_id: None,
            },
        )
        .await;
        assert!(matches!(result, Err(Error::PermissionDenied { .. })));
        assert!(list_users(&db, &viewer).await.is_err());

        let editor = RequestContext::new(3, Role::Editor);
        create_user(
            &db,
            &editor,
            NewUser {
                username: "x".to_string(),
                password: "y".to_string(),
                email: Some(" x@example.com ".to_string()),
                role: Role::Viewer,
                client_id: None,
            },
        )
        .await?;
        let found = get_user_by_username(&db, &editor, "x").await?.unwrap();
        assert_eq!(found.email.as_deref(), Some("x@example.com"));
        Ok(())
    }

    #[tokio::test]
    async fn test_update_user_patch() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = admin_ctx();
        let client = create_test_client(&db, "30111222").await?;
        let created = create_test_user(&db, "juan", "old", Role::Viewer).await?;
        create_test_user(&db, "ana", "pw", Role::Viewer).await?;

        let updated = update_user(
            &db,
            &ctx,
            created.id,
            UserPatch {
                password: Some("new".to_string()),
                role: Some(Role::Client),
                client_id: Some(Some(client.id)),
                ..UserPatch::default()
            },
        )
        .await?;
        assert_eq!(updated.role, Role::Client);
        assert_eq!(updated.client_id, Some(client.id));
        assert_ne!(updated.password_hash, created.password_hash);
        assert!(verify_password("new", &updated.password_hash).is_match());

        let rename = UserPatch {
            username: Some("ana".to_string()),
            ..UserPatch::default()
        };
        assert!(matches!(
            update_user(&db, &ctx, created.id, rename).await,
            Err(Error::DuplicateKey { .. })
        ));
        let bad_link = UserPatch {
            client_id: Some(Some(999)),
            ..UserPatch::default()
        };
        assert!(matches!(
            update_user(&db, &ctx, created.id, bad_link).await,
            Err(Error::ClientNotFound { id: 999 })
        ));
        assert!(matches!(
            update_user(&db, &ctx, created.id, UserPatch::default()).await,
            Err(Error::Validation { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_and_delete_users() -> Result<()> {
        let db = setup_test_db().await?;
        let ctx = admin_ctx();
        let zed = create_test_user(&db, "zed", "pw", Role::Editor).await?;
        create_test_user(&db, "amy", "pw", Role::Viewer).await?;
        create_test_user(&db, "bob", "pw", Role::Editor).await?;

        let names: Vec<_> = list_users(&db, &ctx).await?.into_iter().map(|u| u.username).collect();
        assert_eq!(names, ["amy", "bob", "zed"]);
        assert_eq!(list_users_by_role(&db, &ctx, Role::Editor).await?.len(), 2);

        delete_user(&db, &ctx, zed.id).await?;
        assert!(get_user(&db, &ctx, zed.id).await?.is_none());
        assert!(matches!(
            delete_user(&db, &ctx, zed.id).await,
            Err(Error::UserNotFound { id }) if id == zed.id
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_authenticate_success_and_failure() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_user(&db, "maria", "s3cret", Role::Editor).await?;

        let ctx = authenticate(&db, "maria", "s3cret", Some("10.1.1.1")).await?;
        assert_eq!(ctx.user_id, Some(created.id));
        assert_eq!(ctx.role, Role::Editor);
        assert_eq!(ctx.source_address.as_deref(), Some("10.1.1.1"));

        assert!(matches!(
            authenticate(&db, "maria", "wrong", None).await,
            Err(Error::InvalidCredentials)
        ));
        assert!(matches!(
            authenticate(&db, "nobody", "s3cret", None).await,
            Err(Error::InvalidCredentials)
        ));

        let failed = AuditRecord::find()
            .filter(AuditRecordColumn::Action.eq("login failed"))
            .all(&db)
            .await?;
        assert_eq!(failed.len(), 2);
        assert!(failed.iter().all(|r| r.actor_id.is_none()));
        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_log_in() -> Result<()> {
        let db = setup_test_db().await?;
        let created = create_test_user(&db, "maria", "s3cret", Role::Editor).await?;
        update_user(
            &db,
            &admin_ctx(),
            created.id,
            UserPatch {
                active: Some(false),
                ..UserPatch::default()
            },
        )
        .await?;

        assert!(matches!(
            authenticate(&db, "maria", "s3cret", None).await,
            Err(Error::InvalidCredentials)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_legacy_password_is_upgraded_on_login() -> Result<()> {
        let db = setup_test_db().await?;
        let client = create_test_client(&db, "30111222").await?;
        let legacy = user::ActiveModel {
            username: Set("old_timer".to_string()),
            password_hash: Set(legacy_digest("password")),
            email: Set(None),
            role: Set(Role::Client),
            active: Set(true),
            client_id: Set(Some(client.id)),
            created_at: Set(Utc::now()),
            ..Default::default()
        }
        .insert(&db)
        .await?;

        let ctx = authenticate(&db, "old_timer", "password", None).await?;
        assert_eq!(ctx.client_id, Some(client.id));

        let stored = User::find_by_id(legacy.id).one(&db).await?.unwrap();
        assert!(stored.password_hash.starts_with("$argon2id$"));
        assert_eq!(verify_password("password", &stored.password_hash), Verification::Valid);

        let actions = audit_actions(&db).await;
        assert!(actions.ends_with(&["password rehashed".to_string(), "login succeeded".to_string()]));

        // Second login takes the current-scheme path
        authenticate(&db, "old_timer", "password", None).await?;
        let rehashes = AuditRecord::find()
            .filter(AuditRecordColumn::Action.eq("password rehashed"))
            .count(&db)
            .await?;
        assert_eq!(rehashes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_seed_admin_only_once() -> Result<()> {
        let db = setup_test_db().await?;
        let admin = BootstrapAdmin {
            username: "root".to_string(),
            password: "changeme".to_string(),
        };

        let first = seed_admin(&db, &admin).await?.unwrap();
        assert_eq!(first.role, Role::Admin);
        assert!(seed_admin(&db, &admin).await?.is_none());

        let ctx = authenticate(&db, "root", "changeme", None).await?;
        assert_eq!(ctx.role, Role::Admin);
        Ok(())
    }
}
