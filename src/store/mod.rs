//! Persistence seam for the auth engine.
//!
//! `AuthStore` is the repository trait the services talk to. `PgStore` is
//! the production PostgreSQL implementation; `MemoryStore` backs tests
//! that do not need a running database.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AuditLog, OAuthAccount, Permission, RefreshToken, Role, RolePermission, User, UserRole,
};

/// Storage-level errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness or concurrent-update constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(anyhow::anyhow!(e))
    }
}

/// Repository operations the auth services depend on.
#[async_trait]
pub trait AuthStore: Send + Sync {
    // ==================== Users ====================

    /// Insert a new user. Fails with `Conflict` when the email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), StoreError>;

    /// Persist every mutable field of an existing user.
    async fn update_user(&self, user: &User) -> Result<(), StoreError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError>;

    /// Case-insensitive email lookup.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError>;

    async fn find_user_by_verification_token(&self, token: &str)
        -> Result<Option<User>, StoreError>;

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError>;

    // ==================== Roles and permissions ====================

    /// Insert a new role. Fails with `Conflict` when the name is taken.
    async fn insert_role(&self, role: &Role) -> Result<(), StoreError>;

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError>;

    async fn find_default_role(&self) -> Result<Option<Role>, StoreError>;

    /// Insert a new permission. Fails with `Conflict` when the name is taken.
    async fn insert_permission(&self, permission: &Permission) -> Result<(), StoreError>;

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError>;

    /// Assign a role to a user. Returns false when already assigned.
    async fn assign_role(&self, assignment: &UserRole) -> Result<bool, StoreError>;

    /// Remove a role from a user. Returns false when it was not assigned.
    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError>;

    /// Grant a permission to a role. Returns false when already granted.
    async fn grant_permission(&self, grant: &RolePermission) -> Result<bool, StoreError>;

    /// Revoke a permission from a role. Returns false when it was not granted.
    async fn revoke_permission(&self, role_id: Uuid, permission_id: Uuid)
        -> Result<bool, StoreError>;

    async fn role_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError>;

    /// Distinct permission names across all of the user's roles.
    async fn permission_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError>;

    // ==================== Refresh tokens ====================

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError>;

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError>;

    /// Mark a token revoked. Returns false when the token does not exist or
    /// was already revoked.
    async fn mark_refresh_token_revoked(
        &self,
        token: &str,
        revoked_by_ip: Option<&str>,
        reason: &str,
        replaced_by_token: Option<&str>,
    ) -> Result<bool, StoreError>;

    /// Atomically revoke `old_token` and insert its successor. Fails with
    /// `Conflict` when the old token was concurrently revoked; neither write
    /// is applied in that case.
    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        revoked_by_ip: Option<&str>,
        successor: &RefreshToken,
    ) -> Result<(), StoreError>;

    /// Active (not expired, not revoked) tokens for a user, newest first.
    async fn active_refresh_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError>;

    /// Keep only the `keep` most-recently-created tokens for a user and
    /// delete the rest, regardless of their state. Returns how many were
    /// deleted.
    async fn prune_refresh_tokens_by_rank(
        &self,
        user_id: Uuid,
        keep: usize,
    ) -> Result<u64, StoreError>;

    /// Delete tokens that are expired or revoked AND were created before the
    /// cutoff. Returns how many were deleted.
    async fn delete_stale_refresh_tokens(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    // ==================== OAuth accounts ====================

    async fn find_oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>, StoreError>;

    async fn find_oauth_account_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<OAuthAccount>, StoreError>;

    /// Insert a provider link. Fails with `Conflict` when the user already
    /// has a link for this provider.
    async fn insert_oauth_account(&self, account: &OAuthAccount) -> Result<(), StoreError>;

    /// Refresh the cached provider tokens and `last_used_at`.
    async fn update_oauth_account(&self, account: &OAuthAccount) -> Result<(), StoreError>;

    /// Remove a provider link. Returns false when none existed.
    async fn delete_oauth_account(&self, user_id: Uuid, provider: &str)
        -> Result<bool, StoreError>;

    async fn oauth_accounts_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OAuthAccount>, StoreError>;

    // ==================== Audit ====================

    async fn append_audit_log(&self, entry: &AuditLog) -> Result<(), StoreError>;

    /// Delete audit entries created before the cutoff. Returns how many
    /// were deleted.
    async fn delete_audit_logs_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}
