//! PostgreSQL implementation of the auth store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::models::{
    AuditLog, OAuthAccount, Permission, RefreshToken, Role, RolePermission, User, UserRole,
};
use crate::store::{AuthStore, StoreError};

/// PostgreSQL store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Create a new store from a connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

#[async_trait]
impl AuthStore for PgStore {
    // ==================== Users ====================

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, first_name, last_name, email, password_hash, email_verified,
                email_verification_token, email_verification_expires,
                password_reset_token, password_reset_expires,
                is_active, created_at, last_login_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(&user.email_verification_token)
        .bind(user.email_verification_expires)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.is_active)
        .bind(user.created_at)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("Email already registered: {}", user.email))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE users SET
                first_name = $2, last_name = $3, email = $4, password_hash = $5,
                email_verified = $6, email_verification_token = $7,
                email_verification_expires = $8, password_reset_token = $9,
                password_reset_expires = $10, is_active = $11, last_login_at = $12
            WHERE id = $1
            "#,
        )
        .bind(user.id)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.email_verified)
        .bind(&user.email_verification_token)
        .bind(user.email_verification_expires)
        .bind(&user.password_reset_token)
        .bind(user.password_reset_expires)
        .bind(user.is_active)
        .bind(user.last_login_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE password_reset_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(
            sqlx::query_as::<_, User>("SELECT * FROM users WHERE email_verification_token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM users WHERE LOWER(email) = LOWER($1))",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists.0)
    }

    // ==================== Roles and permissions ====================

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO roles (id, name, description, is_default, created_at) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(role.id)
        .bind(&role.name)
        .bind(&role.description)
        .bind(role.is_default)
        .bind(role.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("Role already exists: {}", role.name))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        Ok(
            sqlx::query_as::<_, Role>("SELECT * FROM roles WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn find_default_role(&self) -> Result<Option<Role>, StoreError> {
        Ok(
            sqlx::query_as::<_, Role>(
                "SELECT * FROM roles WHERE is_default = TRUE ORDER BY created_at LIMIT 1",
            )
            .fetch_optional(&self.pool)
            .await?,
        )
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO permissions (id, name, category, created_at) VALUES ($1, $2, $3, $4)")
            .bind(permission.id)
            .bind(&permission.name)
            .bind(&permission.category)
            .bind(permission.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    StoreError::Conflict(format!("Permission already exists: {}", permission.name))
                } else {
                    e.into()
                }
            })?;
        Ok(())
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        Ok(
            sqlx::query_as::<_, Permission>("SELECT * FROM permissions WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn assign_role(&self, assignment: &UserRole) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_at, assigned_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, role_id) DO NOTHING
            "#,
        )
        .bind(assignment.user_id)
        .bind(assignment.role_id)
        .bind(assignment.assigned_at)
        .bind(assignment.assigned_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM user_roles WHERE user_id = $1 AND role_id = $2")
            .bind(user_id)
            .bind(role_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn grant_permission(&self, grant: &RolePermission) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO role_permissions (role_id, permission_id, granted_at, granted_by)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (role_id, permission_id) DO NOTHING
            "#,
        )
        .bind(grant.role_id)
        .bind(grant.permission_id)
        .bind(grant.granted_at)
        .bind(grant.granted_by)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM role_permissions WHERE role_id = $1 AND permission_id = $2")
                .bind(role_id)
                .bind(permission_id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn role_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT r.name FROM roles r
            JOIN user_roles ur ON ur.role_id = r.id
            WHERE ur.user_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn permission_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT p.name FROM permissions p
            JOIN role_permissions rp ON rp.permission_id = p.id
            JOIN user_roles ur ON ur.role_id = rp.role_id
            WHERE ur.user_id = $1
            ORDER BY p.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    // ==================== Refresh tokens ====================

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                id, user_id, token, expires_at, created_at, created_by_ip,
                revoked_at, revoked_by_ip, revoked_reason, replaced_by_token
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(token.id)
        .bind(token.user_id)
        .bind(&token.token)
        .bind(token.expires_at)
        .bind(token.created_at)
        .bind(&token.created_by_ip)
        .bind(token.revoked_at)
        .bind(&token.revoked_by_ip)
        .bind(&token.revoked_reason)
        .bind(&token.replaced_by_token)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        Ok(
            sqlx::query_as::<_, RefreshToken>("SELECT * FROM refresh_tokens WHERE token = $1")
                .bind(token)
                .fetch_optional(&self.pool)
                .await?,
        )
    }

    async fn mark_refresh_token_revoked(
        &self,
        token: &str,
        revoked_by_ip: Option<&str>,
        reason: &str,
        replaced_by_token: Option<&str>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW(), revoked_by_ip = $2, revoked_reason = $3,
                replaced_by_token = $4
            WHERE token = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(token)
        .bind(revoked_by_ip)
        .bind(reason)
        .bind(replaced_by_token)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        revoked_by_ip: Option<&str>,
        successor: &RefreshToken,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        // Guarded update: only one concurrent rotation can win.
        let revoked = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked_at = NOW(), revoked_by_ip = $2, revoked_reason = 'rotated',
                replaced_by_token = $3
            WHERE token = $1 AND revoked_at IS NULL
            "#,
        )
        .bind(old_token)
        .bind(revoked_by_ip)
        .bind(&successor.token)
        .execute(&mut *tx)
        .await?;

        if revoked.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(StoreError::Conflict(
                "Refresh token was already revoked".to_string(),
            ));
        }

        sqlx::query(
            r#"
            INSERT INTO refresh_tokens (
                id, user_id, token, expires_at, created_at, created_by_ip,
                revoked_at, revoked_by_ip, revoked_reason, replaced_by_token
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(successor.id)
        .bind(successor.user_id)
        .bind(&successor.token)
        .bind(successor.expires_at)
        .bind(successor.created_at)
        .bind(&successor.created_by_ip)
        .bind(successor.revoked_at)
        .bind(&successor.revoked_by_ip)
        .bind(&successor.revoked_reason)
        .bind(&successor.replaced_by_token)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn active_refresh_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        Ok(sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT * FROM refresh_tokens
            WHERE user_id = $1 AND revoked_at IS NULL AND expires_at > NOW()
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    async fn prune_refresh_tokens_by_rank(
        &self,
        user_id: Uuid,
        keep: usize,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE token IN (
                SELECT token FROM refresh_tokens
                WHERE user_id = $1
                ORDER BY created_at DESC
                OFFSET $2
            )
            "#,
        )
        .bind(user_id)
        .bind(keep as i64)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_stale_refresh_tokens(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            DELETE FROM refresh_tokens
            WHERE created_at < $1 AND (revoked_at IS NOT NULL OR expires_at <= NOW())
            "#,
        )
        .bind(created_before)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ==================== OAuth accounts ====================

    async fn find_oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>, StoreError> {
        Ok(sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE provider = $1 AND provider_user_id = $2",
        )
        .bind(provider)
        .bind(provider_user_id)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn find_oauth_account_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<OAuthAccount>, StoreError> {
        Ok(sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE user_id = $1 AND provider = $2",
        )
        .bind(user_id)
        .bind(provider)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn insert_oauth_account(&self, account: &OAuthAccount) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO oauth_accounts (
                id, user_id, provider, provider_user_id, provider_email, provider_name,
                access_token, refresh_token, token_expires, connected_at, last_used_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(account.id)
        .bind(account.user_id)
        .bind(&account.provider)
        .bind(&account.provider_user_id)
        .bind(&account.provider_email)
        .bind(&account.provider_name)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires)
        .bind(account.connected_at)
        .bind(account.last_used_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!(
                    "Provider already linked: {}",
                    account.provider
                ))
            } else {
                e.into()
            }
        })?;
        Ok(())
    }

    async fn update_oauth_account(&self, account: &OAuthAccount) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE oauth_accounts
            SET provider_email = $2, provider_name = $3, access_token = $4,
                refresh_token = $5, token_expires = $6, last_used_at = $7
            WHERE id = $1
            "#,
        )
        .bind(account.id)
        .bind(&account.provider_email)
        .bind(&account.provider_name)
        .bind(&account.access_token)
        .bind(&account.refresh_token)
        .bind(account.token_expires)
        .bind(account.last_used_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_oauth_account(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<bool, StoreError> {
        let result =
            sqlx::query("DELETE FROM oauth_accounts WHERE user_id = $1 AND provider = $2")
                .bind(user_id)
                .bind(provider)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn oauth_accounts_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OAuthAccount>, StoreError> {
        Ok(sqlx::query_as::<_, OAuthAccount>(
            "SELECT * FROM oauth_accounts WHERE user_id = $1 ORDER BY connected_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?)
    }

    // ==================== Audit ====================

    async fn append_audit_log(&self, entry: &AuditLog) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (
                id, action, entity_type, entity_id, user_id,
                old_values, new_values, ip_address, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.user_id)
        .bind(&entry.old_values)
        .bind(&entry.new_values)
        .bind(&entry.ip_address)
        .bind(&entry.user_agent)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_audit_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM audit_logs WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
