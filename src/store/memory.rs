//! In-memory implementation of the auth store, used by tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    AuditLog, OAuthAccount, Permission, RefreshToken, Role, RolePermission, User, UserRole,
};
use crate::store::{AuthStore, StoreError};

#[derive(Default)]
struct Inner {
    users: Vec<User>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    user_roles: Vec<UserRole>,
    role_permissions: Vec<RolePermission>,
    refresh_tokens: Vec<RefreshToken>,
    oauth_accounts: Vec<OAuthAccount>,
    audit_logs: Vec<AuditLog>,
}

/// Store backed by process memory. One coarse lock covers everything, which
/// also makes the rotate operation atomic.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit entries recorded so far.
    pub fn audit_log_count(&self) -> usize {
        self.inner.lock().unwrap().audit_logs.len()
    }

    /// Snapshot of recorded audit actions, oldest first.
    pub fn audit_actions(&self) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .audit_logs
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    /// Total refresh token rows, including revoked and expired ones.
    pub fn refresh_token_count(&self) -> usize {
        self.inner.lock().unwrap().refresh_tokens.len()
    }
}

#[async_trait]
impl AuthStore for MemoryStore {
    // ==================== Users ====================

    async fn insert_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(StoreError::Conflict(format!(
                "Email already registered: {}",
                user.email
            )));
        }
        inner.users.push(user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.users.iter_mut().find(|u| u.id == user.id) {
            *existing = user.clone();
        }
        Ok(())
    }

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.iter().find(|u| u.id == user_id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_user_by_reset_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.password_reset_token.as_deref() == Some(token))
            .cloned())
    }

    async fn find_user_by_verification_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .find(|u| u.email_verification_token.as_deref() == Some(token))
            .cloned())
    }

    async fn email_exists(&self, email: &str) -> Result<bool, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(email)))
    }

    // ==================== Roles and permissions ====================

    async fn insert_role(&self, role: &Role) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.roles.iter().any(|r| r.name == role.name) {
            return Err(StoreError::Conflict(format!(
                "Role already exists: {}",
                role.name
            )));
        }
        inner.roles.push(role.clone());
        Ok(())
    }

    async fn find_role_by_name(&self, name: &str) -> Result<Option<Role>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.roles.iter().find(|r| r.name == name).cloned())
    }

    async fn find_default_role(&self) -> Result<Option<Role>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut defaults: Vec<&Role> = inner.roles.iter().filter(|r| r.is_default).collect();
        defaults.sort_by_key(|r| r.created_at);
        Ok(defaults.first().map(|r| (*r).clone()))
    }

    async fn insert_permission(&self, permission: &Permission) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.permissions.iter().any(|p| p.name == permission.name) {
            return Err(StoreError::Conflict(format!(
                "Permission already exists: {}",
                permission.name
            )));
        }
        inner.permissions.push(permission.clone());
        Ok(())
    }

    async fn find_permission_by_name(&self, name: &str) -> Result<Option<Permission>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.permissions.iter().find(|p| p.name == name).cloned())
    }

    async fn assign_role(&self, assignment: &UserRole) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .user_roles
            .iter()
            .any(|ur| ur.user_id == assignment.user_id && ur.role_id == assignment.role_id)
        {
            return Ok(false);
        }
        inner.user_roles.push(assignment.clone());
        Ok(true)
    }

    async fn remove_role(&self, user_id: Uuid, role_id: Uuid) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.user_roles.len();
        inner
            .user_roles
            .retain(|ur| !(ur.user_id == user_id && ur.role_id == role_id));
        Ok(inner.user_roles.len() < before)
    }

    async fn grant_permission(&self, grant: &RolePermission) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .role_permissions
            .iter()
            .any(|rp| rp.role_id == grant.role_id && rp.permission_id == grant.permission_id)
        {
            return Ok(false);
        }
        inner.role_permissions.push(grant.clone());
        Ok(true)
    }

    async fn revoke_permission(
        &self,
        role_id: Uuid,
        permission_id: Uuid,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.role_permissions.len();
        inner
            .role_permissions
            .retain(|rp| !(rp.role_id == role_id && rp.permission_id == permission_id));
        Ok(inner.role_permissions.len() < before)
    }

    async fn role_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .filter_map(|ur| {
                inner
                    .roles
                    .iter()
                    .find(|r| r.id == ur.role_id)
                    .map(|r| r.name.clone())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    async fn permission_names_for_user(&self, user_id: Uuid) -> Result<Vec<String>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut names: Vec<String> = inner
            .user_roles
            .iter()
            .filter(|ur| ur.user_id == user_id)
            .flat_map(|ur| {
                inner
                    .role_permissions
                    .iter()
                    .filter(move |rp| rp.role_id == ur.role_id)
            })
            .filter_map(|rp| {
                inner
                    .permissions
                    .iter()
                    .find(|p| p.id == rp.permission_id)
                    .map(|p| p.name.clone())
            })
            .collect();
        names.sort();
        names.dedup();
        Ok(names)
    }

    // ==================== Refresh tokens ====================

    async fn insert_refresh_token(&self, token: &RefreshToken) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.refresh_tokens.push(token.clone());
        Ok(())
    }

    async fn find_refresh_token(&self, token: &str) -> Result<Option<RefreshToken>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .refresh_tokens
            .iter()
            .find(|t| t.token == token)
            .cloned())
    }

    async fn mark_refresh_token_revoked(
        &self,
        token: &str,
        revoked_by_ip: Option<&str>,
        reason: &str,
        replaced_by_token: Option<&str>,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        match inner
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token == token && t.revoked_at.is_none())
        {
            Some(t) => {
                t.revoked_at = Some(Utc::now());
                t.revoked_by_ip = revoked_by_ip.map(|s| s.to_string());
                t.revoked_reason = Some(reason.to_string());
                t.replaced_by_token = replaced_by_token.map(|s| s.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn rotate_refresh_token(
        &self,
        old_token: &str,
        revoked_by_ip: Option<&str>,
        successor: &RefreshToken,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let old = inner
            .refresh_tokens
            .iter_mut()
            .find(|t| t.token == old_token && t.revoked_at.is_none());
        match old {
            Some(t) => {
                t.revoked_at = Some(Utc::now());
                t.revoked_by_ip = revoked_by_ip.map(|s| s.to_string());
                t.revoked_reason = Some("rotated".to_string());
                t.replaced_by_token = Some(successor.token.clone());
            }
            None => {
                return Err(StoreError::Conflict(
                    "Refresh token was already revoked".to_string(),
                ));
            }
        }
        inner.refresh_tokens.push(successor.clone());
        Ok(())
    }

    async fn active_refresh_tokens_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<RefreshToken>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut tokens: Vec<RefreshToken> = inner
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id && t.is_active())
            .cloned()
            .collect();
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }

    async fn prune_refresh_tokens_by_rank(
        &self,
        user_id: Uuid,
        keep: usize,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let mut owned: Vec<(String, DateTime<Utc>)> = inner
            .refresh_tokens
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| (t.token.clone(), t.created_at))
            .collect();
        // Newest first; everything past `keep` gets deleted.
        owned.sort_by(|a, b| b.1.cmp(&a.1));

        let doomed: Vec<String> = owned
            .into_iter()
            .skip(keep)
            .map(|(token, _)| token)
            .collect();
        inner.refresh_tokens.retain(|t| !doomed.contains(&t.token));
        Ok(doomed.len() as u64)
    }

    async fn delete_stale_refresh_tokens(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.refresh_tokens.len();
        inner.refresh_tokens.retain(|t| {
            !(t.created_at < created_before && (t.is_revoked() || t.is_expired()))
        });
        Ok((before - inner.refresh_tokens.len()) as u64)
    }

    // ==================== OAuth accounts ====================

    async fn find_oauth_account(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> Result<Option<OAuthAccount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .oauth_accounts
            .iter()
            .find(|a| a.provider == provider && a.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn find_oauth_account_for_user(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<Option<OAuthAccount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .oauth_accounts
            .iter()
            .find(|a| a.user_id == user_id && a.provider == provider)
            .cloned())
    }

    async fn insert_oauth_account(&self, account: &OAuthAccount) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if inner
            .oauth_accounts
            .iter()
            .any(|a| a.user_id == account.user_id && a.provider == account.provider)
        {
            return Err(StoreError::Conflict(format!(
                "Provider already linked: {}",
                account.provider
            )));
        }
        inner.oauth_accounts.push(account.clone());
        Ok(())
    }

    async fn update_oauth_account(&self, account: &OAuthAccount) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.oauth_accounts.iter_mut().find(|a| a.id == account.id) {
            *existing = account.clone();
        }
        Ok(())
    }

    async fn delete_oauth_account(
        &self,
        user_id: Uuid,
        provider: &str,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.oauth_accounts.len();
        inner
            .oauth_accounts
            .retain(|a| !(a.user_id == user_id && a.provider == provider));
        Ok(inner.oauth_accounts.len() < before)
    }

    async fn oauth_accounts_for_user(
        &self,
        user_id: Uuid,
    ) -> Result<Vec<OAuthAccount>, StoreError> {
        let inner = self.inner.lock().unwrap();
        let mut accounts: Vec<OAuthAccount> = inner
            .oauth_accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        accounts.sort_by_key(|a| a.connected_at);
        Ok(accounts)
    }

    // ==================== Audit ====================

    async fn append_audit_log(&self, entry: &AuditLog) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.audit_logs.push(entry.clone());
        Ok(())
    }

    async fn delete_audit_logs_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.audit_logs.len();
        inner.audit_logs.retain(|e| e.created_at >= cutoff);
        Ok((before - inner.audit_logs.len()) as u64)
    }
}
