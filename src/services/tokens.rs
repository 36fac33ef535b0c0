//! Refresh token lifecycle: issue, rotate, revoke, prune.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::config::{JwtConfig, TokenRetentionConfig};
use crate::models::RefreshToken;
use crate::services::error::ServiceError;
use crate::services::jwt::JwtService;
use crate::store::{AuthStore, StoreError};

/// Guard against corrupted replaced_by chains during descendant walks.
const MAX_CHAIN_DEPTH: usize = 100;

/// Manages refresh tokens for all accounts.
#[derive(Clone)]
pub struct RefreshTokenService {
    store: Arc<dyn AuthStore>,
    lifetime_days: i64,
    keep_per_account: usize,
    retention_after_expiry_days: i64,
}

impl RefreshTokenService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        jwt: &JwtConfig,
        retention: &TokenRetentionConfig,
    ) -> Self {
        Self {
            store,
            lifetime_days: jwt.refresh_token_expiry_days,
            keep_per_account: retention.keep_per_account,
            retention_after_expiry_days: retention.retention_after_expiry_days,
        }
    }

    /// Look up a token by its opaque value.
    pub async fn lookup(&self, token: &str) -> Result<Option<RefreshToken>, ServiceError> {
        Ok(self.store.find_refresh_token(token).await?)
    }

    /// Issue a fresh token for a user.
    pub async fn issue(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
    ) -> Result<RefreshToken, ServiceError> {
        let token = RefreshToken::new(
            user_id,
            JwtService::generate_refresh_token(),
            self.lifetime_days,
            ip.map(|s| s.to_string()),
        );
        self.store.insert_refresh_token(&token).await?;
        Ok(token)
    }

    /// Revoke a single token. Idempotent: returns false when the token does
    /// not exist or is already revoked.
    pub async fn revoke(
        &self,
        token: &str,
        ip: Option<&str>,
        reason: &str,
    ) -> Result<bool, ServiceError> {
        Ok(self
            .store
            .mark_refresh_token_revoked(token, ip, reason, None)
            .await?)
    }

    /// Revoke every descendant of `token` along the replaced_by chain.
    /// The walk is iterative with a visited set; a cycle means the chain
    /// data is corrupt and surfaces as an error.
    pub async fn revoke_descendants(
        &self,
        token: &str,
        ip: Option<&str>,
        reason: &str,
    ) -> Result<u64, ServiceError> {
        let mut revoked = 0u64;
        let mut visited: HashSet<String> = HashSet::new();
        visited.insert(token.to_string());

        let mut current = match self.store.find_refresh_token(token).await? {
            Some(t) => t.replaced_by_token,
            None => return Ok(0),
        };

        while let Some(next) = current {
            if !visited.insert(next.clone()) || visited.len() > MAX_CHAIN_DEPTH {
                tracing::error!(token_prefix = %prefix(token), "Refresh token chain cycle detected");
                return Err(ServiceError::TokenChainCycle);
            }

            let descendant = match self.store.find_refresh_token(&next).await? {
                Some(t) => t,
                None => break,
            };

            if descendant.revoked_at.is_none() {
                self.store
                    .mark_refresh_token_revoked(&descendant.token, ip, reason, None)
                    .await?;
                revoked += 1;
            }

            current = descendant.replaced_by_token;
        }

        Ok(revoked)
    }

    /// Revoke all active tokens for a user, e.g. after a password reset or
    /// account deactivation.
    pub async fn revoke_all_for_user(
        &self,
        user_id: Uuid,
        ip: Option<&str>,
        reason: &str,
    ) -> Result<u64, ServiceError> {
        let active = self.store.active_refresh_tokens_for_user(user_id).await?;
        let mut revoked = 0u64;
        for token in active {
            if self
                .store
                .mark_refresh_token_revoked(&token.token, ip, reason, None)
                .await?
            {
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    /// Rotate: atomically revoke `token` and hand out its successor. The
    /// loser of a concurrent rotation gets a Conflict from the store.
    pub async fn rotate(
        &self,
        token: &RefreshToken,
        ip: Option<&str>,
    ) -> Result<RefreshToken, ServiceError> {
        let successor = RefreshToken::new(
            token.user_id,
            JwtService::generate_refresh_token(),
            self.lifetime_days,
            ip.map(|s| s.to_string()),
        );
        match self
            .store
            .rotate_refresh_token(&token.token, ip, &successor)
            .await
        {
            Ok(()) => Ok(successor),
            Err(StoreError::Conflict(_)) => Err(ServiceError::InvalidToken),
            Err(e) => Err(e.into()),
        }
    }

    /// Cap the number of stored tokens per account, deleting oldest first.
    pub async fn prune_oldest(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let deleted = self
            .store
            .prune_refresh_tokens_by_rank(user_id, self.keep_per_account)
            .await?;
        if deleted > 0 {
            tracing::debug!(user_id = %user_id, deleted, "Pruned excess refresh tokens");
        }
        Ok(deleted)
    }

    /// Delete expired/revoked tokens older than the retention window.
    pub async fn prune_expired(&self) -> Result<u64, ServiceError> {
        let cutoff = Utc::now() - Duration::days(self.retention_after_expiry_days);
        Ok(self.store.delete_stale_refresh_tokens(cutoff).await?)
    }
}

fn prefix(token: &str) -> &str {
    match token.char_indices().nth(8) {
        Some((i, _)) => &token[..i],
        None => token,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service(store: Arc<MemoryStore>) -> RefreshTokenService {
        let jwt = JwtConfig {
            secret: "test-secret-that-is-long-enough-000000".to_string(),
            issuer: "campus-auth".to_string(),
            audience: "campus-api".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        };
        let retention = TokenRetentionConfig {
            keep_per_account: 3,
            retention_after_expiry_days: 30,
            cleanup_interval_secs: 3600,
            cleanup_retry_secs: 300,
        };
        RefreshTokenService::new(store, &jwt, &retention)
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        let token = svc.issue(Uuid::new_v4(), None).await.unwrap();

        assert!(svc.revoke(&token.token, None, "logout").await.unwrap());
        assert!(!svc.revoke(&token.token, None, "logout").await.unwrap());
        assert!(!svc.revoke("unknown", None, "logout").await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_descendants_walks_chain() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        let user_id = Uuid::new_v4();

        let a = svc.issue(user_id, None).await.unwrap();
        let b = svc.rotate(&a, None).await.unwrap();
        let c = svc.rotate(&b, None).await.unwrap();

        // a and b are revoked by rotation; only c is still active.
        let revoked = svc.revoke_descendants(&a.token, None, "reuse detected").await.unwrap();
        assert_eq!(revoked, 1);

        let c_row = svc.lookup(&c.token).await.unwrap().unwrap();
        assert!(c_row.is_revoked());
    }

    #[tokio::test]
    async fn test_revoke_descendants_detects_cycle() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        let user_id = Uuid::new_v4();

        let mut a = RefreshToken::new(user_id, "tok-a".to_string(), 7, None);
        let mut b = RefreshToken::new(user_id, "tok-b".to_string(), 7, None);
        a.replaced_by_token = Some(b.token.clone());
        b.replaced_by_token = Some(a.token.clone());
        store.insert_refresh_token(&a).await.unwrap();
        store.insert_refresh_token(&b).await.unwrap();

        let result = svc.revoke_descendants("tok-a", None, "reuse detected").await;
        assert!(matches!(result, Err(ServiceError::TokenChainCycle)));
    }

    #[test]
    fn test_prefix_respects_char_boundaries() {
        assert_eq!(prefix("abcdefghij"), "abcdefgh");
        assert_eq!(prefix("short"), "short");
        assert_eq!(prefix("ααααααααββ"), "αααααααα");
    }

    #[tokio::test]
    async fn test_prune_oldest_keeps_newest() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        let user_id = Uuid::new_v4();

        for i in 0..5i64 {
            let mut t = RefreshToken::new(user_id, format!("tok-{}", i), 7, None);
            t.created_at = Utc::now() - Duration::minutes(10 - i);
            store.insert_refresh_token(&t).await.unwrap();
        }

        let deleted = svc.prune_oldest(user_id).await.unwrap();
        assert_eq!(deleted, 2);

        // The two oldest are gone, regardless of state.
        assert!(svc.lookup("tok-0").await.unwrap().is_none());
        assert!(svc.lookup("tok-1").await.unwrap().is_none());
        assert!(svc.lookup("tok-4").await.unwrap().unwrap().is_active());
    }

    #[tokio::test]
    async fn test_prune_expired_respects_retention() {
        let store = Arc::new(MemoryStore::new());
        let svc = service(store.clone());
        let user_id = Uuid::new_v4();

        // Revoked long ago, outside retention.
        let mut old = RefreshToken::new(user_id, "old".to_string(), 7, None);
        old.created_at = Utc::now() - Duration::days(60);
        old.expires_at = Utc::now() - Duration::days(53);
        store.insert_refresh_token(&old).await.unwrap();

        // Recently expired, inside retention.
        let mut recent = RefreshToken::new(user_id, "recent".to_string(), 7, None);
        recent.created_at = Utc::now() - Duration::days(10);
        recent.expires_at = Utc::now() - Duration::days(3);
        store.insert_refresh_token(&recent).await.unwrap();

        // Active.
        let active = svc.issue(user_id, None).await.unwrap();

        let deleted = svc.prune_expired().await.unwrap();
        assert_eq!(deleted, 1);
        assert!(svc.lookup("old").await.unwrap().is_none());
        assert!(svc.lookup("recent").await.unwrap().is_some());
        assert!(svc.lookup(&active.token).await.unwrap().is_some());
    }
}
