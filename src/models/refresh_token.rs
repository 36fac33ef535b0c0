//! Refresh token model - opaque single-use credentials forming rotation chains.

use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Refresh token row. The `token` value itself is an opaque random string
/// handed to the client; `replaced_by_token` links a revoked token to its
/// successor, forming the rotation chain.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_by_ip: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    pub revoked_reason: Option<String>,
    pub replaced_by_token: Option<String>,
}

impl RefreshToken {
    /// Create a new refresh token for a user.
    pub fn new(user_id: Uuid, token: String, lifetime_days: i64, created_by_ip: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            token,
            expires_at: now + Duration::days(lifetime_days),
            created_at: now,
            created_by_ip,
            revoked_at: None,
            revoked_by_ip: None,
            revoked_reason: None,
            replaced_by_token: None,
        }
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    /// Usable: neither expired nor revoked.
    pub fn is_active(&self) -> bool {
        !self.is_expired() && !self.is_revoked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_active() {
        let token = RefreshToken::new(Uuid::new_v4(), "tok".to_string(), 7, None);
        assert!(!token.is_expired());
        assert!(!token.is_revoked());
        assert!(token.is_active());
    }

    #[test]
    fn test_expired_token_is_inactive() {
        let mut token = RefreshToken::new(Uuid::new_v4(), "tok".to_string(), 7, None);
        token.expires_at = Utc::now() - Duration::seconds(1);
        assert!(token.is_expired());
        assert!(!token.is_active());
    }

    #[test]
    fn test_revoked_token_is_inactive() {
        let mut token = RefreshToken::new(Uuid::new_v4(), "tok".to_string(), 7, None);
        token.revoked_at = Some(Utc::now());
        assert!(token.is_revoked());
        assert!(!token.is_active());
    }
}
