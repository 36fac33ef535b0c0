//! External identity links - one row per (user, provider) pair.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

/// Link between a local account and an external identity provider, with the
/// provider-side tokens cached for later API calls.
#[derive(Debug, Clone, FromRow)]
pub struct OAuthAccount {
    pub id: Uuid,
    pub user_id: Uuid,
    pub provider: String,
    pub provider_user_id: String,
    pub provider_email: Option<String>,
    pub provider_name: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires: Option<DateTime<Utc>>,
    pub connected_at: DateTime<Utc>,
    pub last_used_at: DateTime<Utc>,
}

impl OAuthAccount {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        user_id: Uuid,
        provider: String,
        provider_user_id: String,
        provider_email: Option<String>,
        provider_name: Option<String>,
        access_token: String,
        refresh_token: Option<String>,
        token_expires: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            provider,
            provider_user_id,
            provider_email,
            provider_name,
            access_token,
            refresh_token,
            token_expires,
            connected_at: now,
            last_used_at: now,
        }
    }
}
