//! OAuth bridge: code exchange, profile fetch, account linking.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::config::{OAuthConfig, ProviderConfig};
use crate::models::{AccountType, AuditLog, AuthResponse, OAuthAccount, User, UserRole};
use crate::services::auth::AuthService;
use crate::services::error::ServiceError;
use crate::store::{AuthStore, StoreError};
use crate::utils::{generate_secure_token, hash_password, Password};

/// Supported external identity providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Google,
    GitHub,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::GitHub => "github",
        }
    }

    /// Whether a profile email from this provider counts as verified.
    /// Google verifies addresses before exposing them; GitHub emails are
    /// taken from the verified-primary lookup, so both are trusted.
    pub fn trusts_email(&self) -> bool {
        true
    }

    /// Account type used to pick a default role for accounts created
    /// through this provider.
    pub fn default_account_type(&self) -> AccountType {
        match self {
            Provider::Google => AccountType::Student,
            Provider::GitHub => AccountType::Instructor,
        }
    }
}

impl FromStr for Provider {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" => Ok(Provider::Google),
            "github" => Ok(Provider::GitHub),
            other => Err(ServiceError::UnsupportedProvider(other.to_string())),
        }
    }
}

/// Normalized identity returned by a provider's profile endpoint.
#[derive(Debug, Clone)]
pub struct ExternalProfile {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

/// Provider-side tokens obtained from the code exchange.
#[derive(Debug, Clone)]
pub struct ProviderTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenExchangeResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GoogleProfile {
    id: String,
    email: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GitHubProfile {
    id: i64,
    email: Option<String>,
    name: Option<String>,
    login: String,
}

#[derive(Debug, Deserialize)]
struct GitHubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

/// Bridges external identity providers into local accounts.
#[derive(Clone)]
pub struct OAuthService {
    auth: AuthService,
    store: Arc<dyn AuthStore>,
    config: OAuthConfig,
    http: reqwest::Client,
}

impl OAuthService {
    pub fn new(
        auth: AuthService,
        store: Arc<dyn AuthStore>,
        config: &OAuthConfig,
    ) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(StdDuration::from_secs(config.http_timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        Ok(Self {
            auth,
            store,
            config: config.clone(),
            http,
        })
    }

    fn provider_config(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Google => &self.config.google,
            Provider::GitHub => &self.config.github,
        }
    }

    // ==================== HTTP surface ====================

    /// Exchange an authorization code for provider tokens.
    pub async fn exchange_code(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: Option<&str>,
    ) -> Result<ProviderTokens, ServiceError> {
        let config = self.provider_config(provider);
        let mut form = vec![
            ("client_id", config.client_id.as_str()),
            ("client_secret", config.client_secret.as_str()),
            ("code", code),
            ("grant_type", "authorization_code"),
        ];
        if let Some(uri) = redirect_uri {
            form.push(("redirect_uri", uri));
        }

        let response = self
            .http
            .post(&config.token_url)
            .header("Accept", "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Token exchange failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(provider = provider.as_str(), %status, "Token exchange rejected");
            return Err(ServiceError::InvalidToken);
        }

        let body: TokenExchangeResponse = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed token exchange response: {}", e))?;

        Ok(ProviderTokens {
            access_token: body.access_token,
            refresh_token: body.refresh_token,
            expires_in: body.expires_in,
        })
    }

    /// Fetch the external profile for an access token.
    pub async fn fetch_profile(
        &self,
        provider: Provider,
        access_token: &str,
    ) -> Result<ExternalProfile, ServiceError> {
        let config = self.provider_config(provider);
        let response = self
            .http
            .get(&config.userinfo_url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .header("User-Agent", "campus-auth")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Profile fetch failed: {}", e))?;

        if !response.status().is_success() {
            return Err(ServiceError::InvalidToken);
        }

        match provider {
            Provider::Google => {
                let profile: GoogleProfile = response
                    .json()
                    .await
                    .map_err(|e| anyhow::anyhow!("Malformed profile response: {}", e))?;
                Ok(ExternalProfile {
                    provider_user_id: profile.id,
                    email: profile.email,
                    name: profile.name,
                })
            }
            Provider::GitHub => {
                let profile: GitHubProfile = response
                    .json()
                    .await
                    .map_err(|e| anyhow::anyhow!("Malformed profile response: {}", e))?;

                let email = match profile.email {
                    Some(email) => Some(email),
                    None => self.fetch_github_primary_email(access_token).await?,
                };

                Ok(ExternalProfile {
                    provider_user_id: profile.id.to_string(),
                    email,
                    name: profile.name.or(Some(profile.login)),
                })
            }
        }
    }

    /// GitHub hides the email on the profile when it is private; the
    /// verified primary address comes from the emails endpoint instead.
    async fn fetch_github_primary_email(
        &self,
        access_token: &str,
    ) -> Result<Option<String>, ServiceError> {
        let url = format!("{}/emails", self.config.github.userinfo_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .header("User-Agent", "campus-auth")
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("Email lookup failed: {}", e))?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let emails: Vec<GitHubEmail> = response
            .json()
            .await
            .map_err(|e| anyhow::anyhow!("Malformed email response: {}", e))?;

        Ok(emails
            .into_iter()
            .find(|e| e.primary && e.verified)
            .map(|e| e.email))
    }

    /// End-to-end login with an authorization code.
    pub async fn oauth_login(
        &self,
        provider: Provider,
        code: &str,
        redirect_uri: Option<&str>,
        ip: Option<&str>,
    ) -> Result<AuthResponse, ServiceError> {
        let tokens = self.exchange_code(provider, code, redirect_uri).await?;
        let profile = self.fetch_profile(provider, &tokens.access_token).await?;
        self.complete_login(provider, profile, tokens, ip).await
    }

    // ==================== Account mapping ====================

    /// Map an external identity to a local account and issue a token pair.
    /// Split from the HTTP surface so it is testable without a provider.
    pub async fn complete_login(
        &self,
        provider: Provider,
        profile: ExternalProfile,
        tokens: ProviderTokens,
        ip: Option<&str>,
    ) -> Result<AuthResponse, ServiceError> {
        let mut user = match self.resolve_account(provider, &profile).await? {
            Some(user) => user,
            None => self.create_account(provider, &profile).await?,
        };

        if !user.is_active {
            return Err(ServiceError::AccountDeactivated);
        }

        self.upsert_link(provider, user.id, &profile, &tokens).await?;

        user.last_login_at = Some(Utc::now());
        self.store.update_user(&user).await?;

        let response = self.auth.issue_token_pair(&user, ip).await?;

        self.auth
            .audit()
            .record(
                AuditLog::new(
                    "user.oauth_login",
                    "user",
                    Some(user.id.to_string()),
                    Some(user.id),
                )
                .with_ip(ip)
                .with_new_values(&provider.as_str()),
            )
            .await;

        tracing::info!(user_id = %user.id, provider = provider.as_str(), "OAuth login");
        Ok(response)
    }

    /// Link a provider to an already-authenticated account. Fails with
    /// `Conflict` when the provider is already linked.
    pub async fn link_provider(
        &self,
        user_id: Uuid,
        provider: Provider,
        profile: ExternalProfile,
        tokens: ProviderTokens,
    ) -> Result<OAuthAccount, ServiceError> {
        if self.store.find_user_by_id(user_id).await?.is_none() {
            return Err(ServiceError::UserNotFound);
        }

        let account = OAuthAccount::new(
            user_id,
            provider.as_str().to_string(),
            profile.provider_user_id,
            profile.email,
            profile.name,
            tokens.access_token,
            tokens.refresh_token,
            tokens.expires_in.map(|s| Utc::now() + Duration::seconds(s)),
        );

        match self.store.insert_oauth_account(&account).await {
            Ok(()) => {
                tracing::info!(user_id = %user_id, provider = provider.as_str(), "Provider linked");
                Ok(account)
            }
            Err(StoreError::Conflict(_)) => Err(ServiceError::ProviderAlreadyLinked),
            Err(e) => Err(e.into()),
        }
    }

    /// Unlink a provider. Returns false, not an error, when it was not
    /// linked.
    pub async fn unlink_provider(
        &self,
        user_id: Uuid,
        provider: Provider,
    ) -> Result<bool, ServiceError> {
        let removed = self
            .store
            .delete_oauth_account(user_id, provider.as_str())
            .await?;
        if removed {
            tracing::info!(user_id = %user_id, provider = provider.as_str(), "Provider unlinked");
        }
        Ok(removed)
    }

    /// Provider names currently linked to the account, oldest first.
    pub async fn linked_providers(&self, user_id: Uuid) -> Result<Vec<String>, ServiceError> {
        Ok(self
            .store
            .oauth_accounts_for_user(user_id)
            .await?
            .into_iter()
            .map(|a| a.provider)
            .collect())
    }

    // ==================== Internals ====================

    async fn resolve_account(
        &self,
        provider: Provider,
        profile: &ExternalProfile,
    ) -> Result<Option<User>, ServiceError> {
        // An existing link wins over an email match.
        if let Some(link) = self
            .store
            .find_oauth_account(provider.as_str(), &profile.provider_user_id)
            .await?
        {
            return Ok(self.store.find_user_by_id(link.user_id).await?);
        }

        if let Some(email) = &profile.email {
            return Ok(self.store.find_user_by_email(email).await?);
        }

        Ok(None)
    }

    async fn create_account(
        &self,
        provider: Provider,
        profile: &ExternalProfile,
    ) -> Result<User, ServiceError> {
        let email = profile.email.clone().ok_or_else(|| {
            ServiceError::Validation("Provider did not supply an email address".to_string())
        })?;

        let (first_name, last_name) = split_name(profile.name.as_deref(), &email);

        // Local password is random and never disclosed; the account can
        // only authenticate through the provider until a reset.
        let hash = hash_password(&Password::new(generate_secure_token()))?;

        let mut user = User::new(first_name, last_name, email, hash.into_string());
        user.email_verified = provider.trusts_email();

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => {
                // Raced with a concurrent registration for the same email.
                return self
                    .store
                    .find_user_by_email(&user.email)
                    .await?
                    .ok_or_else(|| {
                        ServiceError::Internal(anyhow::anyhow!("Account vanished after conflict"))
                    });
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(role) = self
            .auth
            .rbac()
            .default_role_for(Some(provider.default_account_type()))
            .await?
        {
            self.store
                .assign_role(&UserRole::new(user.id, role.id, None))
                .await?;
        }

        tracing::info!(user_id = %user.id, provider = provider.as_str(), "Account created via OAuth");
        Ok(user)
    }

    async fn upsert_link(
        &self,
        provider: Provider,
        user_id: Uuid,
        profile: &ExternalProfile,
        tokens: &ProviderTokens,
    ) -> Result<(), ServiceError> {
        let token_expires = tokens.expires_in.map(|s| Utc::now() + Duration::seconds(s));

        if let Some(mut link) = self
            .store
            .find_oauth_account_for_user(user_id, provider.as_str())
            .await?
        {
            link.provider_email = profile.email.clone();
            link.provider_name = profile.name.clone();
            link.access_token = tokens.access_token.clone();
            link.refresh_token = tokens.refresh_token.clone();
            link.token_expires = token_expires;
            link.last_used_at = Utc::now();
            self.store.update_oauth_account(&link).await?;
            return Ok(());
        }

        let link = OAuthAccount::new(
            user_id,
            provider.as_str().to_string(),
            profile.provider_user_id.clone(),
            profile.email.clone(),
            profile.name.clone(),
            tokens.access_token.clone(),
            tokens.refresh_token.clone(),
            token_expires,
        );
        self.store.insert_oauth_account(&link).await?;
        Ok(())
    }
}

/// Split a display name into first/last, falling back to the email local
/// part when the provider sent no name.
fn split_name(name: Option<&str>, email: &str) -> (String, String) {
    match name {
        Some(name) if !name.trim().is_empty() => {
            let mut parts = name.trim().splitn(2, ' ');
            let first = parts.next().unwrap_or_default().to_string();
            let last = parts.next().unwrap_or_default().to_string();
            (first, last)
        }
        _ => {
            let local = email.split('@').next().unwrap_or("user");
            (local.to_string(), String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_parsing() {
        assert_eq!("google".parse::<Provider>().unwrap(), Provider::Google);
        assert_eq!("GitHub".parse::<Provider>().unwrap(), Provider::GitHub);
        assert!(matches!(
            "facebook".parse::<Provider>(),
            Err(ServiceError::UnsupportedProvider(_))
        ));
    }

    #[test]
    fn test_split_name() {
        assert_eq!(
            split_name(Some("Ada Lovelace"), "ada@example.com"),
            ("Ada".to_string(), "Lovelace".to_string())
        );
        assert_eq!(
            split_name(Some("Plato"), "plato@example.com"),
            ("Plato".to_string(), String::new())
        );
        assert_eq!(
            split_name(None, "ada@example.com"),
            ("ada".to_string(), String::new())
        );
    }
}
