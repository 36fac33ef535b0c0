//! The auth engine: login, registration, token refresh/revocation,
//! password reset, email verification, account state.

use std::sync::Arc;

use chrono::{Duration, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::config::AuthConfig;
use crate::models::{
    AuditLog, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    RegisterRequest, ResetPasswordRequest, User, UserDto, UserRole,
};
use crate::services::audit::AuditService;
use crate::services::email::EmailProvider;
use crate::services::error::ServiceError;
use crate::services::jwt::JwtService;
use crate::services::rbac::RbacService;
use crate::services::tokens::RefreshTokenService;
use crate::store::{AuthStore, StoreError};
use crate::utils::{
    generate_secure_token, hash_password, validate_password_strength, verify_password, Password,
    PasswordHashString,
};

/// Orchestrates the credential flows over the store, token services and
/// outbound collaborators.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn AuthStore>,
    jwt: JwtService,
    tokens: RefreshTokenService,
    rbac: RbacService,
    email: Arc<dyn EmailProvider>,
    audit: AuditService,
    weak_patterns: Vec<String>,
    send_login_notifications: bool,
    verification_token_expiry_hours: i64,
    reset_token_expiry_hours: i64,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn AuthStore>,
        email: Arc<dyn EmailProvider>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            jwt: JwtService::new(&config.jwt),
            tokens: RefreshTokenService::new(store.clone(), &config.jwt, &config.tokens),
            rbac: RbacService::new(store.clone()),
            audit: AuditService::new(store.clone()),
            store,
            email,
            weak_patterns: config.password.weak_patterns.clone(),
            send_login_notifications: config.security.send_login_notifications,
            verification_token_expiry_hours: config.security.verification_token_expiry_hours,
            reset_token_expiry_hours: config.security.reset_token_expiry_hours,
        }
    }

    pub fn jwt(&self) -> &JwtService {
        &self.jwt
    }

    pub fn tokens(&self) -> &RefreshTokenService {
        &self.tokens
    }

    pub fn rbac(&self) -> &RbacService {
        &self.rbac
    }

    pub fn audit(&self) -> &AuditService {
        &self.audit
    }

    // ==================== Registration ====================

    pub async fn register(
        &self,
        request: RegisterRequest,
        ip: Option<&str>,
    ) -> Result<AuthResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        if self.store.email_exists(&request.email).await? {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        validate_password_strength(&request.password, &self.weak_patterns)
            .map_err(ServiceError::WeakPassword)?;

        let hash = hash_password(&Password::new(request.password))?;
        let mut user = User::new(
            request.first_name,
            request.last_name,
            request.email,
            hash.into_string(),
        );
        user.email_verification_token = Some(generate_secure_token());
        user.email_verification_expires =
            Some(Utc::now() + Duration::hours(self.verification_token_expiry_hours));

        match self.store.insert_user(&user).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(ServiceError::EmailAlreadyRegistered),
            Err(e) => return Err(e.into()),
        }

        if let Some(role) = self.rbac.default_role_for(request.account_type).await? {
            self.store
                .assign_role(&UserRole::new(user.id, role.id, None))
                .await?;
        } else {
            tracing::warn!(user_id = %user.id, "No default role configured");
        }

        // Token pair is issued immediately; the account operates in a
        // reduced-trust state until the email is verified.
        let response = self.issue_token_pair(&user, ip).await?;

        if let Some(token) = &user.email_verification_token {
            if let Err(e) = self.email.send_verification_email(&user.email, token).await {
                tracing::warn!(error = %e, user_id = %user.id, "Failed to send verification email");
            }
        }

        self.audit
            .record(
                AuditLog::new("user.register", "user", Some(user.id.to_string()), Some(user.id))
                    .with_ip(ip)
                    .with_new_values(&user.email),
            )
            .await;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(response)
    }

    // ==================== Login ====================

    pub async fn login(
        &self,
        request: LoginRequest,
        ip: Option<&str>,
    ) -> Result<AuthResponse, ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        // Unknown email and wrong password are indistinguishable to the
        // caller; account state checks come after the password succeeds.
        let mut user = self
            .store
            .find_user_by_email(&request.email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let hash = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&Password::new(request.password), &hash) {
            tracing::debug!(user_id = %user.id, "Login failed: bad password");
            return Err(ServiceError::InvalidCredentials);
        }

        if !user.is_active {
            return Err(ServiceError::AccountDeactivated);
        }
        if !user.email_verified {
            return Err(ServiceError::EmailNotVerified);
        }

        user.last_login_at = Some(Utc::now());
        self.store.update_user(&user).await?;

        let response = self.issue_token_pair(&user, ip).await?;

        // Session cap is best-effort; a failure here must not fail login.
        if let Err(e) = self.tokens.prune_oldest(user.id).await {
            tracing::warn!(error = %e, user_id = %user.id, "Refresh token pruning failed");
        }

        self.audit
            .record(
                AuditLog::new("user.login", "user", Some(user.id.to_string()), Some(user.id))
                    .with_ip(ip),
            )
            .await;

        if self.send_login_notifications {
            if let Err(e) = self.email.send_login_notification(&user.email, ip).await {
                tracing::warn!(error = %e, user_id = %user.id, "Failed to send login notification");
            }
        }

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(response)
    }

    // ==================== Token refresh and revocation ====================

    /// Exchange a refresh token for a new pair. Single-use: the presented
    /// token is revoked even if two callers race, and only one wins.
    pub async fn refresh_token(
        &self,
        token: &str,
        ip: Option<&str>,
    ) -> Result<AuthResponse, ServiceError> {
        let record = self
            .tokens
            .lookup(token)
            .await?
            .ok_or(ServiceError::InvalidToken)?;

        if !record.is_active() {
            return Err(ServiceError::InvalidToken);
        }

        let user = self
            .store
            .find_user_by_id(record.user_id)
            .await?
            .ok_or(ServiceError::InvalidToken)?;
        if !user.is_active {
            return Err(ServiceError::AccountDeactivated);
        }

        let successor = self.tokens.rotate(&record, ip).await?;

        // Roles and permissions are re-resolved so grants made since the
        // last login take effect on the next refresh.
        let roles = self.rbac.roles_of(user.id).await?;
        let permissions = self.rbac.permissions_of(user.id).await?;
        let access_token = self.jwt.issue_access_token(&user, roles.clone(), permissions.clone())?;

        Ok(AuthResponse::new(
            access_token,
            successor.token,
            self.jwt.access_token_expiry_seconds(),
            user.sanitized(roles, permissions),
        ))
    }

    /// Revoke a token and every descendant along its rotation chain.
    /// Returns false, not an error, when the token is unknown or already
    /// revoked.
    pub async fn revoke_token(&self, token: &str, ip: Option<&str>) -> Result<bool, ServiceError> {
        let record = match self.tokens.lookup(token).await? {
            Some(r) => r,
            None => return Ok(false),
        };

        let revoked = self.tokens.revoke(token, ip, "revoked").await?;
        self.tokens
            .revoke_descendants(token, ip, "ancestor revoked")
            .await?;

        if revoked {
            self.audit
                .record(
                    AuditLog::new(
                        "token.revoke",
                        "refresh_token",
                        Some(record.id.to_string()),
                        Some(record.user_id),
                    )
                    .with_ip(ip),
                )
                .await;
        }

        Ok(revoked)
    }

    // ==================== Password recovery ====================

    /// Always succeeds from the caller's perspective, whether or not the
    /// email is registered.
    pub async fn forgot_password(
        &self,
        request: ForgotPasswordRequest,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let mut user = match self.store.find_user_by_email(&request.email).await? {
            Some(u) if u.is_active => u,
            _ => {
                tracing::debug!("Password reset requested for unknown or inactive account");
                return Ok(());
            }
        };

        user.password_reset_token = Some(generate_secure_token());
        user.password_reset_expires =
            Some(Utc::now() + Duration::hours(self.reset_token_expiry_hours));
        self.store.update_user(&user).await?;

        if let Some(token) = &user.password_reset_token {
            if let Err(e) = self.email.send_password_reset_email(&user.email, token).await {
                tracing::warn!(error = %e, user_id = %user.id, "Failed to send reset email");
            }
        }

        self.audit
            .record(
                AuditLog::new(
                    "user.forgot_password",
                    "user",
                    Some(user.id.to_string()),
                    Some(user.id),
                )
                .with_ip(ip),
            )
            .await;

        Ok(())
    }

    pub async fn reset_password(
        &self,
        request: ResetPasswordRequest,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        request
            .validate()
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        let mut user = self
            .store
            .find_user_by_reset_token(&request.token)
            .await?
            .ok_or(ServiceError::ResetTokenInvalid)?;

        match user.password_reset_expires {
            Some(expires) if Utc::now() < expires => {}
            _ => return Err(ServiceError::ResetTokenInvalid),
        }

        validate_password_strength(&request.password, &self.weak_patterns)
            .map_err(ServiceError::WeakPassword)?;

        let hash = hash_password(&Password::new(request.password))?;
        user.password_hash = hash.into_string();
        user.password_reset_token = None;
        user.password_reset_expires = None;
        self.store.update_user(&user).await?;

        // Force re-authentication everywhere.
        let revoked = self
            .tokens
            .revoke_all_for_user(user.id, ip, "password reset")
            .await?;

        self.audit
            .record(
                AuditLog::new(
                    "user.reset_password",
                    "user",
                    Some(user.id.to_string()),
                    Some(user.id),
                )
                .with_ip(ip),
            )
            .await;

        tracing::info!(user_id = %user.id, revoked_tokens = revoked, "Password reset");
        Ok(())
    }

    /// Requires the current password. Unlike a reset, existing sessions
    /// stay valid because the actor is already authenticated.
    pub async fn change_password(
        &self,
        user_id: Uuid,
        request: ChangePasswordRequest,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let hash = PasswordHashString::new(user.password_hash.clone());
        if !verify_password(&Password::new(request.current_password), &hash) {
            return Err(ServiceError::WrongCurrentPassword);
        }

        validate_password_strength(&request.new_password, &self.weak_patterns)
            .map_err(ServiceError::WeakPassword)?;

        let new_hash = hash_password(&Password::new(request.new_password))?;
        user.password_hash = new_hash.into_string();
        self.store.update_user(&user).await?;

        self.audit
            .record(
                AuditLog::new(
                    "user.change_password",
                    "user",
                    Some(user.id.to_string()),
                    Some(user.id),
                )
                .with_ip(ip),
            )
            .await;

        Ok(())
    }

    // ==================== Email verification ====================

    pub async fn verify_email(&self, token: &str) -> Result<(), ServiceError> {
        let mut user = self
            .store
            .find_user_by_verification_token(token)
            .await?
            .ok_or(ServiceError::VerificationTokenInvalid)?;

        match user.email_verification_expires {
            Some(expires) if Utc::now() < expires => {}
            _ => return Err(ServiceError::VerificationTokenInvalid),
        }

        user.email_verified = true;
        user.email_verification_token = None;
        user.email_verification_expires = None;
        self.store.update_user(&user).await?;

        if let Err(e) = self.email.send_welcome_email(&user.email, &user.first_name).await {
            tracing::warn!(error = %e, user_id = %user.id, "Failed to send welcome email");
        }

        self.audit
            .record(AuditLog::new(
                "user.verify_email",
                "user",
                Some(user.id.to_string()),
                Some(user.id),
            ))
            .await;

        tracing::info!(user_id = %user.id, "Email verified");
        Ok(())
    }

    /// Success-shaped whether or not the email is registered or already
    /// verified.
    pub async fn resend_verification(&self, email: &str) -> Result<(), ServiceError> {
        let mut user = match self.store.find_user_by_email(email).await? {
            Some(u) if u.is_active && !u.email_verified => u,
            _ => return Ok(()),
        };

        user.email_verification_token = Some(generate_secure_token());
        user.email_verification_expires =
            Some(Utc::now() + Duration::hours(self.verification_token_expiry_hours));
        self.store.update_user(&user).await?;

        if let Some(token) = &user.email_verification_token {
            if let Err(e) = self.email.send_verification_email(&user.email, token).await {
                tracing::warn!(error = %e, user_id = %user.id, "Failed to resend verification email");
            }
        }

        Ok(())
    }

    // ==================== Account state ====================

    /// Deactivate an account and revoke all of its sessions. An actor can
    /// never deactivate their own account.
    pub async fn deactivate_account(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        if user_id == actor_id {
            return Err(ServiceError::SelfDeactivation);
        }

        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        user.is_active = false;
        self.store.update_user(&user).await?;
        self.tokens
            .revoke_all_for_user(user_id, ip, "account deactivated")
            .await?;

        self.audit
            .record(
                AuditLog::new(
                    "user.deactivate",
                    "user",
                    Some(user_id.to_string()),
                    Some(actor_id),
                )
                .with_ip(ip),
            )
            .await;

        tracing::info!(user_id = %user_id, actor_id = %actor_id, "Account deactivated");
        Ok(())
    }

    pub async fn activate_account(
        &self,
        user_id: Uuid,
        actor_id: Uuid,
        ip: Option<&str>,
    ) -> Result<(), ServiceError> {
        let mut user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        user.is_active = true;
        self.store.update_user(&user).await?;

        self.audit
            .record(
                AuditLog::new(
                    "user.activate",
                    "user",
                    Some(user_id.to_string()),
                    Some(actor_id),
                )
                .with_ip(ip),
            )
            .await;

        Ok(())
    }

    /// Sanitized view of an account with its resolved roles and permissions.
    pub async fn account_summary(&self, user_id: Uuid) -> Result<UserDto, ServiceError> {
        let user = self
            .store
            .find_user_by_id(user_id)
            .await?
            .ok_or(ServiceError::UserNotFound)?;

        let roles = self.rbac.roles_of(user_id).await?;
        let permissions = self.rbac.permissions_of(user_id).await?;
        Ok(user.sanitized(roles, permissions))
    }

    // ==================== Internals ====================

    pub(crate) async fn issue_token_pair(
        &self,
        user: &User,
        ip: Option<&str>,
    ) -> Result<AuthResponse, ServiceError> {
        let roles = self.rbac.roles_of(user.id).await?;
        let permissions = self.rbac.permissions_of(user.id).await?;

        let access_token = self
            .jwt
            .issue_access_token(user, roles.clone(), permissions.clone())?;
        let refresh = self.tokens.issue(user.id, ip).await?;

        Ok(AuthResponse::new(
            access_token,
            refresh.token,
            self.jwt.access_token_expiry_seconds(),
            user.sanitized(roles, permissions),
        ))
    }
}
