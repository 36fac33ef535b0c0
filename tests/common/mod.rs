//! Shared harness for integration tests: an engine wired to the in-memory
//! store and the recording email mock, with RBAC fixtures seeded.

#![allow(dead_code)]

use std::sync::Arc;

use campus_auth::config::{
    default_weak_patterns, AuditConfig, AuthConfig, DatabaseConfig, Environment, JwtConfig,
    OAuthConfig, PasswordConfig, ProviderConfig, SecurityConfig, SmtpConfig, TokenRetentionConfig,
};
use campus_auth::models::RegisterRequest;
use campus_auth::services::MockEmailService;
use campus_auth::store::MemoryStore;
use campus_auth::{AuthService, OAuthService};

pub struct TestContext {
    pub store: Arc<MemoryStore>,
    pub email: Arc<MockEmailService>,
    pub auth: AuthService,
    pub oauth: OAuthService,
}

pub fn test_config() -> AuthConfig {
    AuthConfig {
        environment: Environment::Dev,
        log_level: "debug".to_string(),
        database: DatabaseConfig {
            url: "postgres://localhost/campus_auth_test".to_string(),
            max_connections: 5,
            min_connections: 1,
        },
        jwt: JwtConfig {
            secret: "integration-test-secret-0123456789abcdef".to_string(),
            issuer: "campus-auth".to_string(),
            audience: "campus-api".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        tokens: TokenRetentionConfig {
            keep_per_account: 5,
            retention_after_expiry_days: 30,
            cleanup_interval_secs: 3600,
            cleanup_retry_secs: 300,
        },
        audit: AuditConfig {
            retention_days: 365,
            cleanup_interval_secs: 86400,
            cleanup_retry_secs: 3600,
        },
        password: PasswordConfig {
            weak_patterns: default_weak_patterns(),
        },
        security: SecurityConfig {
            send_login_notifications: false,
            verification_token_expiry_hours: 24,
            reset_token_expiry_hours: 1,
        },
        smtp: SmtpConfig {
            user: "noreply@example.com".to_string(),
            app_password: String::new(),
        },
        oauth: OAuthConfig {
            google: ProviderConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                token_url: "http://localhost:9/token".to_string(),
                userinfo_url: "http://localhost:9/userinfo".to_string(),
            },
            github: ProviderConfig {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                token_url: "http://localhost:9/token".to_string(),
                userinfo_url: "http://localhost:9/user".to_string(),
            },
            http_timeout_secs: 1,
        },
    }
}

/// Build an engine over fresh in-memory state with the standard roles and
/// a couple of course permissions seeded.
pub async fn context() -> TestContext {
    let store = Arc::new(MemoryStore::new());
    let email = Arc::new(MockEmailService::new());
    let config = test_config();

    let auth = AuthService::new(store.clone(), email.clone(), &config);
    let oauth = OAuthService::new(auth.clone(), store.clone(), &config.oauth)
        .expect("failed to build oauth service");

    auth.rbac()
        .create_role("Student", "Default learner role", true)
        .await
        .unwrap();
    auth.rbac()
        .create_role("Instructor", "Course author", false)
        .await
        .unwrap();
    auth.rbac()
        .create_role("Admin", "Administrator", false)
        .await
        .unwrap();

    auth.rbac()
        .create_permission("course.view", "course")
        .await
        .unwrap();
    auth.rbac()
        .create_permission("course.create", "course")
        .await
        .unwrap();

    auth.rbac()
        .grant_permission("Student", "course.view", None)
        .await
        .unwrap();
    auth.rbac()
        .grant_permission("Instructor", "course.view", None)
        .await
        .unwrap();
    auth.rbac()
        .grant_permission("Instructor", "course.create", None)
        .await
        .unwrap();

    TestContext {
        store,
        email,
        auth,
        oauth,
    }
}

pub fn register_request(email: &str) -> RegisterRequest {
    RegisterRequest {
        first_name: "Ada".to_string(),
        last_name: "Lovelace".to_string(),
        email: email.to_string(),
        password: "Tr0ub4dor&3x".to_string(),
        account_type: None,
    }
}

/// Register and verify an account, returning nothing; the caller logs in
/// with the well-known test password afterwards.
pub async fn register_verified(ctx: &TestContext, email: &str) {
    ctx.auth
        .register(register_request(email), None)
        .await
        .unwrap();
    let token = ctx
        .email
        .last_verification_token(email)
        .expect("verification email not sent");
    ctx.auth.verify_email(&token).await.unwrap();
}
