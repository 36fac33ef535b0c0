use serde::Deserialize;
use std::env;

/// Default denylist of weak password substrings, matched case-insensitively.
pub fn default_weak_patterns() -> Vec<String> {
    [
        "password", "123456", "qwerty", "abc123", "admin", "letmein", "welcome", "monkey",
        "dragon", "master", "login",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub environment: Environment,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub tokens: TokenRetentionConfig,
    pub audit: AuditConfig,
    pub password: PasswordConfig,
    pub security: SecurityConfig,
    pub smtp: SmtpConfig,
    pub oauth: OAuthConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct JwtConfig {
    /// Symmetric HMAC-SHA256 signing secret.
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
}

#[derive(Debug, Clone)]
pub struct TokenRetentionConfig {
    /// Refresh tokens kept per account after login pruning.
    pub keep_per_account: usize,
    /// Days an expired/revoked token is retained before background deletion.
    pub retention_after_expiry_days: i64,
    pub cleanup_interval_secs: u64,
    pub cleanup_retry_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub retention_days: i64,
    pub cleanup_interval_secs: u64,
    pub cleanup_retry_secs: u64,
}

#[derive(Debug, Clone)]
pub struct PasswordConfig {
    pub weak_patterns: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    pub send_login_notifications: bool,
    pub verification_token_expiry_hours: i64,
    pub reset_token_expiry_hours: i64,
}

#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub user: String,
    pub app_password: String,
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub google: ProviderConfig,
    pub github: ProviderConfig,
    /// Timeout applied to provider token/profile calls, in seconds.
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str.parse().map_err(|e: String| anyhow::anyhow!(e))?;
        let is_prod = environment == Environment::Prod;

        let config = AuthConfig {
            environment,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            database: DatabaseConfig {
                url: get_env("DATABASE_URL", Some("postgres://localhost/campus_auth"), is_prod)?,
                max_connections: parse_env("DATABASE_MAX_CONNECTIONS", "10", is_prod)?,
                min_connections: parse_env("DATABASE_MIN_CONNECTIONS", "1", is_prod)?,
            },
            jwt: JwtConfig {
                secret: get_env("JWT_SECRET", Some("dev-only-secret-change-me-0123456789"), is_prod)?,
                issuer: get_env("JWT_ISSUER", Some("campus-auth"), is_prod)?,
                audience: get_env("JWT_AUDIENCE", Some("campus-api"), is_prod)?,
                access_token_expiry_minutes: parse_env("JWT_ACCESS_TOKEN_EXPIRY_MINUTES", "15", is_prod)?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
            },
            tokens: TokenRetentionConfig {
                keep_per_account: parse_env("REFRESH_TOKENS_KEEP_PER_ACCOUNT", "5", is_prod)?,
                retention_after_expiry_days: parse_env("REFRESH_TOKEN_RETENTION_DAYS", "30", is_prod)?,
                cleanup_interval_secs: parse_env("TOKEN_CLEANUP_INTERVAL_SECS", "3600", is_prod)?,
                cleanup_retry_secs: parse_env("TOKEN_CLEANUP_RETRY_SECS", "300", is_prod)?,
            },
            audit: AuditConfig {
                retention_days: parse_env("AUDIT_RETENTION_DAYS", "365", is_prod)?,
                cleanup_interval_secs: parse_env("AUDIT_CLEANUP_INTERVAL_SECS", "86400", is_prod)?,
                cleanup_retry_secs: parse_env("AUDIT_CLEANUP_RETRY_SECS", "3600", is_prod)?,
            },
            password: PasswordConfig {
                weak_patterns: match env::var("PASSWORD_WEAK_PATTERNS") {
                    Ok(val) => val.split(',').map(|s| s.trim().to_lowercase()).collect(),
                    Err(_) => default_weak_patterns(),
                },
            },
            security: SecurityConfig {
                send_login_notifications: parse_env("SEND_LOGIN_NOTIFICATIONS", "false", is_prod)?,
                verification_token_expiry_hours: parse_env("VERIFICATION_TOKEN_EXPIRY_HOURS", "24", is_prod)?,
                reset_token_expiry_hours: parse_env("RESET_TOKEN_EXPIRY_HOURS", "1", is_prod)?,
            },
            smtp: SmtpConfig {
                user: get_env("SMTP_USER", Some("noreply@example.com"), is_prod)?,
                app_password: get_env("SMTP_APP_PASSWORD", Some(""), is_prod)?,
            },
            oauth: OAuthConfig {
                google: ProviderConfig {
                    client_id: get_env("GOOGLE_CLIENT_ID", Some(""), is_prod)?,
                    client_secret: get_env("GOOGLE_CLIENT_SECRET", Some(""), is_prod)?,
                    token_url: get_env(
                        "GOOGLE_TOKEN_URL",
                        Some("https://oauth2.googleapis.com/token"),
                        is_prod,
                    )?,
                    userinfo_url: get_env(
                        "GOOGLE_USERINFO_URL",
                        Some("https://www.googleapis.com/oauth2/v2/userinfo"),
                        is_prod,
                    )?,
                },
                github: ProviderConfig {
                    client_id: get_env("GITHUB_CLIENT_ID", Some(""), is_prod)?,
                    client_secret: get_env("GITHUB_CLIENT_SECRET", Some(""), is_prod)?,
                    token_url: get_env(
                        "GITHUB_TOKEN_URL",
                        Some("https://github.com/login/oauth/access_token"),
                        is_prod,
                    )?,
                    userinfo_url: get_env(
                        "GITHUB_USERINFO_URL",
                        Some("https://api.github.com/user"),
                        is_prod,
                    )?,
                },
                http_timeout_secs: parse_env("OAUTH_HTTP_TIMEOUT_SECS", "10", is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), anyhow::Error> {
        if self.jwt.access_token_expiry_minutes <= 0 {
            anyhow::bail!("JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive");
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            anyhow::bail!("JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive");
        }

        if self.tokens.retention_after_expiry_days < 0 {
            anyhow::bail!("REFRESH_TOKEN_RETENTION_DAYS must not be negative");
        }

        if self.environment == Environment::Prod && self.jwt.secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 bytes in production");
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, anyhow::Error> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(anyhow::anyhow!("{} is required in production but not set", key))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(anyhow::anyhow!("{} is required but not set", key))
            }
        }
    }
}

fn parse_env<T>(key: &str, default: &str, is_prod: bool) -> Result<T, anyhow::Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| anyhow::anyhow!("Invalid value for {}: {}", key, e))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> AuthConfig {
        AuthConfig {
            environment: Environment::Dev,
            log_level: "info".to_string(),
            database: DatabaseConfig {
                url: "postgres://localhost/campus_auth".to_string(),
                max_connections: 10,
                min_connections: 1,
            },
            jwt: JwtConfig {
                secret: "dev-only-secret-change-me-0123456789".to_string(),
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
                    client_id: String::new(),
                    client_secret: String::new(),
                    token_url: "https://oauth2.googleapis.com/token".to_string(),
                    userinfo_url: "https://www.googleapis.com/oauth2/v2/userinfo".to_string(),
                },
                github: ProviderConfig {
                    client_id: String::new(),
                    client_secret: String::new(),
                    token_url: "https://github.com/login/oauth/access_token".to_string(),
                    userinfo_url: "https://api.github.com/user".to_string(),
                },
                http_timeout_secs: 10,
            },
        }
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(dev_config().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_nonpositive_expiry() {
        let mut config = dev_config();
        config.jwt.access_token_expiry_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_short_secret_in_prod() {
        let mut config = dev_config();
        config.environment = Environment::Prod;
        config.jwt.secret = "short".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_weak_patterns_cover_known_entries() {
        let patterns = default_weak_patterns();
        for expected in ["password", "123456", "qwerty", "admin", "letmein"] {
            assert!(patterns.iter().any(|p| p == expected));
        }
    }
}
