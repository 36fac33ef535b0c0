//! JWT service for access token generation and validation.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::User;

/// Signs and validates access tokens with a shared HMAC secret.
#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    access_token_expiry_minutes: i64,
}

/// Claims for access tokens (short-lived)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
    /// JWT ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl JwtService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        }
    }

    /// Generate an access token carrying the user's resolved roles and
    /// permissions.
    pub fn issue_access_token(
        &self,
        user: &User,
        roles: Vec<String>,
        permissions: Vec<String>,
    ) -> Result<String, anyhow::Error> {
        let now = Utc::now();
        let claims = AccessTokenClaims {
            sub: user.id.to_string(),
            email: user.email.clone(),
            given_name: user.first_name.clone(),
            family_name: user.last_name.clone(),
            roles,
            permissions,
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to sign access token: {}", e))
    }

    /// Validate signature, expiry, issuer and audience with zero clock
    /// leeway. Returns the subject user id, or None for any invalid token.
    pub fn validate_access_token(&self, token: &str) -> Option<Uuid> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;

        let data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation).ok()?;
        Uuid::parse_str(&data.claims.sub).ok()
    }

    /// Decode the claims of a fully valid token. Applies the same
    /// signature, expiry, issuer and audience checks as
    /// [`validate_access_token`](Self::validate_access_token).
    pub fn decode_claims(&self, token: &str) -> Option<AccessTokenClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.leeway = 0;
        decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .ok()
            .map(|d| d.claims)
    }

    /// Generate an opaque refresh token value: 512 random bits, base64.
    pub fn generate_refresh_token() -> String {
        let mut bytes = [0u8; 64];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        STANDARD.encode(bytes)
    }

    /// Access token lifetime in seconds, for `expires_in` fields.
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(minutes: i64) -> JwtConfig {
        JwtConfig {
            secret: "test-secret-that-is-long-enough-000000".to_string(),
            issuer: "campus-auth".to_string(),
            audience: "campus-api".to_string(),
            access_token_expiry_minutes: minutes,
            refresh_token_expiry_days: 7,
        }
    }

    fn test_user() -> User {
        User::new(
            "Ada".to_string(),
            "Lovelace".to_string(),
            "ada@example.com".to_string(),
            "$argon2id$stub".to_string(),
        )
    }

    #[test]
    fn test_issue_and_validate_roundtrip() {
        let service = JwtService::new(&config(15));
        let user = test_user();

        let token = service
            .issue_access_token(
                &user,
                vec!["Student".to_string()],
                vec!["course.view".to_string()],
            )
            .unwrap();

        assert_eq!(service.validate_access_token(&token), Some(user.id));

        let claims = service.decode_claims(&token).unwrap();
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.given_name, "Ada");
        assert_eq!(claims.roles, vec!["Student"]);
        assert_eq!(claims.permissions, vec!["course.view"]);
        assert_eq!(claims.iss, "campus-auth");
        assert_eq!(claims.aud, "campus-api");
    }

    #[test]
    fn test_expired_token_rejected() {
        let service = JwtService::new(&config(-5));
        let token = service
            .issue_access_token(&test_user(), vec![], vec![])
            .unwrap();

        assert_eq!(service.validate_access_token(&token), None);
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let issuing = JwtService::new(&config(15));
        let token = issuing
            .issue_access_token(&test_user(), vec![], vec![])
            .unwrap();

        let mut other = config(15);
        other.issuer = "someone-else".to_string();
        let validating = JwtService::new(&other);
        assert_eq!(validating.validate_access_token(&token), None);
    }

    #[test]
    fn test_wrong_audience_rejected() {
        let issuing = JwtService::new(&config(15));
        let token = issuing
            .issue_access_token(&test_user(), vec![], vec![])
            .unwrap();

        let mut other = config(15);
        other.audience = "other-api".to_string();
        let validating = JwtService::new(&other);
        assert_eq!(validating.validate_access_token(&token), None);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuing = JwtService::new(&config(15));
        let token = issuing
            .issue_access_token(&test_user(), vec![], vec![])
            .unwrap();

        let mut other = config(15);
        other.secret = "another-secret-that-is-long-enough-11".to_string();
        let validating = JwtService::new(&other);
        assert_eq!(validating.validate_access_token(&token), None);
    }

    #[test]
    fn test_garbage_token_rejected() {
        let service = JwtService::new(&config(15));
        assert_eq!(service.validate_access_token("not.a.jwt"), None);
        assert_eq!(service.validate_access_token(""), None);
    }

    #[test]
    fn test_refresh_token_values_are_unique() {
        let a = JwtService::generate_refresh_token();
        let b = JwtService::generate_refresh_token();
        assert_ne!(a, b);
        // 64 bytes encode to 88 base64 characters
        assert_eq!(a.len(), 88);
    }
}
