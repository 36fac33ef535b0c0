use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;

/// Newtype for password to prevent accidental logging
#[derive(Debug, Clone)]
pub struct Password(String);

impl Password {
    pub fn new(password: String) -> Self {
        Self(password)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Newtype for password hash
#[derive(Debug, Clone)]
pub struct PasswordHashString(String);

impl PasswordHashString {
    pub fn new(hash: String) -> Self {
        Self(hash)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// First failing strength rule, in check order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordPolicyError {
    Empty,
    TooShort,
    TooLong,
    MissingLowercase,
    MissingUppercase,
    MissingDigit,
    MissingSpecial,
    WeakPattern,
}

impl std::fmt::Display for PasswordPolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PasswordPolicyError::Empty => write!(f, "Password is required"),
            PasswordPolicyError::TooShort => {
                write!(f, "Password must be at least 8 characters long")
            }
            PasswordPolicyError::TooLong => {
                write!(f, "Password must be no longer than 128 characters")
            }
            PasswordPolicyError::MissingLowercase => {
                write!(f, "Password must contain at least one lowercase letter")
            }
            PasswordPolicyError::MissingUppercase => {
                write!(f, "Password must contain at least one uppercase letter")
            }
            PasswordPolicyError::MissingDigit => {
                write!(f, "Password must contain at least one digit")
            }
            PasswordPolicyError::MissingSpecial => {
                write!(f, "Password must contain at least one special character")
            }
            PasswordPolicyError::WeakPattern => {
                write!(f, "Password contains common weak patterns")
            }
        }
    }
}

impl std::error::Error for PasswordPolicyError {}

/// Hash a password using Argon2
///
/// Uses Argon2id variant with secure default parameters (comparable cost to
/// bcrypt work factor 12). Salt is automatically generated and included in
/// the hash. Fails on an empty password.
pub fn hash_password(password: &Password) -> Result<PasswordHashString, anyhow::Error> {
    if password.as_str().trim().is_empty() {
        return Err(anyhow::anyhow!("Password cannot be empty"));
    }

    let argon2 = Argon2::default();
    let salt = SaltString::generate(&mut OsRng);

    let password_hash = argon2
        .hash_password(password.as_str().as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
        .to_string();

    Ok(PasswordHashString::new(password_hash))
}

/// Verify a password against a hash.
///
/// Returns false, never an error, on empty input or a malformed hash.
pub fn verify_password(password: &Password, password_hash: &PasswordHashString) -> bool {
    if password.as_str().is_empty() || password_hash.as_str().is_empty() {
        return false;
    }

    let parsed_hash = match PasswordHash::new(password_hash.as_str()) {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(error = %e, "Malformed password hash");
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_str().as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a 256-bit random token, URL-safe base64 without padding.
/// Used for email verification and password reset links.
pub fn generate_secure_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Validate password strength. Rules are checked in a fixed order and the
/// first violation is returned: empty, length bounds, character classes,
/// then the weak-substring denylist (case-insensitive).
pub fn validate_password_strength(
    password: &str,
    weak_patterns: &[String],
) -> Result<(), PasswordPolicyError> {
    if password.trim().is_empty() {
        return Err(PasswordPolicyError::Empty);
    }

    // Length bounds count characters, not bytes, and the case classes are
    // Unicode-aware, so non-ASCII passwords are judged the same as ASCII
    // ones.
    let char_count = password.chars().count();
    if char_count < 8 {
        return Err(PasswordPolicyError::TooShort);
    }

    if char_count > 128 {
        return Err(PasswordPolicyError::TooLong);
    }

    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(PasswordPolicyError::MissingLowercase);
    }

    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(PasswordPolicyError::MissingUppercase);
    }

    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(PasswordPolicyError::MissingDigit);
    }

    if !password.chars().any(|c| !c.is_alphanumeric()) {
        return Err(PasswordPolicyError::MissingSpecial);
    }

    let lowered = password.to_lowercase();
    if weak_patterns
        .iter()
        .any(|pattern| lowered.contains(&pattern.to_lowercase()))
    {
        return Err(PasswordPolicyError::WeakPattern);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_weak_patterns;

    #[test]
    fn test_hash_password() {
        let password = Password::new("mySecureP@ssword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(!hash.as_str().is_empty());
        assert!(hash.as_str().starts_with("$argon2"));
    }

    #[test]
    fn test_hash_empty_password_fails() {
        let password = Password::new(String::new());
        assert!(hash_password(&password).is_err());
    }

    #[test]
    fn test_verify_password_correct() {
        let password = Password::new("mySecureP@ssword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        assert!(verify_password(&password, &hash));
    }

    #[test]
    fn test_verify_password_incorrect() {
        let password = Password::new("mySecureP@ssword123".to_string());
        let hash = hash_password(&password).expect("Failed to hash password");

        let wrong_password = Password::new("wrongPassword".to_string());
        assert!(!verify_password(&wrong_password, &hash));
    }

    #[test]
    fn test_verify_malformed_hash_returns_false() {
        let password = Password::new("mySecureP@ssword123".to_string());
        let bad_hash = PasswordHashString::new("not-a-real-hash".to_string());
        assert!(!verify_password(&password, &bad_hash));

        let empty_hash = PasswordHashString::new(String::new());
        assert!(!verify_password(&password, &empty_hash));
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let password = Password::new("mySecureP@ssword123".to_string());
        let hash1 = hash_password(&password).expect("Failed to hash password");
        let hash2 = hash_password(&password).expect("Failed to hash password");

        // Same password should produce different hashes (due to random salt)
        assert_ne!(hash1.as_str(), hash2.as_str());

        assert!(verify_password(&password, &hash1));
        assert!(verify_password(&password, &hash2));
    }

    #[test]
    fn test_generate_secure_token_is_url_safe() {
        let token = generate_secure_token();

        // 32 bytes encode to 43 characters without padding
        assert_eq!(token.len(), 43);
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));
        assert_ne!(token, generate_secure_token());
    }

    #[test]
    fn test_strength_rule_order() {
        let patterns = default_weak_patterns();

        assert_eq!(
            validate_password_strength("", &patterns),
            Err(PasswordPolicyError::Empty)
        );
        assert_eq!(
            validate_password_strength("short1!", &patterns),
            Err(PasswordPolicyError::TooShort)
        );
        assert_eq!(
            validate_password_strength(&format!("aA1!{}", "x".repeat(130)), &patterns),
            Err(PasswordPolicyError::TooLong)
        );
        assert_eq!(
            validate_password_strength("ALLUPPER1!", &patterns),
            Err(PasswordPolicyError::MissingLowercase)
        );
        assert_eq!(
            validate_password_strength("alllowercase1!", &patterns),
            Err(PasswordPolicyError::MissingUppercase)
        );
        assert_eq!(
            validate_password_strength("NoDigitsHere!", &patterns),
            Err(PasswordPolicyError::MissingDigit)
        );
        assert_eq!(
            validate_password_strength("NoSpecial123", &patterns),
            Err(PasswordPolicyError::MissingSpecial)
        );
        assert_eq!(
            validate_password_strength("Password123!", &patterns),
            Err(PasswordPolicyError::WeakPattern)
        );
    }

    #[test]
    fn test_strength_accepts_strong_password() {
        let patterns = default_weak_patterns();
        assert_eq!(validate_password_strength("Tr0ub4dor&3x", &patterns), Ok(()));
    }

    #[test]
    fn test_strength_counts_characters_not_bytes() {
        let patterns = default_weak_patterns();

        // 7 characters, though the UTF-8 encoding is 10 bytes.
        assert_eq!(
            validate_password_strength("Aä1!ööö", &patterns),
            Err(PasswordPolicyError::TooShort)
        );

        // Exactly 128 characters, multi-byte ones included, is allowed.
        let long = format!("A1!{}", "ü".repeat(125));
        assert_eq!(validate_password_strength(&long, &patterns), Ok(()));
    }

    #[test]
    fn test_strength_accepts_non_ascii_case_classes() {
        let patterns = default_weak_patterns();
        assert_eq!(
            validate_password_strength("Приветик1!Мир", &patterns),
            Ok(())
        );
    }

    #[test]
    fn test_weak_pattern_match_is_case_insensitive() {
        let patterns = default_weak_patterns();
        assert_eq!(
            validate_password_strength("MyQwErTy99$x", &patterns),
            Err(PasswordPolicyError::WeakPattern)
        );
    }
}
