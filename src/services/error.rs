//! Service-level error taxonomy.

use crate::store::StoreError;
use crate::utils::PasswordPolicyError;

/// Errors returned by the auth services.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    AccountDeactivated,

    #[error("Email address is not verified")]
    EmailNotVerified,

    #[error("Current password is incorrect")]
    WrongCurrentPassword,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Invalid or expired password reset token")]
    ResetTokenInvalid,

    #[error("Invalid or expired verification token")]
    VerificationTokenInvalid,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Role already exists")]
    RoleAlreadyExists,

    #[error("Permission already exists")]
    PermissionAlreadyExists,

    #[error("Provider already linked to this account")]
    ProviderAlreadyLinked,

    #[error("{0}")]
    WeakPassword(PasswordPolicyError),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot deactivate your own account")]
    SelfDeactivation,

    #[error("Cannot remove your own admin role")]
    SelfAdminRemoval,

    #[error("User not found")]
    UserNotFound,

    #[error("Role not found")]
    RoleNotFound,

    #[error("Permission not found")]
    PermissionNotFound,

    #[error("Unsupported OAuth provider: {0}")]
    UnsupportedProvider(String),

    /// The replaced_by chain looped back on itself. Data corruption.
    #[error("Refresh token chain contains a cycle")]
    TokenChainCycle,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Coarse classification used by callers to pick a response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Unauthorized,
    Conflict,
    NotFound,
    Internal,
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::InvalidCredentials
            | ServiceError::AccountDeactivated
            | ServiceError::EmailNotVerified
            | ServiceError::WrongCurrentPassword
            | ServiceError::InvalidToken => ErrorKind::Unauthorized,

            ServiceError::WeakPassword(_)
            | ServiceError::Validation(_)
            | ServiceError::SelfDeactivation
            | ServiceError::SelfAdminRemoval
            | ServiceError::ResetTokenInvalid
            | ServiceError::VerificationTokenInvalid
            | ServiceError::UnsupportedProvider(_) => ErrorKind::InvalidInput,

            ServiceError::EmailAlreadyRegistered
            | ServiceError::RoleAlreadyExists
            | ServiceError::PermissionAlreadyExists
            | ServiceError::ProviderAlreadyLinked => ErrorKind::Conflict,

            ServiceError::UserNotFound
            | ServiceError::RoleNotFound
            | ServiceError::PermissionNotFound => ErrorKind::NotFound,

            ServiceError::TokenChainCycle | ServiceError::Internal(_) => ErrorKind::Internal,

            ServiceError::Store(StoreError::Conflict(_)) => ErrorKind::Conflict,
            ServiceError::Store(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand to an end user. Internal errors are collapsed so
    /// that database details never leak.
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "An internal error occurred".to_string(),
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_failures_are_unauthorized() {
        assert_eq!(ServiceError::InvalidCredentials.kind(), ErrorKind::Unauthorized);
        assert_eq!(ServiceError::AccountDeactivated.kind(), ErrorKind::Unauthorized);
        assert_eq!(ServiceError::EmailNotVerified.kind(), ErrorKind::Unauthorized);
    }

    #[test]
    fn test_internal_message_does_not_leak() {
        let err = ServiceError::Internal(anyhow::anyhow!("connection refused to 10.0.0.5"));
        assert_eq!(err.public_message(), "An internal error occurred");
    }

    #[test]
    fn test_store_conflict_maps_to_conflict() {
        let err = ServiceError::Store(StoreError::Conflict("dup".to_string()));
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }
}
