//! Service layer: the auth engine and its collaborators.

mod audit;
mod auth;
mod cleanup;
mod email;
mod error;
mod jwt;
mod oauth;
mod rbac;
mod tokens;

pub use audit::AuditService;
pub use auth::AuthService;
pub use cleanup::{AuditCleanupService, TokenCleanupService};
pub use email::{EmailProvider, MockEmailService, SentEmail, SmtpEmailService};
pub use error::{ErrorKind, ServiceError};
pub use jwt::{AccessTokenClaims, JwtService};
pub use oauth::{ExternalProfile, OAuthService, Provider, ProviderTokens};
pub use rbac::RbacService;
pub use tokens::RefreshTokenService;
