//! Data models for the auth engine.

mod audit_log;
mod oauth_account;
mod refresh_token;
mod role;
mod user;

pub use audit_log::AuditLog;
pub use oauth_account::OAuthAccount;
pub use refresh_token::RefreshToken;
pub use role::{Permission, Role, RolePermission, UserRole};
pub use user::{
    AccountType, AuthResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    RegisterRequest, ResetPasswordRequest, User, UserDto,
};
