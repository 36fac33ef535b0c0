//! campus-auth: authentication and authorization engine.
//!
//! Provides credential-based login, refresh-token rotation with descendant
//! revocation, role/permission resolution, and OAuth account linking.
//! Transport (HTTP/gRPC routing), email delivery internals, and the backing
//! relational store are external collaborators reached through the seams in
//! [`services`] and [`store`].

pub mod config;
pub mod db;
pub mod models;
pub mod observability;
pub mod services;
pub mod store;
pub mod utils;

pub use services::{
    AuditService, AuthService, EmailProvider, JwtService, MockEmailService, OAuthService,
    RbacService, RefreshTokenService, ServiceError, SmtpEmailService,
};
pub use store::{AuthStore, MemoryStore, PgStore};
