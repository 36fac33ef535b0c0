//! OAuth account mapping, linking and unlinking. The HTTP exchange is
//! exercised elsewhere; these tests drive the mapping stage directly.

mod common;

use campus_auth::services::{ExternalProfile, Provider, ProviderTokens, ServiceError};

fn profile(id: &str, email: &str) -> ExternalProfile {
    ExternalProfile {
        provider_user_id: id.to_string(),
        email: Some(email.to_string()),
        name: Some("Ada Lovelace".to_string()),
    }
}

fn tokens() -> ProviderTokens {
    ProviderTokens {
        access_token: "provider-access".to_string(),
        refresh_token: Some("provider-refresh".to_string()),
        expires_in: Some(3600),
    }
}

#[tokio::test]
async fn first_oauth_login_creates_a_verified_account() {
    let ctx = common::context().await;

    let response = ctx
        .oauth
        .complete_login(
            Provider::Google,
            profile("g-1", "ada@example.com"),
            tokens(),
            Some("1.2.3.4"),
        )
        .await
        .unwrap();

    assert_eq!(response.user.email, "ada@example.com");
    assert!(response.user.email_verified);
    assert_eq!(response.user.first_name, "Ada");
    assert_eq!(response.user.roles, vec!["Student"]);
    assert!(!response.refresh_token.is_empty());

    let linked = ctx.oauth.linked_providers(response.user.id).await.unwrap();
    assert_eq!(linked, vec!["google"]);
}

#[tokio::test]
async fn github_accounts_default_to_instructor() {
    let ctx = common::context().await;

    let response = ctx
        .oauth
        .complete_login(
            Provider::GitHub,
            profile("gh-1", "prof@example.com"),
            tokens(),
            None,
        )
        .await
        .unwrap();

    assert_eq!(response.user.roles, vec!["Instructor"]);
}

#[tokio::test]
async fn oauth_login_reuses_existing_account_by_email() {
    let ctx = common::context().await;
    common::register_verified(&ctx, "ada@example.com").await;

    let response = ctx
        .oauth
        .complete_login(
            Provider::Google,
            profile("g-1", "ada@example.com"),
            tokens(),
            None,
        )
        .await
        .unwrap();

    // Same account as the local registration, now with a provider link.
    assert_eq!(response.user.email, "ada@example.com");
    assert_eq!(response.user.roles, vec!["Student"]);
    let linked = ctx.oauth.linked_providers(response.user.id).await.unwrap();
    assert_eq!(linked, vec!["google"]);
}

#[tokio::test]
async fn repeat_oauth_login_updates_the_link() {
    let ctx = common::context().await;

    let first = ctx
        .oauth
        .complete_login(Provider::Google, profile("g-1", "ada@example.com"), tokens(), None)
        .await
        .unwrap();

    let mut newer = tokens();
    newer.access_token = "rotated-provider-access".to_string();
    let second = ctx
        .oauth
        .complete_login(Provider::Google, profile("g-1", "ada@example.com"), newer, None)
        .await
        .unwrap();

    // One account, one link.
    assert_eq!(first.user.id, second.user.id);
    let linked = ctx.oauth.linked_providers(first.user.id).await.unwrap();
    assert_eq!(linked, vec!["google"]);
}

#[tokio::test]
async fn linking_twice_conflicts() {
    let ctx = common::context().await;
    let session = ctx
        .auth
        .register(common::register_request("ada@example.com"), None)
        .await
        .unwrap();

    ctx.oauth
        .link_provider(
            session.user.id,
            Provider::GitHub,
            profile("gh-1", "ada@example.com"),
            tokens(),
        )
        .await
        .unwrap();

    let again = ctx
        .oauth
        .link_provider(
            session.user.id,
            Provider::GitHub,
            profile("gh-1", "ada@example.com"),
            tokens(),
        )
        .await;
    assert!(matches!(again, Err(ServiceError::ProviderAlreadyLinked)));
}

#[tokio::test]
async fn unlinking_missing_provider_is_a_false_not_an_error() {
    let ctx = common::context().await;
    let session = ctx
        .auth
        .register(common::register_request("ada@example.com"), None)
        .await
        .unwrap();

    let removed = ctx
        .oauth
        .unlink_provider(session.user.id, Provider::Google)
        .await
        .unwrap();
    assert!(!removed);

    ctx.oauth
        .link_provider(
            session.user.id,
            Provider::Google,
            profile("g-1", "ada@example.com"),
            tokens(),
        )
        .await
        .unwrap();
    assert!(ctx
        .oauth
        .unlink_provider(session.user.id, Provider::Google)
        .await
        .unwrap());
}

#[tokio::test]
async fn deactivated_account_cannot_oauth_login() {
    let ctx = common::context().await;
    let first = ctx
        .oauth
        .complete_login(Provider::Google, profile("g-1", "ada@example.com"), tokens(), None)
        .await
        .unwrap();

    let admin_id = uuid::Uuid::new_v4();
    ctx.auth
        .deactivate_account(first.user.id, admin_id, None)
        .await
        .unwrap();

    let result = ctx
        .oauth
        .complete_login(Provider::Google, profile("g-1", "ada@example.com"), tokens(), None)
        .await;
    assert!(matches!(result, Err(ServiceError::AccountDeactivated)));
}
