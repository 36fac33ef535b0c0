//! Refresh token rotation, replay protection and pruning.

mod common;

use campus_auth::models::LoginRequest;
use campus_auth::services::ServiceError;

async fn login(ctx: &common::TestContext, email: &str) -> campus_auth::models::AuthResponse {
    ctx.auth
        .login(
            LoginRequest {
                email: email.to_string(),
                password: "Tr0ub4dor&3x".to_string(),
            },
            None,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn rotation_makes_old_token_single_use() {
    let ctx = common::context().await;
    common::register_verified(&ctx, "ada@example.com").await;
    let session = login(&ctx, "ada@example.com").await;

    let refreshed = ctx
        .auth
        .refresh_token(&session.refresh_token, Some("5.6.7.8"))
        .await
        .unwrap();
    assert_ne!(refreshed.refresh_token, session.refresh_token);

    // The old token is linked to its successor and permanently unusable.
    let old = ctx
        .auth
        .tokens()
        .lookup(&session.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert!(old.is_revoked());
    assert_eq!(
        old.replaced_by_token.as_deref(),
        Some(refreshed.refresh_token.as_str())
    );

    let replay = ctx.auth.refresh_token(&session.refresh_token, None).await;
    assert!(matches!(replay, Err(ServiceError::InvalidToken)));

    // The successor still works.
    ctx.auth
        .refresh_token(&refreshed.refresh_token, None)
        .await
        .unwrap();
}

#[tokio::test]
async fn revoke_token_kills_entire_descendant_chain() {
    let ctx = common::context().await;
    common::register_verified(&ctx, "ada@example.com").await;
    let session = login(&ctx, "ada@example.com").await;

    // Build chain A -> B -> C by rotating twice.
    let b = ctx
        .auth
        .refresh_token(&session.refresh_token, None)
        .await
        .unwrap();
    let c = ctx.auth.refresh_token(&b.refresh_token, None).await.unwrap();

    // Revoking A (already revoked by rotation) still revokes the chain.
    let newly_revoked = ctx
        .auth
        .revoke_token(&session.refresh_token, None)
        .await
        .unwrap();
    assert!(!newly_revoked);

    let c_row = ctx
        .auth
        .tokens()
        .lookup(&c.refresh_token)
        .await
        .unwrap()
        .unwrap();
    assert!(c_row.is_revoked());

    let replay = ctx.auth.refresh_token(&c.refresh_token, None).await;
    assert!(matches!(replay, Err(ServiceError::InvalidToken)));
}

#[tokio::test]
async fn revoke_unknown_token_is_a_false_not_an_error() {
    let ctx = common::context().await;
    let result = ctx.auth.revoke_token("never-issued", None).await.unwrap();
    assert!(!result);
}

#[tokio::test]
async fn revoke_active_token_returns_true_once() {
    let ctx = common::context().await;
    common::register_verified(&ctx, "ada@example.com").await;
    let session = login(&ctx, "ada@example.com").await;

    assert!(ctx
        .auth
        .revoke_token(&session.refresh_token, None)
        .await
        .unwrap());
    assert!(!ctx
        .auth
        .revoke_token(&session.refresh_token, None)
        .await
        .unwrap());
}

#[tokio::test]
async fn login_prunes_stored_tokens_to_the_cap() {
    let ctx = common::context().await;
    common::register_verified(&ctx, "ada@example.com").await;

    // Registration issued one token; each login issues another and then
    // prunes to keep_per_account = 5.
    for _ in 0..8 {
        login(&ctx, "ada@example.com").await;
    }

    assert_eq!(ctx.store.refresh_token_count(), 5);
}

#[tokio::test]
async fn refresh_uses_fresh_role_resolution() {
    let ctx = common::context().await;
    common::register_verified(&ctx, "ada@example.com").await;
    let session = login(&ctx, "ada@example.com").await;
    assert_eq!(session.user.roles, vec!["Student"]);

    ctx.auth
        .rbac()
        .assign_role(session.user.id, "Instructor", None)
        .await
        .unwrap();

    let refreshed = ctx
        .auth
        .refresh_token(&session.refresh_token, None)
        .await
        .unwrap();
    assert_eq!(refreshed.user.roles, vec!["Instructor", "Student"]);
    assert_eq!(
        refreshed.user.permissions,
        vec!["course.create", "course.view"]
    );

    let claims = ctx
        .auth
        .jwt()
        .decode_claims(&refreshed.access_token)
        .unwrap();
    assert_eq!(claims.roles, vec!["Instructor", "Student"]);
}
