//! Scenario tests for account flows through the service, cache and consumers.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use asso_portal_core::{Association, Email, Persistence, Role};
use asso_portal_identity::auth::AuthProvider;
use asso_portal_identity::consumers::{Access, HeaderState, Navigation, Route, RouteGuard};
use asso_portal_identity::{RetryPolicy, ServiceError};
use asso_portal_integration_tests::{TestContext, password, profile};

// =============================================================================
// Registration
// =============================================================================

#[tokio::test]
async fn test_registered_user_becomes_current() {
    let mut ctx = TestContext::with_retry(RetryPolicy {
        attempts: 5,
        delay: Duration::from_millis(10),
    });
    ctx.attach();

    let session = ctx
        .service
        .register("alice@asso.example", &password(), "Alice", "Martin", None)
        .await
        .unwrap();

    let mut stream = ctx.cache.subscribe();
    let user = loop {
        if let Some(user) = stream.recv().await.unwrap() {
            break user;
        }
    };
    assert_eq!(user.id, session.user_id);
    assert!(user.has_role(Role::User));
    assert_eq!(user.mail.as_ref().unwrap().as_str(), "alice@asso.example");
}

#[tokio::test(start_paused = true)]
async fn test_profile_written_after_sign_in_is_picked_up_by_retry() {
    let mut ctx = TestContext::with_retry(RetryPolicy {
        attempts: 3,
        delay: Duration::from_millis(100),
    });
    ctx.attach();
    ctx.cache.get_current().await;

    let session = ctx
        .provider
        .create_account(&Email::parse("late@asso.example").unwrap(), &password())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    ctx.seed(session.user_id.as_str(), profile("Late", "Comer"))
        .await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    let user = ctx.cache.get_current().await.unwrap();
    assert_eq!(user.first_name, "Late");
}

#[tokio::test(start_paused = true)]
async fn test_profile_never_written_resolves_to_none() {
    let mut ctx = TestContext::with_retry(RetryPolicy {
        attempts: 2,
        delay: Duration::from_millis(50),
    });
    ctx.attach();

    ctx.provider
        .create_account(&Email::parse("orphan@asso.example").unwrap(), &password())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(ctx.cache.get_current().await.is_none());
}

// =============================================================================
// Connect / disconnect
// =============================================================================

async fn registered(ctx: &TestContext, email: &str, first: &str) {
    ctx.service
        .register(email, &password(), first, "Test", None)
        .await
        .unwrap();
    ctx.service.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_connect_then_disconnect_drives_header() {
    let mut ctx = TestContext::new();
    ctx.attach();
    registered(&ctx, "alice@asso.example", "Alice").await;

    let user = ctx
        .service
        .connect("alice@asso.example", &password())
        .await
        .unwrap();
    let mut header = HeaderState::load(&ctx.cache).await;
    assert!(header.is_logged());
    assert_eq!(header.user().map(|u| u.id.clone()), Some(user.id.clone()));

    let mut stream = ctx.cache.subscribe();
    header.apply(stream.recv().await.unwrap());

    ctx.service.disconnect().await.unwrap();
    let navigation = header.apply(stream.recv().await.unwrap());

    assert_eq!(navigation, Some(Navigation::Home));
    assert!(!header.is_logged());

    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert!(stream.try_recv().is_none());
}

#[tokio::test]
async fn test_connect_unknown_account_fails() {
    let mut ctx = TestContext::new();
    ctx.attach();

    let err = ctx
        .service
        .connect("nobody@asso.example", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Auth(_)));
    assert!(ctx.cache.get_current().await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_connect_times_out_when_profile_is_slow() {
    let mut ctx = TestContext::new();
    ctx.attach();
    registered(&ctx, "slow@asso.example", "Slow").await;
    let id = ctx
        .service
        .list_users()
        .await
        .unwrap()
        .into_iter()
        .next()
        .unwrap()
        .id;
    ctx.store.set_latency(&id, Duration::from_secs(60));

    let err = ctx
        .service
        .connect("slow@asso.example", &password())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::ConnectTimeout(_)));
}

#[tokio::test]
async fn test_session_persistence_applies_on_restart() {
    let mut ctx = TestContext::new();
    ctx.attach();
    registered(&ctx, "alice@asso.example", "Alice").await;
    ctx.service
        .connect("alice@asso.example", &password())
        .await
        .unwrap();
    assert_eq!(ctx.provider.persistence(), Persistence::Local);
    assert!(ctx.provider.restarted().current_session().is_some());

    ctx.provider.set_persistence(Persistence::Session).await.unwrap();
    assert!(ctx.provider.restarted().current_session().is_none());
}

// =============================================================================
// Rights and guarded routes
// =============================================================================

#[tokio::test]
async fn test_granted_rights_open_publish_route() {
    let mut ctx = TestContext::new();
    ctx.attach();
    registered(&ctx, "alice@asso.example", "Alice").await;
    let user = ctx
        .service
        .connect("alice@asso.example", &password())
        .await
        .unwrap();
    let guard = RouteGuard::new(ctx.cache.clone());

    assert_eq!(
        guard.check(Route::Publish).await,
        Access::Redirect(Navigation::Home)
    );

    let rights = ctx
        .service
        .grant_publish_rights(&user.id, &[Association::Bdc, Association::Bdc])
        .await
        .unwrap();
    assert_eq!(rights, vec![Association::Bdc]);
    assert_eq!(guard.check(Route::Publish).await, Access::Allowed);

    ctx.service.disconnect().await.unwrap();
    assert_eq!(
        guard.check(Route::Publish).await,
        Access::Redirect(Navigation::Login)
    );
}

#[tokio::test]
async fn test_profile_edits_reach_subscribers_without_refetch() {
    let mut ctx = TestContext::new();
    ctx.attach();
    registered(&ctx, "alice@asso.example", "Alice").await;
    let user = ctx
        .service
        .connect("alice@asso.example", &password())
        .await
        .unwrap();
    let mut stream = ctx.cache.subscribe();
    stream.try_recv();
    let reads = ctx.store.read_count();

    ctx.service.update_last_name(&user.id, "Dupont").await.unwrap();
    ctx.service
        .update_subscriptions(&user.id, &[Association::Bds, Association::Pnc])
        .await
        .unwrap();

    let renamed = stream.try_recv().unwrap().unwrap();
    assert_eq!(renamed.last_name, "Dupont");
    let subscribed = stream.try_recv().unwrap().unwrap();
    assert_eq!(subscribed.subscriptions.len(), 2);
    assert_eq!(subscribed.label(), "Alice Dupont");
    assert_eq!(ctx.store.read_count(), reads);
}
