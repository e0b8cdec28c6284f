//! Local demo of the identity flow.
//!
//! Runs registration, sign-in, profile edits, a sign-in race and sign-out
//! against in-memory collaborators, logging every value the header sees.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=asso_portal_identity=debug,portal_cli=info portal-cli demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use asso_portal_core::{Association, Email, EmailError};
use asso_portal_identity::auth::{AuthProvider, InMemoryAuthProvider};
use asso_portal_identity::config::ConfigError;
use asso_portal_identity::consumers::{HeaderState, Route, RouteGuard};
use asso_portal_identity::profile::{InMemoryProfileStore, ProfileFetcher};
use asso_portal_identity::{IdentityCache, IdentityConfig, ServiceError, UserService};
use secrecy::SecretString;
use thiserror::Error;

/// Errors that can occur during the demo.
#[derive(Debug, Error)]
pub enum DemoError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error(transparent)]
    Auth(#[from] asso_portal_identity::auth::AuthError),

    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),
}

/// Latency injected on the first sign-in of the race.
const SLOW_FETCH: Duration = Duration::from_millis(300);

/// Run the demo.
///
/// # Errors
///
/// Returns `DemoError` if any step of the flow fails.
pub async fn run() -> Result<(), DemoError> {
    let config = IdentityConfig::from_env()?;
    let provider = Arc::new(InMemoryAuthProvider::new());
    let store = Arc::new(InMemoryProfileStore::new());
    let cache = IdentityCache::new(ProfileFetcher::new(store.clone()), config.retry);
    let adapter = cache.attach(provider.clone());
    let service = UserService::new(provider.clone(), store.clone(), cache.clone(), &config);

    let header = tokio::spawn(HeaderState::default().drive(cache.subscribe(), |header, nav| {
        tracing::info!(
            logged = header.is_logged(),
            label = header.label().as_deref().unwrap_or("-"),
            navigation = ?nav,
            "Header updated"
        );
    }));

    let password = SecretString::from("demo-password");
    let alice = service
        .register("alice@asso.example", &password, "Alice", "Martin", None)
        .await?
        .user_id;
    service.disconnect().await?;
    let bob = service
        .register("bob@asso.example", &password, "Bob", "Leroy", None)
        .await?
        .user_id;
    service.disconnect().await?;

    service.connect("alice@asso.example", &password).await?;
    service.update_first_name(&alice, "Alicia").await?;
    service
        .update_subscriptions(&alice, &[Association::Bde, Association::Pnc])
        .await?;
    service
        .grant_publish_rights(&alice, &[Association::Bde])
        .await?;

    let guard = RouteGuard::new(cache.clone());
    for route in [Route::Publish, Route::GiveRights] {
        let access = guard.check(route).await;
        tracing::info!(%route, ?access, "Alice opens a guarded route");
    }

    // Alice's profile read is slowed down so that Bob's sign-in, which arrives
    // later, resolves first. The late result for Alice must be discarded.
    store.set_latency(&alice, SLOW_FETCH);
    provider
        .sign_in(&Email::parse("alice@asso.example")?, &password)
        .await?;
    provider
        .sign_in(&Email::parse("bob@asso.example")?, &password)
        .await?;
    tokio::time::sleep(SLOW_FETCH * 2).await;
    store.clear_faults(&alice);

    let winner = cache.get_current().await;
    tracing::info!(
        user_id = winner.as_ref().map_or("-", |u| u.id.as_str()),
        expected = %bob,
        "Race settled"
    );

    service.disconnect().await?;

    drop(adapter);
    drop(guard);
    drop(service);
    drop(cache);
    if let Ok(Ok(final_state)) = tokio::time::timeout(Duration::from_secs(1), header).await {
        tracing::info!(logged = final_state.is_logged(), "Demo finished");
    }
    Ok(())
}
