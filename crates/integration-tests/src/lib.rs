//! Scenario tests for the association portal identity subsystem.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p asso-portal-integration-tests
//! ```
//!
//! Every scenario runs against the in-memory provider and profile store, so no
//! database is needed. Races are driven by injecting read latency into the
//! store and running on a paused Tokio clock.

use std::sync::Arc;
use std::time::Duration;

use asso_portal_core::{Role, UserId};
use asso_portal_identity::auth::{InMemoryAuthProvider, SessionAdapter};
use asso_portal_identity::profile::{InMemoryProfileStore, ProfileFetcher};
use asso_portal_identity::{
    IdentityCache, IdentityConfig, ProfileDocument, RetryPolicy, UserService,
};
use secrecy::SecretString;

/// Password used by every test account.
#[must_use]
pub fn password() -> SecretString {
    SecretString::from("integration-pass")
}

/// A stored profile with the given names.
#[must_use]
pub fn profile(first_name: &str, last_name: &str) -> ProfileDocument {
    ProfileDocument {
        first_name: first_name.to_owned(),
        last_name: last_name.to_owned(),
        roles: vec![Role::User],
        ..ProfileDocument::default()
    }
}

/// Fully wired identity subsystem over in-memory collaborators.
pub struct TestContext {
    pub provider: Arc<InMemoryAuthProvider>,
    pub store: Arc<InMemoryProfileStore>,
    pub cache: IdentityCache,
    pub service: UserService,
    adapter: Option<SessionAdapter>,
}

impl TestContext {
    /// Context with no `NotFound` retry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_retry(RetryPolicy::none())
    }

    /// Context whose cache retries `NotFound` with `retry`.
    #[must_use]
    pub fn with_retry(retry: RetryPolicy) -> Self {
        let provider = Arc::new(InMemoryAuthProvider::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let cache = IdentityCache::new(ProfileFetcher::new(store.clone()), retry);
        let config = IdentityConfig {
            retry,
            connect_timeout: Duration::from_secs(5),
            ..IdentityConfig::default()
        };
        let service = UserService::new(provider.clone(), store.clone(), cache.clone(), &config);
        Self {
            provider,
            store,
            cache,
            service,
            adapter: None,
        }
    }

    /// Start feeding provider events into the cache.
    pub fn attach(&mut self) {
        self.adapter = Some(self.cache.attach(self.provider.clone()));
    }

    /// Store a profile for `id`.
    pub async fn seed(&self, id: &str, doc: ProfileDocument) -> UserId {
        let id = UserId::new(id);
        self.store.insert(id.clone(), doc).await;
        id
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
