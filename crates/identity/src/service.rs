//! Account operations built on the provider, the profile store and the cache.
//!
//! Edits to the connected user's profile are pushed into the cache with
//! [`IdentityCache::update`] instead of waiting for a refetch.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use secrecy::SecretString;
use tracing::{info, instrument};

use asso_portal_core::{Association, Email, Persistence, UserId};

use crate::auth::AuthProvider;
use crate::cache::IdentityCache;
use crate::config::IdentityConfig;
use crate::error::{ProfileError, ServiceError};
use crate::model::{ProfileDocument, ProfilePatch, Session, User};
use crate::profile::{ProfileFetcher, ProfileStore};

/// Grant publishing rights for `associations` to a user.
///
/// Stores the union of the rights the user already had and the new ones,
/// without duplicates, and returns it.
///
/// # Errors
///
/// Returns `ServiceError::NoRightsToGrant` if `associations` is empty,
/// `ServiceError::Profile` if the user has no profile, and
/// `ServiceError::Store` if the write fails.
pub async fn grant_publish_rights(
    store: &dyn ProfileStore,
    id: &UserId,
    associations: &[Association],
) -> Result<Vec<Association>, ServiceError> {
    if associations.is_empty() {
        return Err(ServiceError::NoRightsToGrant);
    }
    let doc = store
        .get(id)
        .await?
        .ok_or_else(|| ProfileError::NotFound(id.clone()))?;

    let rights: Vec<Association> = doc
        .can_publish_as
        .iter()
        .chain(associations)
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    store
        .update(id, &ProfilePatch::can_publish_as(rights.clone()))
        .await?;
    info!(user_id = %id, rights = ?rights, "Granted publishing rights");
    Ok(rights)
}

/// User account operations.
#[derive(Clone)]
pub struct UserService {
    provider: Arc<dyn AuthProvider>,
    fetcher: ProfileFetcher,
    cache: IdentityCache,
    connect_timeout: Duration,
    persistence: Persistence,
}

impl UserService {
    #[must_use]
    pub fn new(
        provider: Arc<dyn AuthProvider>,
        store: Arc<dyn ProfileStore>,
        cache: IdentityCache,
        config: &IdentityConfig,
    ) -> Self {
        Self {
            provider,
            fetcher: ProfileFetcher::new(store),
            cache,
            connect_timeout: config.connect_timeout,
            persistence: config.persistence,
        }
    }

    /// The cache this service feeds.
    #[must_use]
    pub const fn cache(&self) -> &IdentityCache {
        &self.cache
    }

    /// Create an account and its profile document.
    ///
    /// The provider signs the new account in right away, before the profile
    /// exists; the cache's `NotFound` retry covers that window.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidEmail` for a malformed address,
    /// `ServiceError::Auth` if the provider refuses the account, and
    /// `ServiceError::Store` if the profile cannot be written.
    #[instrument(skip(self, password, photo_url))]
    pub async fn register(
        &self,
        email: &str,
        password: &SecretString,
        first_name: &str,
        last_name: &str,
        photo_url: Option<String>,
    ) -> Result<Session, ServiceError> {
        let email = Email::parse(email)?;
        let session = self.provider.create_account(&email, password).await?;

        let doc =
            ProfileDocument::for_registration(email, first_name, last_name, photo_url, Utc::now());
        self.fetcher.store().set(&session.user_id, &doc).await?;

        info!(user_id = %session.user_id, "User registered");
        Ok(session)
    }

    /// Sign in and wait until the cache has resolved the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` if sign-in fails,
    /// `ServiceError::ProfileUnavailable` if the cache resolved the session to
    /// no user, and `ServiceError::ConnectTimeout` if it did not resolve it
    /// within the configured timeout.
    #[instrument(skip(self, password))]
    pub async fn connect(
        &self,
        email: &str,
        password: &SecretString,
    ) -> Result<Arc<User>, ServiceError> {
        let email = Email::parse(email)?;
        self.provider.set_persistence(self.persistence).await?;

        let mark = self.cache.sequence();
        let session = self.provider.sign_in(&email, password).await?;

        let resolved = tokio::time::timeout(
            self.connect_timeout,
            self.cache.resolution_for(mark, &session.user_id),
        )
        .await
        .map_err(|_| ServiceError::ConnectTimeout(self.connect_timeout))?;

        let user = resolved.ok_or(ServiceError::ProfileUnavailable(session.user_id))?;
        info!(user_id = %user.id, "User connected");
        Ok(user)
    }

    /// Clear the current user, then sign out.
    ///
    /// The cache is cleared first so the provider's own sign-out event
    /// resolves to the value already published and is not emitted again.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Auth` if the provider fails to sign out.
    #[instrument(skip(self))]
    pub async fn disconnect(&self) -> Result<(), ServiceError> {
        self.cache.update(None);
        self.provider.sign_out().await?;
        info!("User disconnected");
        Ok(())
    }

    /// Read any user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Profile` if the profile is missing or unreadable.
    pub async fn get_user(&self, id: &UserId) -> Result<User, ServiceError> {
        Ok(self.fetcher.fetch(id).await?)
    }

    /// Every registered user.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Store` if the listing fails.
    pub async fn list_users(&self) -> Result<Vec<User>, ServiceError> {
        let docs = self.fetcher.store().list().await?;
        Ok(docs
            .into_iter()
            .map(|(id, doc)| User::from_profile(id, &doc))
            .collect())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Store` if the write fails.
    #[instrument(skip(self))]
    pub async fn update_first_name(&self, id: &UserId, first_name: &str) -> Result<(), ServiceError> {
        self.fetcher
            .store()
            .update(id, &ProfilePatch::first_name(first_name))
            .await?;
        self.refresh_current(id, |user| first_name.clone_into(&mut user.first_name));
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ServiceError::Store` if the write fails.
    #[instrument(skip(self))]
    pub async fn update_last_name(&self, id: &UserId, last_name: &str) -> Result<(), ServiceError> {
        self.fetcher
            .store()
            .update(id, &ProfilePatch::last_name(last_name))
            .await?;
        self.refresh_current(id, |user| last_name.clone_into(&mut user.last_name));
        Ok(())
    }

    /// Replace the associations a user follows.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Store` if the write fails.
    #[instrument(skip(self))]
    pub async fn update_subscriptions(
        &self,
        id: &UserId,
        subscriptions: &[Association],
    ) -> Result<(), ServiceError> {
        let unique: BTreeSet<Association> = subscriptions.iter().copied().collect();
        self.fetcher
            .store()
            .update(id, &ProfilePatch::subscriptions(unique.iter().copied().collect()))
            .await?;
        self.refresh_current(id, |user| user.subscriptions = unique);
        Ok(())
    }

    /// Change the connected account's email on the provider and in its profile.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotConnected` if nobody is connected,
    /// `ServiceError::Auth` if the provider refuses the address, and
    /// `ServiceError::Store` if the profile write fails.
    #[instrument(skip(self))]
    pub async fn update_email_of_connected_user(&self, email: &str) -> Result<(), ServiceError> {
        let email = Email::parse(email)?;
        let current = self
            .cache
            .peek()
            .flatten()
            .ok_or(ServiceError::NotConnected)?;

        let session = self.provider.update_email(&email).await?;
        self.fetcher
            .store()
            .update(&current.id, &ProfilePatch::mail(email))
            .await?;

        let mut user = (*current).clone();
        user.supply_with_session(&session);
        self.cache.update(Some(user));
        Ok(())
    }

    /// Grant publishing rights and mirror them into the cache.
    ///
    /// # Errors
    ///
    /// See [`grant_publish_rights`].
    #[instrument(skip(self))]
    pub async fn grant_publish_rights(
        &self,
        id: &UserId,
        associations: &[Association],
    ) -> Result<Vec<Association>, ServiceError> {
        let rights = grant_publish_rights(self.fetcher.store().as_ref(), id, associations).await?;
        let granted: BTreeSet<Association> = rights.iter().copied().collect();
        self.refresh_current(id, |user| user.can_publish_as = granted);
        Ok(rights)
    }

    /// Apply `edit` to the cached user when `id` is the connected one.
    fn refresh_current<F>(&self, id: &UserId, edit: F)
    where
        F: FnOnce(&mut User),
    {
        if let Some(current) = self.cache.peek().flatten().filter(|u| &u.id == id) {
            let mut user = (*current).clone();
            edit(&mut user);
            self.cache.update(Some(user));
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::{AuthError, InMemoryAuthProvider, SessionAdapter};
    use crate::config::RetryPolicy;
    use crate::profile::InMemoryProfileStore;

    struct Fixture {
        service: UserService,
        store: Arc<InMemoryProfileStore>,
        provider: Arc<InMemoryAuthProvider>,
        _adapter: SessionAdapter,
    }

    fn fixture() -> Fixture {
        let provider = Arc::new(InMemoryAuthProvider::new());
        let store = Arc::new(InMemoryProfileStore::new());
        let cache = IdentityCache::new(ProfileFetcher::new(store.clone()), RetryPolicy::none());
        let adapter = cache.attach(provider.clone());
        let config = IdentityConfig {
            connect_timeout: Duration::from_secs(2),
            ..IdentityConfig::default()
        };
        let service = UserService::new(provider.clone(), store.clone(), cache, &config);
        Fixture {
            service,
            store,
            provider,
            _adapter: adapter,
        }
    }

    fn password() -> SecretString {
        SecretString::from("correct-horse")
    }

    async fn registered(f: &Fixture, email: &str, first: &str) -> UserId {
        let session = f
            .service
            .register(email, &password(), first, "Durand", None)
            .await
            .unwrap();
        f.service.disconnect().await.unwrap();
        session.user_id
    }

    #[tokio::test]
    async fn test_register_writes_initial_profile() {
        let f = fixture();
        let session = f
            .service
            .register("alice@asso.example", &password(), "Alice", "Martin", None)
            .await
            .unwrap();

        let doc = f.store.get(&session.user_id).await.unwrap().unwrap();
        assert_eq!(doc.roles, vec![asso_portal_core::Role::User]);
        assert_eq!(doc.state, 0);
        assert!(doc.registration_date.is_some());
        assert_eq!(doc.mail.unwrap().as_str(), "alice@asso.example");
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_email() {
        let f = fixture();
        let err = f
            .service
            .register("not-an-email", &password(), "A", "B", None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidEmail(_)));
    }

    #[tokio::test]
    async fn test_connect_waits_for_resolved_user() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;

        let user = f
            .service
            .connect("alice@asso.example", &password())
            .await
            .unwrap();

        assert_eq!(user.id, id);
        assert_eq!(user.first_name, "Alice");
        assert_eq!(f.service.cache().get_current().await, Some(user));
    }

    #[tokio::test]
    async fn test_connect_with_wrong_password_fails() {
        let f = fixture();
        registered(&f, "alice@asso.example", "Alice").await;

        let err = f
            .service
            .connect("alice@asso.example", &SecretString::from("wrong-one"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_connect_without_profile_is_unavailable() {
        let f = fixture();
        let email = Email::parse("orphan@asso.example").unwrap();
        f.provider.create_account(&email, &password()).await.unwrap();
        f.provider.sign_out().await.unwrap();

        let err = f
            .service
            .connect("orphan@asso.example", &password())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ProfileUnavailable(_)));
    }

    #[tokio::test]
    async fn test_disconnect_clears_cache() {
        let f = fixture();
        registered(&f, "alice@asso.example", "Alice").await;
        f.service
            .connect("alice@asso.example", &password())
            .await
            .unwrap();

        f.service.disconnect().await.unwrap();
        assert!(f.service.cache().get_current().await.is_none());
        assert!(f.provider.current_session().is_none());
    }

    #[tokio::test]
    async fn test_name_edit_of_connected_user_updates_cache_without_fetch() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;
        f.service
            .connect("alice@asso.example", &password())
            .await
            .unwrap();
        let mut stream = f.service.cache().subscribe();
        stream.try_recv();
        let reads = f.store.read_count();

        f.service.update_first_name(&id, "Alicia").await.unwrap();

        let emitted = stream.try_recv().unwrap().unwrap();
        assert_eq!(emitted.first_name, "Alicia");
        assert_eq!(f.store.read_count(), reads);
        assert_eq!(f.service.get_user(&id).await.unwrap().first_name, "Alicia");
    }

    #[tokio::test]
    async fn test_edit_of_other_user_leaves_cache_alone() {
        let f = fixture();
        let bob = registered(&f, "bob@asso.example", "Bob").await;
        registered(&f, "alice@asso.example", "Alice").await;
        f.service
            .connect("alice@asso.example", &password())
            .await
            .unwrap();
        let mut stream = f.service.cache().subscribe();
        stream.try_recv();

        f.service.update_last_name(&bob, "Leroy").await.unwrap();

        assert!(stream.try_recv().is_none());
        assert_eq!(f.service.get_user(&bob).await.unwrap().last_name, "Leroy");
    }

    #[tokio::test]
    async fn test_update_subscriptions_dedupes() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;

        f.service
            .update_subscriptions(&id, &[Association::Bds, Association::Bde, Association::Bds])
            .await
            .unwrap();

        let doc = f.store.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.subscriptions, vec![Association::Bde, Association::Bds]);
    }

    #[tokio::test]
    async fn test_update_email_requires_connected_user() {
        let f = fixture();
        f.service.cache().update(None);
        let err = f
            .service
            .update_email_of_connected_user("new@asso.example")
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotConnected));
    }

    #[tokio::test]
    async fn test_update_email_mirrors_into_cache_and_profile() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;
        f.service
            .connect("alice@asso.example", &password())
            .await
            .unwrap();

        f.service
            .update_email_of_connected_user("alice@new.example")
            .await
            .unwrap();

        let cached = f.service.cache().peek().unwrap().unwrap();
        assert_eq!(cached.mail.as_ref().unwrap().as_str(), "alice@new.example");
        assert!(!cached.email_verified);
        let doc = f.store.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.mail.unwrap().as_str(), "alice@new.example");
    }

    #[tokio::test]
    async fn test_grant_rejects_empty_set() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;
        let err = f.service.grant_publish_rights(&id, &[]).await.unwrap_err();
        assert!(matches!(err, ServiceError::NoRightsToGrant));
    }

    #[tokio::test]
    async fn test_grant_stores_union_without_duplicates() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;
        f.service
            .grant_publish_rights(&id, &[Association::Bde])
            .await
            .unwrap();

        let rights = f
            .service
            .grant_publish_rights(&id, &[Association::Pnc, Association::Bde])
            .await
            .unwrap();

        assert_eq!(rights, vec![Association::Bde, Association::Pnc]);
        let doc = f.store.get(&id).await.unwrap().unwrap();
        assert_eq!(doc.can_publish_as, rights);
    }

    #[tokio::test]
    async fn test_grant_to_connected_user_updates_cache() {
        let f = fixture();
        let id = registered(&f, "alice@asso.example", "Alice").await;
        f.service
            .connect("alice@asso.example", &password())
            .await
            .unwrap();

        f.service
            .grant_publish_rights(&id, &[Association::Bda])
            .await
            .unwrap();

        let cached = f.service.cache().peek().unwrap().unwrap();
        assert!(cached.can_publish_for(Association::Bda));
    }

    #[tokio::test]
    async fn test_grant_for_unknown_user_is_not_found() {
        let f = fixture();
        let err = f
            .service
            .grant_publish_rights(&UserId::new("ghost"), &[Association::Bdh])
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Profile(ProfileError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_users() {
        let f = fixture();
        registered(&f, "alice@asso.example", "Alice").await;
        registered(&f, "bob@asso.example", "Bob").await;

        let mut names: Vec<_> = f
            .service
            .list_users()
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.first_name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["Alice".to_owned(), "Bob".to_owned()]);
    }
}
