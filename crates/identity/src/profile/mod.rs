//! Profile store boundary and the profile fetcher.
//!
//! [`ProfileStore`] is the document store as this crate consumes it.
//! [`ProfileFetcher`] maps a stored document to a [`User`]; it keeps no
//! state between calls.

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

pub use memory::InMemoryProfileStore;
#[cfg(feature = "postgres")]
pub use postgres::{PgProfileStore, create_pool};

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};

use asso_portal_core::UserId;

use crate::config::RetryPolicy;
use crate::error::{ProfileError, StoreError};
use crate::model::{ProfileDocument, ProfilePatch, User};

/// Remote document store holding one profile per user identifier.
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Point read. `Ok(None)` when no document exists.
    async fn get(&self, id: &UserId) -> Result<Option<ProfileDocument>, StoreError>;

    /// Create or replace a document.
    async fn set(&self, id: &UserId, doc: &ProfileDocument) -> Result<(), StoreError>;

    /// Partial write. Fails with `StoreError::NotFound` if the document is missing.
    async fn update(&self, id: &UserId, patch: &ProfilePatch) -> Result<(), StoreError>;

    /// Every stored profile.
    async fn list(&self) -> Result<Vec<(UserId, ProfileDocument)>, StoreError>;
}

/// Reads profiles and maps them into domain users.
#[derive(Clone)]
pub struct ProfileFetcher {
    store: Arc<dyn ProfileStore>,
}

impl ProfileFetcher {
    /// Create a fetcher over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// The underlying store, for writes.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Fetch the profile for `id`.
    ///
    /// # Errors
    ///
    /// Returns `ProfileError::NotFound` if no document exists, and
    /// `ProfileError::FetchFailed` for any store failure.
    #[instrument(skip(self), fields(user_id = %id))]
    pub async fn fetch(&self, id: &UserId) -> Result<User, ProfileError> {
        match self.store.get(id).await {
            Ok(Some(doc)) => Ok(User::from_profile(id.clone(), &doc)),
            Ok(None) => Err(ProfileError::NotFound(id.clone())),
            Err(e) => Err(ProfileError::FetchFailed(e)),
        }
    }

    /// Fetch, retrying a bounded number of times while the document is not
    /// found yet. Other failures are returned immediately.
    ///
    /// # Errors
    ///
    /// Returns the last `ProfileError` once retries are exhausted.
    pub async fn fetch_with_retry(
        &self,
        id: &UserId,
        policy: RetryPolicy,
    ) -> Result<User, ProfileError> {
        let mut remaining = policy.attempts;
        loop {
            match self.fetch(id).await {
                Err(ProfileError::NotFound(_)) if remaining > 0 => {
                    remaining -= 1;
                    debug!(user_id = %id, remaining, "Profile not found yet, retrying");
                    tokio::time::sleep(policy.delay).await;
                }
                other => return other,
            }
        }
    }

    /// Stamp the profile's last connection time.
    ///
    /// # Errors
    ///
    /// Returns the store error if the write fails.
    pub async fn record_connection(
        &self,
        id: &UserId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.store
            .update(id, &ProfilePatch::last_connection(at))
            .await
    }
}
