//! Error types for the identity subsystem.
//!
//! The cache itself never returns these to consumers: resolution failures are
//! logged and published as "no current user". They surface from the fetcher,
//! the stores and the account operations in [`crate::service`].

use std::time::Duration;

use thiserror::Error;

use asso_portal_core::{EmailError, UserId};

use crate::auth::AuthError;

/// Errors raised by [`crate::profile::ProfileStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from sqlx.
    #[cfg(feature = "postgres")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Stored data could not be mapped into a profile.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// The document targeted by a partial update does not exist.
    #[error("not found")]
    NotFound,

    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by [`crate::profile::ProfileFetcher`].
#[derive(Debug, Error)]
pub enum ProfileError {
    /// No profile document exists for the identifier.
    ///
    /// Expected for a short window right after registration.
    #[error("no profile document for user {0}")]
    NotFound(UserId),

    /// The read failed for any other reason. Not retried.
    #[error("profile fetch failed: {0}")]
    FetchFailed(#[source] StoreError),
}

impl ProfileError {
    /// Whether this is the recoverable not-found condition.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Sequencing faults detected while applying a resolution.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolutionError {
    /// A resolution carried a token that was never issued or was already applied.
    #[error("resolution token {token} out of order (latest issued {latest})")]
    InvariantViolation {
        /// Token carried by the resolution.
        token: u64,
        /// Latest token issued by the cache.
        latest: u64,
    },
}

/// Errors returned by [`crate::service::UserService`].
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Authentication provider rejected the operation.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// Profile could not be read.
    #[error("profile error: {0}")]
    Profile(#[from] ProfileError),

    /// Profile store write failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Invalid email address.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] EmailError),

    /// Granting publishing rights requires at least one association.
    #[error("no publishing rights to grant")]
    NoRightsToGrant,

    /// The operation needs a signed-in user.
    #[error("no user is connected")]
    NotConnected,

    /// Sign-in succeeded but the cache never resolved the user in time.
    #[error("timed out after {0:?} waiting for the connected user")]
    ConnectTimeout(Duration),

    /// Sign-in succeeded but the profile could not be resolved.
    #[error("profile unavailable for user {0}")]
    ProfileUnavailable(UserId),
}
