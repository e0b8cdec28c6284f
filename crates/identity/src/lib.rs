//! Association portal identity library.
//!
//! Tracks "who is the current user" for the whole client by reconciling two
//! asynchronous sources of truth: the authentication provider's session
//! events and the profile document stored for that session's identifier.
//!
//! # Components
//!
//! - [`auth`] - Provider trait, the session adapter, and an in-memory provider
//! - [`profile`] - Store trait, the profile fetcher, and store adapters
//! - [`cache`] - [`IdentityCache`], the single holder of the current user
//! - [`service`] - Account operations that feed edits back into the cache
//! - [`consumers`] - Header state and route guard built on the live stream
//!
//! # Wiring
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use asso_portal_identity::auth::InMemoryAuthProvider;
//! use asso_portal_identity::profile::{InMemoryProfileStore, ProfileFetcher};
//! use asso_portal_identity::{IdentityCache, RetryPolicy};
//!
//! # async fn wire() {
//! let provider = Arc::new(InMemoryAuthProvider::new());
//! let store = Arc::new(InMemoryProfileStore::new());
//!
//! let cache = IdentityCache::new(ProfileFetcher::new(store), RetryPolicy::default());
//! let _adapter = cache.attach(provider);
//!
//! let current = cache.get_current().await;
//! assert!(current.is_none());
//! # }
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cache;
pub mod config;
pub mod consumers;
pub mod error;
pub mod model;
pub mod profile;
pub mod service;

pub use cache::{IdentityCache, UserStream};
pub use config::{IdentityConfig, RetryPolicy};
pub use error::{ProfileError, ResolutionError, ServiceError, StoreError};
pub use model::{CurrentUser, ProfileDocument, ProfilePatch, Session, User};
pub use service::UserService;
