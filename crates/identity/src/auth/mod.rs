//! Authentication provider boundary.
//!
//! The provider owns sessions entirely; this crate only consumes its API
//! through [`AuthProvider`] and turns its notifications into a single callback
//! with [`SessionAdapter`].

mod adapter;
mod error;
mod memory;

pub use adapter::SessionAdapter;
pub use error::AuthError;
pub use memory::InMemoryAuthProvider;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::broadcast;

use asso_portal_core::{Email, Persistence};

use crate::model::Session;

/// Minimum password length accepted when creating an account.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// External authentication provider.
///
/// Every sign-in, sign-out and identity-changing refresh must be announced on
/// the channel returned by [`AuthProvider::subscribe`] as the new session (or
/// `None` when signed out).
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Subscribe to session changes.
    fn subscribe(&self) -> broadcast::Receiver<Option<Session>>;

    /// The session as of now.
    fn current_session(&self) -> Option<Session>;

    /// How long sessions survive.
    fn persistence(&self) -> Persistence;

    /// Change how long sessions survive. Applies to the next sign-in.
    async fn set_persistence(&self, mode: Persistence) -> Result<(), AuthError>;

    /// Create an account and sign it in.
    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Session, AuthError>;

    /// Sign in with email and password.
    async fn sign_in(&self, email: &Email, password: &SecretString) -> Result<Session, AuthError>;

    /// Sign the current session out.
    async fn sign_out(&self) -> Result<(), AuthError>;

    /// Change the email of the signed-in account.
    async fn update_email(&self, email: &Email) -> Result<Session, AuthError>;
}
