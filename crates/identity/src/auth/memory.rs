//! In-process authentication provider.
//!
//! Holds email/password accounts with Argon2id hashes and announces session
//! changes on a broadcast channel. Used by the CLI demo and tests in place of
//! the hosted provider.

use std::sync::{Mutex, MutexGuard, PoisonError};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

use asso_portal_core::{Email, Persistence, UserId};

use super::{AuthError, AuthProvider, MIN_PASSWORD_LENGTH};
use crate::model::Session;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone)]
struct Account {
    user_id: UserId,
    email: Email,
    password_hash: String,
    email_verified: bool,
    display_name: Option<String>,
}

impl Account {
    fn session(&self) -> Session {
        let mut session =
            Session::new(self.user_id.clone()).with_email(self.email.clone(), self.email_verified);
        session.display_name.clone_from(&self.display_name);
        session
    }
}

#[derive(Debug, Default)]
struct AuthState {
    accounts: Vec<Account>,
    current: Option<UserId>,
    persistence: Persistence,
}

impl AuthState {
    fn account(&self, id: &UserId) -> Option<&Account> {
        self.accounts.iter().find(|a| &a.user_id == id)
    }

    fn account_mut(&mut self, id: &UserId) -> Option<&mut Account> {
        self.accounts.iter_mut().find(|a| &a.user_id == id)
    }

    fn by_email(&self, email: &Email) -> Option<&Account> {
        self.accounts.iter().find(|a| a.email.matches(email))
    }

    fn current_session(&self) -> Option<Session> {
        self.current
            .as_ref()
            .and_then(|id| self.account(id))
            .map(Account::session)
    }
}

/// Authentication provider kept in process memory.
pub struct InMemoryAuthProvider {
    state: Mutex<AuthState>,
    events: broadcast::Sender<Option<Session>>,
}

impl Default for InMemoryAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthProvider {
    /// Create a provider with no accounts and nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(AuthState::default()),
            events,
        }
    }

    /// Simulate a process restart: accounts are kept, and the session is
    /// restored only when the persistence mode survives restarts.
    #[must_use]
    pub fn restarted(&self) -> Self {
        let state = self.lock();
        let current = state
            .current
            .clone()
            .filter(|_| state.persistence.survives_restart());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: Mutex::new(AuthState {
                accounts: state.accounts.clone(),
                current,
                persistence: state.persistence,
            }),
            events,
        }
    }

    /// Mark an account's email as verified.
    ///
    /// Announces a refreshed session when that account is signed in.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if no account uses this email.
    pub fn verify_email(&self, email: &Email) -> Result<(), AuthError> {
        let refreshed = {
            let mut state = self.lock();
            let id = state
                .by_email(email)
                .map(|a| a.user_id.clone())
                .ok_or(AuthError::InvalidCredentials)?;
            if let Some(account) = state.account_mut(&id) {
                account.email_verified = true;
            }
            state
                .current_session()
                .filter(|session| session.user_id == id)
        };
        if refreshed.is_some() {
            self.announce(refreshed);
        }
        Ok(())
    }

    /// Set the provider-side display name of an account.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if no account uses this email.
    pub fn set_display_name(&self, email: &Email, name: &str) -> Result<(), AuthError> {
        let refreshed = {
            let mut state = self.lock();
            let id = state
                .by_email(email)
                .map(|a| a.user_id.clone())
                .ok_or(AuthError::InvalidCredentials)?;
            if let Some(account) = state.account_mut(&id) {
                account.display_name = Some(name.to_owned());
            }
            state
                .current_session()
                .filter(|session| session.user_id == id)
        };
        if refreshed.is_some() {
            self.announce(refreshed);
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, AuthState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self, session: Option<Session>) {
        // No receivers is fine: nobody is watching yet.
        let receivers = self.events.send(session).unwrap_or(0);
        debug!(receivers, "Announced session change");
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuthProvider {
    fn subscribe(&self) -> broadcast::Receiver<Option<Session>> {
        self.events.subscribe()
    }

    fn current_session(&self) -> Option<Session> {
        self.lock().current_session()
    }

    fn persistence(&self) -> Persistence {
        self.lock().persistence
    }

    async fn set_persistence(&self, mode: Persistence) -> Result<(), AuthError> {
        self.lock().persistence = mode;
        Ok(())
    }

    async fn create_account(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<Session, AuthError> {
        validate_password(password.expose_secret())?;
        if self.lock().by_email(email).is_some() {
            return Err(AuthError::AccountExists);
        }
        let password_hash = hash_password(password.expose_secret())?;

        let session = {
            let mut state = self.lock();
            // Re-check: another caller may have won while we were hashing.
            if state.by_email(email).is_some() {
                return Err(AuthError::AccountExists);
            }
            let account = Account {
                user_id: UserId::new(Uuid::new_v4().simple().to_string()),
                email: email.clone(),
                password_hash,
                email_verified: false,
                display_name: None,
            };
            let session = account.session();
            state.current = Some(account.user_id.clone());
            state.accounts.push(account);
            session
        };

        info!(user_id = %session.user_id, "Account created");
        self.announce(Some(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &Email, password: &SecretString) -> Result<Session, AuthError> {
        let account = self
            .lock()
            .by_email(email)
            .cloned()
            .ok_or(AuthError::InvalidCredentials)?;
        verify_password(password.expose_secret(), &account.password_hash)?;

        let session = account.session();
        self.lock().current = Some(account.user_id.clone());

        info!(user_id = %session.user_id, "Signed in");
        self.announce(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let previous = self.lock().current.take();
        if let Some(id) = previous {
            info!(user_id = %id, "Signed out");
        }
        self.announce(None);
        Ok(())
    }

    async fn update_email(&self, email: &Email) -> Result<Session, AuthError> {
        let session = {
            let mut state = self.lock();
            let id = state.current.clone().ok_or(AuthError::NotSignedIn)?;
            if state
                .by_email(email)
                .is_some_and(|other| other.user_id != id)
            {
                return Err(AuthError::AccountExists);
            }
            let account = state.account_mut(&id).ok_or(AuthError::NotSignedIn)?;
            account.email = email.clone();
            account.email_verified = false;
            account.session()
        };
        self.announce(Some(session.clone()));
        Ok(session)
    }
}

/// Validate password meets requirements.
fn validate_password(password: &str) -> Result<(), AuthError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(AuthError::WeakPassword(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }
    Ok(())
}

/// Hash a password using Argon2id.
fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), AuthError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| AuthError::InvalidCredentials)
}
