//! Authentication error types.

use thiserror::Error;

/// Errors that can occur during authentication provider operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] asso_portal_core::EmailError),

    /// Invalid credentials (wrong password or unknown account).
    #[error("invalid credentials")]
    InvalidCredentials,

    /// An account already exists for this email.
    #[error("account already exists")]
    AccountExists,

    /// Password too weak or invalid.
    #[error("password validation failed: {0}")]
    WeakPassword(String),

    /// The operation needs a signed-in session.
    #[error("no session is signed in")]
    NotSignedIn,

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,

    /// The provider could not be reached.
    #[error("auth provider unavailable: {0}")]
    Unavailable(String),
}
