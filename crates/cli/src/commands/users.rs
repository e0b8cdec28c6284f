//! User profile management commands.
//!
//! # Usage
//!
//! ```bash
//! portal-cli users list
//! portal-cli users grant -u 3f2a9c -a bde,pnc
//! ```

use asso_portal_core::{Association, AssociationError, UserId};
use asso_portal_identity::profile::{PgProfileStore, ProfileStore};
use asso_portal_identity::service::grant_publish_rights;
use asso_portal_identity::{ServiceError, StoreError, User};
use thiserror::Error;

use super::{DatabaseError, connect};

/// Errors that can occur during user operations.
#[derive(Debug, Error)]
pub enum UsersError {
    #[error(transparent)]
    Connect(#[from] DatabaseError),

    #[error("Profile store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("Invalid association: {0}")]
    InvalidAssociation(#[from] AssociationError),
}

/// Print every user profile, one per line.
///
/// # Errors
///
/// Returns `UsersError` if the store cannot be read.
pub async fn list() -> Result<(), UsersError> {
    let store = PgProfileStore::new(connect().await?);
    let profiles = store.list().await?;

    tracing::info!(count = profiles.len(), "Loaded user profiles");
    for (id, doc) in profiles {
        let user = User::from_profile(id, &doc);
        let publishes: Vec<String> = user.can_publish_as.iter().map(ToString::to_string).collect();

        #[allow(clippy::print_stdout)]
        {
            println!(
                "{}\t{}\t{}\t{}",
                user.id,
                user.label(),
                user.mail.as_ref().map_or("-", |m| m.as_str()),
                publishes.join(",")
            );
        }
    }
    Ok(())
}

/// Grant publishing rights to `user`.
///
/// # Errors
///
/// Returns `UsersError` if a code is unknown, the user has no profile, or the
/// write fails.
pub async fn grant(user: &str, associations: &[String]) -> Result<(), UsersError> {
    let associations = associations
        .iter()
        .map(|code| code.parse::<Association>())
        .collect::<Result<Vec<_>, _>>()?;

    let store = PgProfileStore::new(connect().await?);
    let rights = grant_publish_rights(&store, &UserId::new(user), &associations).await?;

    let codes: Vec<String> = rights.iter().map(ToString::to_string).collect();
    tracing::info!(user_id = user, rights = %codes.join(","), "Publishing rights updated");
    Ok(())
}
