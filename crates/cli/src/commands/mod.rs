//! CLI command implementations.

pub mod demo;
pub mod migrate;
pub mod users;

use asso_portal_identity::IdentityConfig;
use asso_portal_identity::config::ConfigError;
use asso_portal_identity::profile::create_pool;

/// Errors shared by the commands that talk to `PostgreSQL`.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Connect to the profile database configured in the environment.
async fn connect() -> Result<sqlx::PgPool, DatabaseError> {
    let config = IdentityConfig::from_env()?;
    tracing::info!("Connecting to profile database...");
    Ok(create_pool(config.require_database_url()?).await?)
}
