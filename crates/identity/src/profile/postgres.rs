//! `PostgreSQL` profile store.
//!
//! # Table: `portal.user_profile`
//!
//! One row per user, keyed by the authentication provider's identifier.
//! Roles and associations are stored as `TEXT[]` of their lowercase codes.
//!
//! # Migrations
//!
//! Stored in `crates/identity/migrations/` and run via:
//! ```bash
//! cargo run -p asso-portal-cli -- migrate
//! ```

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use asso_portal_core::{Association, Email, Role, UserId};

use super::ProfileStore;
use crate::error::StoreError;
use crate::model::{ProfileDocument, ProfilePatch};

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

#[derive(Debug, sqlx::FromRow)]
struct ProfileRow {
    id: String,
    mail: Option<String>,
    first_name: String,
    last_name: String,
    photo_url: Option<String>,
    roles: Vec<String>,
    can_publish_as: Vec<String>,
    subscriptions: Vec<String>,
    state: i16,
    last_connection: Option<DateTime<Utc>>,
    registration_date: Option<DateTime<Utc>>,
}

impl ProfileRow {
    fn into_document(self) -> Result<(UserId, ProfileDocument), StoreError> {
        let mail = self
            .mail
            .as_deref()
            .map(Email::parse)
            .transpose()
            .map_err(|e| StoreError::DataCorruption(format!("invalid email in database: {e}")))?;

        let doc = ProfileDocument {
            mail,
            first_name: self.first_name,
            last_name: self.last_name,
            photo_url: self.photo_url,
            roles: parse_codes::<Role>(&self.roles)?,
            can_publish_as: parse_codes::<Association>(&self.can_publish_as)?,
            subscriptions: parse_codes::<Association>(&self.subscriptions)?,
            state: self.state,
            last_connection: self.last_connection,
            registration_date: self.registration_date,
        };
        Ok((UserId::new(self.id), doc))
    }
}

fn parse_codes<T>(codes: &[String]) -> Result<Vec<T>, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    codes
        .iter()
        .map(|code| {
            code.parse::<T>().map_err(|e| {
                StoreError::DataCorruption(format!("invalid code {code:?} in database: {e}"))
            })
        })
        .collect()
}

fn to_codes<T: ToString>(values: &[T]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

const SELECT_PROFILE: &str = r"
    SELECT id, mail, first_name, last_name, photo_url,
           roles, can_publish_as, subscriptions, state,
           last_connection, registration_date
    FROM portal.user_profile
";

/// Profile store backed by `portal.user_profile`.
#[derive(Clone)]
pub struct PgProfileStore {
    pool: PgPool,
}

impl PgProfileStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileStore for PgProfileStore {
    async fn get(&self, id: &UserId) -> Result<Option<ProfileDocument>, StoreError> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("{SELECT_PROFILE} WHERE id = $1"))
                .bind(id.as_str())
                .fetch_optional(&self.pool)
                .await?;

        row.map(|r| r.into_document().map(|(_, doc)| doc))
            .transpose()
    }

    async fn set(&self, id: &UserId, doc: &ProfileDocument) -> Result<(), StoreError> {
        sqlx::query(
            r"
            INSERT INTO portal.user_profile
                (id, mail, first_name, last_name, photo_url, roles, can_publish_as,
                 subscriptions, state, last_connection, registration_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (id) DO UPDATE SET
                mail = EXCLUDED.mail,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                photo_url = EXCLUDED.photo_url,
                roles = EXCLUDED.roles,
                can_publish_as = EXCLUDED.can_publish_as,
                subscriptions = EXCLUDED.subscriptions,
                state = EXCLUDED.state,
                last_connection = EXCLUDED.last_connection,
                registration_date = EXCLUDED.registration_date
            ",
        )
        .bind(id.as_str())
        .bind(doc.mail.as_ref().map(Email::as_str))
        .bind(&doc.first_name)
        .bind(&doc.last_name)
        .bind(doc.photo_url.as_deref())
        .bind(to_codes(&doc.roles))
        .bind(to_codes(&doc.can_publish_as))
        .bind(to_codes(&doc.subscriptions))
        .bind(doc.state)
        .bind(doc.last_connection)
        .bind(doc.registration_date)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, id: &UserId, patch: &ProfilePatch) -> Result<(), StoreError> {
        let result = sqlx::query(
            r"
            UPDATE portal.user_profile SET
                mail = COALESCE($2, mail),
                first_name = COALESCE($3, first_name),
                last_name = COALESCE($4, last_name),
                subscriptions = COALESCE($5, subscriptions),
                can_publish_as = COALESCE($6, can_publish_as),
                last_connection = COALESCE($7, last_connection)
            WHERE id = $1
            ",
        )
        .bind(id.as_str())
        .bind(patch.mail.as_ref().map(Email::as_str))
        .bind(patch.first_name.as_deref())
        .bind(patch.last_name.as_deref())
        .bind(patch.subscriptions.as_deref().map(to_codes))
        .bind(patch.can_publish_as.as_deref().map(to_codes))
        .bind(patch.last_connection)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(UserId, ProfileDocument)>, StoreError> {
        let rows: Vec<ProfileRow> =
            sqlx::query_as(&format!("{SELECT_PROFILE} ORDER BY last_name, first_name, id"))
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(ProfileRow::into_document).collect()
    }
}
