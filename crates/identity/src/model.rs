//! Identity domain types.
//!
//! [`ProfileDocument`] is what the store persists, [`Session`] is what the
//! authentication provider reports, and [`User`] is the merged value handed
//! to consumers.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use asso_portal_core::{Association, Email, Role, UserId};

/// The value published by the identity cache: a fully merged user, or `None`
/// when nobody is signed in (or the profile could not be resolved).
pub type CurrentUser = Option<Arc<User>>;

/// Account state written at registration.
pub const INITIAL_ACCOUNT_STATE: i16 = 0;

/// Persisted profile record, keyed by the session's [`UserId`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileDocument {
    pub mail: Option<Email>,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub photo_url: Option<String>,
    #[serde(default)]
    pub roles: Vec<Role>,
    #[serde(default)]
    pub can_publish_as: Vec<Association>,
    #[serde(default)]
    pub subscriptions: Vec<Association>,
    #[serde(default)]
    pub state: i16,
    pub last_connection: Option<DateTime<Utc>>,
    pub registration_date: Option<DateTime<Utc>>,
}

impl ProfileDocument {
    /// Document written for a freshly registered account.
    #[must_use]
    pub fn for_registration(
        mail: Email,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        photo_url: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            mail: Some(mail),
            first_name: first_name.into(),
            last_name: last_name.into(),
            photo_url,
            roles: vec![Role::User],
            can_publish_as: Vec::new(),
            subscriptions: Vec::new(),
            state: INITIAL_ACCOUNT_STATE,
            last_connection: Some(now),
            registration_date: Some(now),
        }
    }
}

/// Partial write applied to an existing [`ProfileDocument`].
///
/// Fields left as `None` are untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub mail: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub subscriptions: Option<Vec<Association>>,
    pub can_publish_as: Option<Vec<Association>>,
    pub last_connection: Option<DateTime<Utc>>,
}

impl ProfilePatch {
    #[must_use]
    pub fn first_name(value: impl Into<String>) -> Self {
        Self {
            first_name: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn last_name(value: impl Into<String>) -> Self {
        Self {
            last_name: Some(value.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn mail(value: Email) -> Self {
        Self {
            mail: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn subscriptions(value: Vec<Association>) -> Self {
        Self {
            subscriptions: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn can_publish_as(value: Vec<Association>) -> Self {
        Self {
            can_publish_as: Some(value),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn last_connection(at: DateTime<Utc>) -> Self {
        Self {
            last_connection: Some(at),
            ..Self::default()
        }
    }

    /// Whether the patch would change nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Apply the set fields to `doc`.
    pub fn apply(&self, doc: &mut ProfileDocument) {
        if let Some(mail) = &self.mail {
            doc.mail = Some(mail.clone());
        }
        if let Some(first_name) = &self.first_name {
            doc.first_name.clone_from(first_name);
        }
        if let Some(last_name) = &self.last_name {
            doc.last_name.clone_from(last_name);
        }
        if let Some(subscriptions) = &self.subscriptions {
            doc.subscriptions.clone_from(subscriptions);
        }
        if let Some(rights) = &self.can_publish_as {
            doc.can_publish_as.clone_from(rights);
        }
        if let Some(at) = self.last_connection {
            doc.last_connection = Some(at);
        }
    }
}

/// Authentication session as reported by the provider.
///
/// The cache only looks at [`Session::user_id`] to fetch the profile, then
/// layers the remaining attributes on top of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub email: Option<Email>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl Session {
    /// Session carrying only an identifier.
    #[must_use]
    pub const fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
            email_verified: false,
            display_name: None,
            photo_url: None,
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: Email, verified: bool) -> Self {
        self.email = Some(email);
        self.email_verified = verified;
        self
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_photo_url(mut self, url: impl Into<String>) -> Self {
        self.photo_url = Some(url.into());
        self
    }
}

/// A portal user (domain type).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub first_name: String,
    pub last_name: String,
    /// Provider-confirmed display name, when the session carries one.
    pub display_name: Option<String>,
    pub mail: Option<Email>,
    pub email_verified: bool,
    pub photo_url: Option<String>,
    pub roles: BTreeSet<Role>,
    pub can_publish_as: BTreeSet<Association>,
    pub subscriptions: BTreeSet<Association>,
    pub registration_date: Option<DateTime<Utc>>,
    pub last_connection: Option<DateTime<Utc>>,
}

impl User {
    /// Build a user from its persisted profile.
    #[must_use]
    pub fn from_profile(id: UserId, doc: &ProfileDocument) -> Self {
        Self {
            id,
            first_name: doc.first_name.clone(),
            last_name: doc.last_name.clone(),
            display_name: None,
            mail: doc.mail.clone(),
            email_verified: false,
            photo_url: doc.photo_url.clone(),
            roles: doc.roles.iter().copied().collect(),
            can_publish_as: doc.can_publish_as.iter().copied().collect(),
            subscriptions: doc.subscriptions.iter().copied().collect(),
            registration_date: doc.registration_date,
            last_connection: doc.last_connection,
        }
    }

    /// Layer session attributes on top of the profile.
    ///
    /// The session wins wherever it carries a value; the verified flag always
    /// comes from the session.
    pub fn supply_with_session(&mut self, session: &Session) {
        if let Some(email) = &session.email {
            self.mail = Some(email.clone());
        }
        if let Some(name) = &session.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(photo) = &session.photo_url {
            self.photo_url = Some(photo.clone());
        }
        self.email_verified = session.email_verified;
    }

    /// Name shown in headers and menus.
    #[must_use]
    pub fn label(&self) -> String {
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.trim().is_empty()) {
            return name.to_owned();
        }
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if !full.is_empty() {
            return full.to_owned();
        }
        self.mail
            .as_ref()
            .map_or_else(|| self.id.to_string(), ToString::to_string)
    }

    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    /// Whether the user may publish as at least one association.
    #[must_use]
    pub fn is_publisher(&self) -> bool {
        !self.can_publish_as.is_empty()
    }

    #[must_use]
    pub fn can_publish_for(&self, association: Association) -> bool {
        self.can_publish_as.contains(&association)
    }
}
