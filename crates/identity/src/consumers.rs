//! Consumers of the current user: the header and the route guard.
//!
//! Both take the cached identity at face value; authorization is enforced
//! again by the backend on every write.

use std::fmt;
use std::str::FromStr;

use tracing::debug;

use asso_portal_core::{Association, Role};

use crate::cache::{IdentityCache, UserStream};
use crate::model::{CurrentUser, User};

/// Where the client should navigate next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Home,
    Login,
}

/// State rendered by the header and menu.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderState {
    user: CurrentUser,
}

impl HeaderState {
    /// Header state for the current user, waiting for the first resolution.
    pub async fn load(cache: &IdentityCache) -> Self {
        Self {
            user: cache.get_current().await,
        }
    }

    #[must_use]
    pub const fn is_logged(&self) -> bool {
        self.user.is_some()
    }

    /// Name shown in the header, if someone is logged in.
    #[must_use]
    pub fn label(&self) -> Option<String> {
        self.user.as_deref().map(User::label)
    }

    /// Whether the publish entry should be shown.
    #[must_use]
    pub fn shows_publish(&self) -> bool {
        self.user.as_deref().is_some_and(User::is_publisher)
    }

    #[must_use]
    pub fn user(&self) -> Option<&User> {
        self.user.as_deref()
    }

    /// Take a new value from the stream.
    ///
    /// Returns `Some(Navigation::Home)` when a logged-in user just went away.
    pub fn apply(&mut self, next: CurrentUser) -> Option<Navigation> {
        let logged_out = next.is_none() && self.user.is_some();
        self.user = next;
        if logged_out {
            debug!("User logged out, navigating home");
            Some(Navigation::Home)
        } else {
            None
        }
    }

    /// Follow `stream` until it ends, calling `on_change` after each value.
    pub async fn drive<F>(mut self, mut stream: UserStream, mut on_change: F) -> Self
    where
        F: FnMut(&Self, Option<Navigation>),
    {
        while let Some(next) = stream.recv().await {
            let navigation = self.apply(next);
            on_change(&self, navigation);
        }
        self
    }
}

/// Client routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    AssociationsOverview,
    Association(Association),
    Login,
    Registration,
    Profile,
    Subscriptions,
    Publish,
    GiveRights,
}

/// Error for an unknown route path.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown route: {0}")]
pub struct UnknownRoute(pub String);

impl FromStr for Route {
    type Err = UnknownRoute;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let path = s.trim().trim_start_matches('/');
        match path {
            "" => Ok(Self::Home),
            "aboutAll" => Ok(Self::AssociationsOverview),
            "login" => Ok(Self::Login),
            "registration" => Ok(Self::Registration),
            "profile" => Ok(Self::Profile),
            "subscriptions" => Ok(Self::Subscriptions),
            "publish" => Ok(Self::Publish),
            "giveRights" => Ok(Self::GiveRights),
            other => other
                .parse::<Association>()
                .map(Self::Association)
                .map_err(|_| UnknownRoute(s.to_owned())),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Home => write!(f, "/"),
            Self::AssociationsOverview => write!(f, "/aboutAll"),
            Self::Association(a) => write!(f, "/{a}"),
            Self::Login => write!(f, "/login"),
            Self::Registration => write!(f, "/registration"),
            Self::Profile => write!(f, "/profile"),
            Self::Subscriptions => write!(f, "/subscriptions"),
            Self::Publish => write!(f, "/publish"),
            Self::GiveRights => write!(f, "/giveRights"),
        }
    }
}

/// Result of a route check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allowed,
    Redirect(Navigation),
}

/// Decides whether the current user may open a route.
#[derive(Clone)]
pub struct RouteGuard {
    cache: IdentityCache,
}

impl RouteGuard {
    #[must_use]
    pub const fn new(cache: IdentityCache) -> Self {
        Self { cache }
    }

    /// Check `route` against the current user, waiting for the first
    /// resolution if needed.
    pub async fn check(&self, route: Route) -> Access {
        let user = self.cache.get_current().await;
        let access = Self::decide(route, user.as_deref());
        debug!(%route, ?access, "Route checked");
        access
    }

    /// Access rule for `route` given `user`.
    #[must_use]
    pub fn decide(route: Route, user: Option<&User>) -> Access {
        match (route, user) {
            (Route::Profile | Route::Subscriptions | Route::Publish | Route::GiveRights, None) => {
                Access::Redirect(Navigation::Login)
            }
            (Route::Publish, Some(user)) if !user.is_publisher() => {
                Access::Redirect(Navigation::Home)
            }
            (Route::GiveRights, Some(user)) if !user.has_role(Role::Admin) => {
                Access::Redirect(Navigation::Home)
            }
            _ => Access::Allowed,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use asso_portal_core::UserId;

    use super::*;
    use crate::config::RetryPolicy;
    use crate::model::ProfileDocument;
    use crate::profile::{InMemoryProfileStore, ProfileFetcher};

    fn user(roles: Vec<Role>, can_publish_as: Vec<Association>) -> User {
        let doc = ProfileDocument {
            first_name: "Alice".to_owned(),
            last_name: "Martin".to_owned(),
            roles,
            can_publish_as,
            ..ProfileDocument::default()
        };
        User::from_profile(UserId::new("u1"), &doc)
    }

    fn cache() -> IdentityCache {
        IdentityCache::new(
            ProfileFetcher::new(Arc::new(InMemoryProfileStore::new())),
            RetryPolicy::none(),
        )
    }

    #[test]
    fn test_logout_navigates_home_once() {
        let mut header = HeaderState::default();
        assert_eq!(header.apply(None), None);
        assert_eq!(header.apply(Some(Arc::new(user(vec![Role::User], vec![])))), None);
        assert!(header.is_logged());
        assert_eq!(header.label().as_deref(), Some("Alice Martin"));

        assert_eq!(header.apply(None), Some(Navigation::Home));
        assert!(!header.is_logged());
        assert_eq!(header.apply(None), None);
    }

    #[test]
    fn test_publish_entry_follows_rights() {
        let mut header = HeaderState::default();
        header.apply(Some(Arc::new(user(vec![Role::User], vec![]))));
        assert!(!header.shows_publish());
        header.apply(Some(Arc::new(user(vec![Role::User], vec![Association::Bde]))));
        assert!(header.shows_publish());
    }

    #[tokio::test]
    async fn test_drive_reports_each_value() {
        let cache = cache();
        let stream = cache.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let driver = {
            let seen = seen.clone();
            tokio::spawn(HeaderState::default().drive(stream, move |header, nav| {
                seen.lock().unwrap().push((header.is_logged(), nav));
            }))
        };

        cache.update(Some(user(vec![Role::User], vec![])));
        cache.update(None);
        drop(cache);
        let header = driver.await.unwrap();

        assert!(!header.is_logged());
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(true, None), (false, Some(Navigation::Home))]
        );
    }

    #[test]
    fn test_route_paths() {
        assert_eq!("/".parse::<Route>().unwrap(), Route::Home);
        assert_eq!(
            "/bds".parse::<Route>().unwrap(),
            Route::Association(Association::Bds)
        );
        assert_eq!("giveRights".parse::<Route>().unwrap(), Route::GiveRights);
        assert!("/nowhere".parse::<Route>().is_err());
        assert_eq!(Route::Association(Association::Pnc).to_string(), "/pnc");
    }

    #[test]
    fn test_login_required_routes() {
        for route in [Route::Profile, Route::Subscriptions, Route::Publish, Route::GiveRights] {
            assert_eq!(
                RouteGuard::decide(route, None),
                Access::Redirect(Navigation::Login)
            );
        }
        assert_eq!(RouteGuard::decide(Route::Home, None), Access::Allowed);
        assert_eq!(
            RouteGuard::decide(Route::Association(Association::Bda), None),
            Access::Allowed
        );
    }

    #[test]
    fn test_publish_requires_rights() {
        let member = user(vec![Role::User], vec![]);
        let publisher = user(vec![Role::User], vec![Association::Bdj]);
        assert_eq!(
            RouteGuard::decide(Route::Publish, Some(&member)),
            Access::Redirect(Navigation::Home)
        );
        assert_eq!(
            RouteGuard::decide(Route::Publish, Some(&publisher)),
            Access::Allowed
        );
    }

    #[test]
    fn test_give_rights_requires_admin() {
        let member = user(vec![Role::User], vec![]);
        let admin = user(vec![Role::User, Role::Admin], vec![]);
        assert_eq!(
            RouteGuard::decide(Route::GiveRights, Some(&member)),
            Access::Redirect(Navigation::Home)
        );
        assert_eq!(
            RouteGuard::decide(Route::GiveRights, Some(&admin)),
            Access::Allowed
        );
    }

    #[tokio::test]
    async fn test_guard_uses_cached_user() {
        let cache = cache();
        let guard = RouteGuard::new(cache.clone());

        cache.update(None);
        assert_eq!(
            guard.check(Route::Profile).await,
            Access::Redirect(Navigation::Login)
        );

        cache.update(Some(user(vec![Role::User], vec![])));
        assert_eq!(guard.check(Route::Profile).await, Access::Allowed);
    }
}
