//! The identity cache: single holder of the current user.
//!
//! Every session change and every explicit [`IdentityCache::update`] is
//! stamped with a sequence token when it arrives. A fetch resolution is
//! applied only if its token is still the latest issued, so the most recently
//! arrived event wins regardless of the order in which fetches complete.
//!
//! Publishing happens under a short mutex that is never held across an
//! `.await`: the value first becomes current, then every subscriber's queue
//! receives it. Subscriber queues are unbounded, so a slow reader never holds
//! up the cache or another reader.

use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use chrono::Utc;
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use asso_portal_core::UserId;

use crate::auth::{AuthProvider, SessionAdapter};
use crate::config::RetryPolicy;
use crate::error::ResolutionError;
use crate::model::{CurrentUser, Session, User};
use crate::profile::ProfileFetcher;

/// Last applied state, mirrored into a watch channel for waiters.
#[derive(Debug, Clone, Default)]
struct Snapshot {
    /// Token of the resolution that produced this value (0 before any).
    token: u64,
    /// Identifier the resolution was about, `None` for a sign-out.
    subject: Option<UserId>,
    /// `None` while unresolved.
    value: Option<CurrentUser>,
}

#[derive(Default)]
struct State {
    issued: u64,
    applied: u64,
    subscribers: Vec<mpsc::UnboundedSender<CurrentUser>>,
}

/// Outcome of applying a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Applied {
    Published,
    Unchanged,
    Superseded,
}

struct Inner {
    fetcher: ProfileFetcher,
    retry: RetryPolicy,
    state: Mutex<State>,
    snapshot: watch::Sender<Snapshot>,
}

/// Process-wide current-user cache.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct IdentityCache {
    inner: Arc<Inner>,
}

impl IdentityCache {
    /// Create an unresolved cache.
    #[must_use]
    pub fn new(fetcher: ProfileFetcher, retry: RetryPolicy) -> Self {
        let (snapshot, _) = watch::channel(Snapshot::default());
        Self {
            inner: Arc::new(Inner {
                fetcher,
                retry,
                state: Mutex::new(State::default()),
                snapshot,
            }),
        }
    }

    /// Feed every session change of `provider` into this cache.
    ///
    /// The provider's current session is processed immediately, so the cache
    /// leaves the unresolved state even if no event ever arrives. Keep the
    /// returned adapter alive for as long as the cache should follow the
    /// provider.
    pub fn attach(&self, provider: Arc<dyn AuthProvider>) -> SessionAdapter {
        let cache = self.clone();
        SessionAdapter::install(provider, move |session| cache.on_session_changed(session))
    }

    /// Process one session change.
    ///
    /// A sign-out is applied synchronously. A sign-in spawns the profile
    /// fetch; its result is applied only if no newer change arrived meanwhile.
    pub fn on_session_changed(&self, session: Option<Session>) {
        let token = self.inner.issue();
        match session {
            None => {
                debug!(token, "Session cleared");
                self.inner.apply_and_log(token, None, None);
            }
            Some(session) => {
                debug!(token, user_id = %session.user_id, "Session changed, resolving profile");
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move { inner.resolve_session(token, session).await });
            }
        }
    }

    /// The latest resolved value.
    ///
    /// Waits for the first resolution if none happened yet.
    pub async fn get_current(&self) -> CurrentUser {
        let mut rx = self.inner.snapshot.subscribe();
        rx.wait_for(|s| s.value.is_some())
            .await
            .ok()
            .and_then(|s| s.value.clone().flatten())
    }

    /// The latest resolved value without waiting; `None` while unresolved.
    #[must_use]
    pub fn peek(&self) -> Option<CurrentUser> {
        self.inner.snapshot.borrow().value.clone()
    }

    /// Whether at least one resolution has been applied.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.inner.snapshot.borrow().value.is_some()
    }

    /// Subscribe to the current user.
    ///
    /// The stream yields the current value first (or the first resolution if
    /// the cache is still unresolved), then every later change once, in the
    /// order it was applied.
    #[must_use]
    pub fn subscribe(&self) -> UserStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.inner.lock();
        if let Some(current) = self.inner.snapshot.borrow().value.clone() {
            // The receiver is alive in this scope.
            let _ = tx.send(current);
        }
        state.subscribers.push(tx);
        UserStream { rx }
    }

    /// Replace the current value without fetching.
    ///
    /// Supersedes any fetch still in flight and notifies every subscriber
    /// exactly once, even if the value did not change.
    pub fn update(&self, user: Option<User>) {
        let subject = user.as_ref().map(|u| u.id.clone());
        let value = user.map(Arc::new);
        let mut state = self.inner.lock();
        state.issued += 1;
        let token = state.issued;
        debug!(token, user_id = ?subject, "Current user replaced explicitly");
        self.inner.publish(&mut state, token, subject, value, true);
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        let mut state = self.inner.lock();
        state.subscribers.retain(|tx| !tx.is_closed());
        state.subscribers.len()
    }

    /// Latest sequence token issued.
    pub(crate) fn sequence(&self) -> u64 {
        self.inner.lock().issued
    }

    /// Wait for the first resolution issued after `after` that concerns `id`.
    pub(crate) async fn resolution_for(&self, after: u64, id: &UserId) -> CurrentUser {
        let mut rx = self.inner.snapshot.subscribe();
        rx.wait_for(|s| s.token > after && s.subject.as_ref() == Some(id))
            .await
            .ok()
            .and_then(|s| s.value.clone().flatten())
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn issue(&self) -> u64 {
        let mut state = self.lock();
        state.issued += 1;
        state.issued
    }

    async fn resolve_session(self: Arc<Self>, token: u64, session: Session) {
        let id = session.user_id.clone();
        let value = match self.fetcher.fetch_with_retry(&id, self.retry).await {
            Ok(mut user) => {
                user.supply_with_session(&session);
                Some(Arc::new(user))
            }
            Err(e) => {
                warn!(token, user_id = %id, error = %e, "Profile resolution failed, publishing no current user");
                None
            }
        };

        // Refreshes of the same session are not new connections.
        let connected = self.snapshot.borrow().subject.as_ref() != Some(&id);
        let outcome = self.apply_and_log(token, Some(id.clone()), value);
        if outcome == Some(Applied::Published) {
            info!(token, user_id = %id, "Current user resolved");
            if connected {
                if let Err(e) = self.fetcher.record_connection(&id, Utc::now()).await {
                    warn!(user_id = %id, error = %e, "Failed to record last connection");
                }
            }
        }
    }

    fn apply_and_log(
        &self,
        token: u64,
        subject: Option<UserId>,
        value: CurrentUser,
    ) -> Option<Applied> {
        match self.apply(token, subject, value) {
            Ok(Applied::Superseded) => {
                debug!(token, "Discarding superseded resolution");
                Some(Applied::Superseded)
            }
            Ok(applied) => Some(applied),
            Err(e) => {
                error!(error = %e, "Dropping resolution");
                None
            }
        }
    }

    fn apply(
        &self,
        token: u64,
        subject: Option<UserId>,
        value: CurrentUser,
    ) -> Result<Applied, ResolutionError> {
        let mut state = self.lock();
        let latest = state.issued;
        if token > latest || (token == latest && state.applied == token) {
            return Err(ResolutionError::InvariantViolation { token, latest });
        }
        if token < latest {
            return Ok(Applied::Superseded);
        }
        Ok(self.publish(&mut state, token, subject, value, false))
    }

    /// Make `value` current, then notify subscribers.
    ///
    /// Resolutions equal to the current value only refresh the snapshot;
    /// forced publications always notify.
    fn publish(
        &self,
        state: &mut State,
        token: u64,
        subject: Option<UserId>,
        value: CurrentUser,
        force: bool,
    ) -> Applied {
        state.applied = token;
        let unchanged = !force
            && self
                .snapshot
                .borrow()
                .value
                .as_ref()
                .is_some_and(|current| current == &value);

        self.snapshot.send_replace(Snapshot {
            token,
            subject,
            value: Some(value.clone()),
        });
        if unchanged {
            return Applied::Unchanged;
        }

        state.subscribers.retain(|tx| tx.send(value.clone()).is_ok());
        Applied::Published
    }
}

/// Live stream of current-user values from [`IdentityCache::subscribe`].
///
/// Ends only when the cache itself is gone.
pub struct UserStream {
    rx: mpsc::UnboundedReceiver<CurrentUser>,
}

impl UserStream {
    /// Wait for the next value.
    pub async fn recv(&mut self) -> Option<CurrentUser> {
        self.rx.recv().await
    }

    /// The next value if one is already queued.
    pub fn try_recv(&mut self) -> Option<CurrentUser> {
        self.rx.try_recv().ok()
    }
}

impl Stream for UserStream {
    type Item = CurrentUser;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}
