//! Session adapter: provider notifications to a single callback.

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::AuthProvider;
use crate::model::Session;

/// Forwards every provider session change to one callback.
///
/// The callback runs once synchronously inside [`SessionAdapter::install`]
/// with the provider's current session, then once per provider event, in
/// order, from a background task. Dropping the adapter uninstalls it.
///
/// Must be installed from within a Tokio runtime.
pub struct SessionAdapter {
    task: JoinHandle<()>,
}

impl SessionAdapter {
    /// Install the adapter on `provider`.
    pub fn install<F>(provider: Arc<dyn AuthProvider>, on_session_changed: F) -> Self
    where
        F: Fn(Option<Session>) + Send + Sync + 'static,
    {
        // Subscribe before reading the current session so no change can slip
        // between the two; at worst the same state is reported twice.
        let mut events = provider.subscribe();
        on_session_changed(provider.current_session());

        let task = tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(session) => on_session_changed(session),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Session events lagged, replaying current session");
                        on_session_changed(provider.current_session());
                    }
                    Err(RecvError::Closed) => {
                        debug!("Auth provider closed its session channel");
                        break;
                    }
                }
            }
        });

        Self { task }
    }

    /// Whether the forwarding task is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop forwarding events.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for SessionAdapter {
    fn drop(&mut self) {
        self.task.abort();
    }
}
