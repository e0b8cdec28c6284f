//! In-process profile store with fault injection.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;

use asso_portal_core::UserId;

use super::ProfileStore;
use crate::error::StoreError;
use crate::model::{ProfileDocument, ProfilePatch};

#[derive(Debug, Clone, Copy, Default)]
struct Fault {
    latency: Duration,
    fail_reads: bool,
}

/// Profile store kept in process memory.
///
/// Reads of a given identifier can be slowed down or made to fail, which is
/// how the cache's race and failure handling is exercised.
#[derive(Default)]
pub struct InMemoryProfileStore {
    docs: RwLock<HashMap<UserId, ProfileDocument>>,
    faults: Mutex<HashMap<UserId, Fault>>,
    reads: AtomicUsize,
}

impl InMemoryProfileStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a document.
    pub async fn insert(&self, id: UserId, doc: ProfileDocument) {
        self.docs.write().await.insert(id, doc);
    }

    /// Delay every read of `id` by `latency`.
    pub fn set_latency(&self, id: &UserId, latency: Duration) {
        self.faults().entry(id.clone()).or_default().latency = latency;
    }

    /// Make every read of `id` fail.
    pub fn fail_reads(&self, id: &UserId) {
        self.faults().entry(id.clone()).or_default().fail_reads = true;
    }

    /// Remove injected latency and failures for `id`.
    pub fn clear_faults(&self, id: &UserId) {
        self.faults().remove(id);
    }

    /// Number of point reads served so far, failed ones included.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn faults(&self) -> MutexGuard<'_, HashMap<UserId, Fault>> {
        self.faults.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, id: &UserId) -> Result<Option<ProfileDocument>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let fault = self.faults().get(id).copied().unwrap_or_default();
        if !fault.latency.is_zero() {
            tokio::time::sleep(fault.latency).await;
        }
        if fault.fail_reads {
            return Err(StoreError::Unavailable(format!("injected read failure for {id}")));
        }
        Ok(self.docs.read().await.get(id).cloned())
    }

    async fn set(&self, id: &UserId, doc: &ProfileDocument) -> Result<(), StoreError> {
        self.docs.write().await.insert(id.clone(), doc.clone());
        Ok(())
    }

    async fn update(&self, id: &UserId, patch: &ProfilePatch) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;
        let doc = docs.get_mut(id).ok_or(StoreError::NotFound)?;
        patch.apply(doc);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<(UserId, ProfileDocument)>, StoreError> {
        let mut all: Vec<_> = self
            .docs
            .read()
            .await
            .iter()
            .map(|(id, doc)| (id.clone(), doc.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(all)
    }
}
