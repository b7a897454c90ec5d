use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::Shared;
use std::collections::HashMap;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use tracing::debug;

use crate::layout::ResourcePath;
use crate::metrics::CacheStats;
use crate::remote::RemoteError;

type PendingProvision = Shared<BoxFuture<'static, Result<(), RemoteError>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningState {
    Absent,
    InFlight,
    /// Terminal for the lifetime of the process.
    Confirmed,
}

#[derive(Default)]
struct CacheState {
    confirmed: HashSet<ResourcePath>,
    pending: HashMap<ResourcePath, PendingProvision>,
}

#[derive(Default)]
struct CacheInner {
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    joined: AtomicU64,
}

impl CacheInner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, path: &ResourcePath, confirmed: bool) {
        let mut state = self.lock();
        state.pending.remove(path);
        if confirmed {
            state.confirmed.insert(path.clone());
        }
    }
}

/// Which resource paths exist remotely, and which are being created.
///
/// Confirmed entries never expire. At most one provisioning action per path
/// is in flight; concurrent callers for the same path await that action.
#[derive(Clone, Default)]
pub struct ResourcePathCache {
    inner: Arc<CacheInner>,
}

impl ResourcePathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn confirmed(&self, path: &ResourcePath) -> bool {
        self.inner.lock().confirmed.contains(path)
    }

    pub fn mark_confirmed(&self, path: &ResourcePath) {
        self.inner.lock().confirmed.insert(path.clone());
    }

    pub fn state(&self, path: &ResourcePath) -> ProvisioningState {
        let state = self.inner.lock();
        if state.confirmed.contains(path) {
            ProvisioningState::Confirmed
        } else if state.pending.contains_key(path) {
            ProvisioningState::InFlight
        } else {
            ProvisioningState::Absent
        }
    }

    /// Resolves once `path` is confirmed, running `factory` only if no
    /// other caller is already provisioning it.
    ///
    /// `factory` is called under the cache lock and must only build the
    /// future; the remote work happens when the future is polled. On error
    /// the path goes back to absent so a later call retries.
    pub async fn get_or_create<F, Fut>(
        &self,
        path: &ResourcePath,
        factory: F,
    ) -> Result<(), RemoteError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), RemoteError>> + Send + 'static,
    {
        let pending = {
            let mut state = self.inner.lock();
            if state.confirmed.contains(path) {
                self.inner.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(());
            }
            if let Some(pending) = state.pending.get(path) {
                self.inner.joined.fetch_add(1, Ordering::Relaxed);
                debug!(%path, "joining in-flight provisioning");
                pending.clone()
            } else {
                self.inner.misses.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let key = path.clone();
                let work = factory();
                let pending = async move {
                    let result = work.await;
                    inner.settle(&key, result.is_ok());
                    result
                }
                .boxed()
                .shared();
                state.pending.insert(path.clone(), pending.clone());
                pending
            }
        };
        pending.await
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.inner.lock();
        CacheStats {
            hits: self.inner.hits.load(Ordering::Relaxed),
            misses: self.inner.misses.load(Ordering::Relaxed),
            joined: self.inner.joined.load(Ordering::Relaxed),
            confirmed: state.confirmed.len(),
            pending: state.pending.len(),
        }
    }
}

impl std::fmt::Debug for ResourcePathCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stats = self.stats();
        f.debug_struct("ResourcePathCache")
            .field("confirmed", &stats.confirmed)
            .field("pending", &stats.pending)
            .finish()
    }
}
