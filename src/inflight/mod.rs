//! In-flight deduplication: at most one running load per key.
//!
//! The first caller for a key spawns the load on the tokio runtime and
//! registers a [`Shared`] handle to it; later callers for the same key get a
//! clone of that handle and observe the exact same result. The registry
//! entry is removed by a drop guard owned by the spawned task, so it goes
//! away when the load settles whether it succeeds, fails or panics.
//!
//! Waiters may stop waiting at any time. The spawned task keeps running and
//! settles normally even when nobody is left to observe it.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinError;
use tracing::trace;

/// A cloneable handle to a load that may still be running.
pub type SharedLoad<V, E> = Shared<BoxFuture<'static, Result<V, E>>>;

type Pending<V, E> = Arc<Mutex<HashMap<String, SharedLoad<V, E>>>>;

/// Registry of pending loads keyed by string.
pub struct InFlight<V, E> {
    pending: Pending<V, E>,
}

impl<V, E> InFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Returns the pending load for `key`, or starts one with `start`.
    ///
    /// The boolean is `true` when this call started the load. `start` is only
    /// invoked in that case. Must be called from within a tokio runtime.
    pub fn join_or_start<F, Fut>(&self, key: &str, start: F) -> (SharedLoad<V, E>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
    {
        let mut pending = lock(&self.pending);
        if let Some(existing) = pending.get(key) {
            trace!(key, "joining in-flight load");
            return (existing.clone(), false);
        }

        let guard = Settle {
            pending: Arc::clone(&self.pending),
            key: key.to_owned(),
        };
        let body = start();
        let task = tokio::spawn(async move {
            let _guard = guard;
            body.await
        });

        let shared = async move { task.await.unwrap_or_else(|e| Err(E::from(e))) }
            .boxed()
            .shared();
        pending.insert(key.to_owned(), shared.clone());
        trace!(key, "started load");

        (shared, true)
    }

    /// Returns `true` while a load for `key` is running.
    pub fn contains(&self, key: &str) -> bool {
        lock(&self.pending).contains_key(key)
    }

    /// Number of running loads.
    pub fn len(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<V, E> Default for InFlight<V, E>
where
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + From<JoinError> + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V, E> fmt::Debug for InFlight<V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = lock(&self.pending).keys().cloned().collect();
        f.debug_struct("InFlight").field("pending", &keys).finish()
    }
}

// Removes the registry entry when the owning task finishes or unwinds.
struct Settle<V, E> {
    pending: Pending<V, E>,
    key: String,
}

impl<V, E> Drop for Settle<V, E> {
    fn drop(&mut self) {
        lock(&self.pending).remove(&self.key);
        trace!(key = %self.key, "load settled");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Failed(&'static str),
        Aborted,
    }

    impl From<JoinError> for TestError {
        fn from(_: JoinError) -> Self {
            Self::Aborted
        }
    }

    type Registry = InFlight<Arc<u32>, TestError>;

    #[tokio::test(start_paused = true)]
    async fn concurrent_callers_share_one_load() {
        let registry = Registry::new();
        let runs = Arc::new(AtomicU32::new(0));

        let start = |runs: Arc<AtomicU32>| {
            move || async move {
                runs.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(Arc::new(7))
            }
        };

        let (a, started_a) = registry.join_or_start("k", start(runs.clone()));
        let (b, started_b) = registry.join_or_start("k", start(runs.clone()));
        assert!(started_a);
        assert!(!started_b);
        assert_eq!(registry.len(), 1);

        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entry_removed_after_success() {
        let registry = Registry::new();
        let (load, _) = registry.join_or_start("k", || async { Ok(Arc::new(1)) });
        load.await.unwrap();
        tokio::task::yield_now().await;
        assert!(!registry.contains("k"));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn failure_is_shared_and_entry_removed() {
        let registry = Registry::new();
        let (a, _) = registry.join_or_start("k", || async {
            tokio::task::yield_now().await;
            Err(TestError::Failed("boom"))
        });
        let (b, started) = registry.join_or_start("k", || async { Ok(Arc::new(0)) });
        assert!(!started);

        assert_eq!(a.await.unwrap_err(), TestError::Failed("boom"));
        assert_eq!(b.await.unwrap_err(), TestError::Failed("boom"));
        assert!(!registry.contains("k"));

        // a fresh call starts a fresh load
        let (c, started) = registry.join_or_start("k", || async { Ok(Arc::new(2)) });
        assert!(started);
        assert_eq!(*c.await.unwrap(), 2);
    }

    #[tokio::test]
    async fn panicking_load_settles_as_aborted() {
        let registry = Registry::new();
        let (load, _) = registry.join_or_start("k", || async {
            if true {
                panic!("load exploded");
            }
            Ok(Arc::new(0))
        });
        assert_eq!(load.await.unwrap_err(), TestError::Aborted);
        assert!(!registry.contains("k"));
    }

    #[tokio::test(start_paused = true)]
    async fn load_completes_when_all_waiters_drop() {
        let registry = Registry::new();
        let finished = Arc::new(AtomicU32::new(0));
        let flag = finished.clone();

        let (load, _) = registry.join_or_start("k", move || async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            flag.store(1, Ordering::SeqCst);
            Ok(Arc::new(1))
        });
        drop(load);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert!(!registry.contains("k"));
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let registry = Registry::new();
        let (a, sa) = registry.join_or_start("a", || async { Ok(Arc::new(1)) });
        let (b, sb) = registry.join_or_start("b", || async { Ok(Arc::new(2)) });
        assert!(sa && sb);
        assert_eq!(*a.await.unwrap() + *b.await.unwrap(), 3);
    }
}
