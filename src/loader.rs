//! Request-scoped batch loading.
//!
//! A [`BatchLoader`] collects the keys requested during one resolution tick and
//! fetches them with a single call to its bulk fetch function when the
//! executor dispatches it. Every key gets one shared placeholder per loader, so
//! a key is fetched at most once for the lifetime of the loader.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::{join_all, Shared};
use futures::FutureExt;
use indexmap::IndexMap;
use tokio::sync::oneshot;

use crate::error::ResolveError;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Result of a bulk fetch. Keys missing from the map are reported as not found.
pub type BatchResult<K, V> = Result<HashMap<K, V>, String>;

pub type LoadResult<V> = Result<V, ResolveError>;

type BatchFn<K, V> = Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, BatchResult<K, V>> + Send + Sync>;

type Placeholder<V> = Shared<oneshot::Receiver<LoadResult<V>>>;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct PendingBatch<K, V> {
    placeholders: HashMap<K, Placeholder<V>>,
    senders: IndexMap<K, oneshot::Sender<LoadResult<V>>>,
}

impl<K, V> Default for PendingBatch<K, V> {
    fn default() -> Self {
        Self {
            placeholders: HashMap::new(),
            senders: IndexMap::new(),
        }
    }
}

pub struct BatchLoader<K, V> {
    name: String,
    loader_fn: BatchFn<K, V>,
    pending: Mutex<PendingBatch<K, V>>,
    dispatches: AtomicUsize,
}

impl<K, V> BatchLoader<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(name: impl Into<String>, loader_fn: F) -> Self
    where
        F: Fn(Vec<K>) -> BoxFuture<'static, BatchResult<K, V>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader_fn: Arc::new(loader_fn),
            pending: Mutex::new(PendingBatch::default()),
            dispatches: AtomicUsize::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers `key` and returns its placeholder.
    ///
    /// The key is queued for the next dispatch unless it is already pending or
    /// fetched; in that case the existing placeholder is shared.
    pub fn load(&self, key: K) -> impl Future<Output = LoadResult<V>> + Send + 'static {
        let placeholder = {
            let mut pending = lock(&self.pending);
            match pending.placeholders.get(&key) {
                Some(placeholder) => placeholder.clone(),
                None => {
                    let (tx, rx) = oneshot::channel();
                    let placeholder = rx.shared();
                    pending.placeholders.insert(key.clone(), placeholder.clone());
                    pending.senders.insert(key, tx);
                    placeholder
                }
            }
        };

        async move {
            placeholder
                .await
                .unwrap_or(Err(ResolveError::RequestCancelled))
        }
    }

    pub fn load_many(
        &self,
        keys: Vec<K>,
    ) -> impl Future<Output = Vec<LoadResult<V>>> + Send + 'static {
        join_all(keys.into_iter().map(|key| self.load(key)).collect::<Vec<_>>())
    }

    pub fn has_pending(&self) -> bool {
        !lock(&self.pending).senders.is_empty()
    }

    /// Number of bulk fetches issued so far.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    /// Fetches every pending key with one bulk call and fulfils their placeholders.
    pub async fn dispatch(&self) {
        let senders = {
            let mut pending = lock(&self.pending);
            std::mem::take(&mut pending.senders)
        };

        if senders.is_empty() {
            return;
        }

        let keys: Vec<K> = senders.keys().cloned().collect();
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(loader = %self.name, keys = keys.len(), "dispatching batch");

        match (self.loader_fn)(keys).await {
            Ok(mut values) => {
                for (key, tx) in senders {
                    let result = values
                        .remove(&key)
                        .ok_or_else(|| ResolveError::not_found(&self.name, format!("{:?}", key)));
                    let _ = tx.send(result);
                }
            }
            Err(message) => {
                tracing::warn!(loader = %self.name, %message, "batch fetch failed");
                let error = ResolveError::BatchFetchFailure {
                    loader: self.name.clone(),
                    message,
                };
                for (_, tx) in senders {
                    let _ = tx.send(Err(error.clone()));
                }
            }
        }
    }
}

/// Object-safe view of a loader used by the registry to dispatch without
/// knowing its key and value types.
trait PendingDispatch: Send + Sync {
    fn has_pending(&self) -> bool;
    fn dispatch(&self) -> BoxFuture<'_, ()>;
}

impl<K, V> PendingDispatch for BatchLoader<K, V>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn has_pending(&self) -> bool {
        BatchLoader::has_pending(self)
    }

    fn dispatch(&self) -> BoxFuture<'_, ()> {
        Box::pin(BatchLoader::dispatch(self))
    }
}

struct RegisteredLoader {
    typed: Arc<dyn Any + Send + Sync>,
    erased: Arc<dyn PendingDispatch>,
}

/// Named loaders owned by one request.
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: Mutex<IndexMap<String, RegisteredLoader>>,
}

impl LoaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the loader registered under `name`, constructing it with
    /// `loader_fn` on first use.
    pub fn get_or_add<K, V, F>(
        &self,
        name: &str,
        loader_fn: F,
    ) -> Result<Arc<BatchLoader<K, V>>, ResolveError>
    where
        K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(Vec<K>) -> BoxFuture<'static, BatchResult<K, V>> + Send + Sync + 'static,
    {
        let mut loaders = lock(&self.loaders);

        if let Some(existing) = loaders.get(name) {
            return existing
                .typed
                .clone()
                .downcast::<BatchLoader<K, V>>()
                .map_err(|_| ResolveError::LoaderTypeMismatch {
                    loader: name.to_string(),
                });
        }

        let loader = Arc::new(BatchLoader::new(name, loader_fn));
        loaders.insert(
            name.to_string(),
            RegisteredLoader {
                typed: loader.clone(),
                erased: loader.clone(),
            },
        );
        Ok(loader)
    }

    pub fn len(&self) -> usize {
        lock(&self.loaders).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_pending(&self) -> bool {
        lock(&self.loaders).values().any(|l| l.erased.has_pending())
    }

    /// Dispatches every loader with pending keys concurrently. Returns how many
    /// loaders were dispatched.
    pub async fn dispatch_all(&self) -> usize {
        let ready: Vec<Arc<dyn PendingDispatch>> = lock(&self.loaders)
            .values()
            .filter(|l| l.erased.has_pending())
            .map(|l| l.erased.clone())
            .collect();

        join_all(ready.iter().map(|l| l.dispatch())).await;
        ready.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type Calls = Arc<Mutex<Vec<Vec<i64>>>>;

    fn doubling_loader(calls: Calls) -> BatchLoader<i64, i64> {
        BatchLoader::new("double", move |keys: Vec<i64>| {
            let calls = calls.clone();
            Box::pin(async move {
                calls.lock().unwrap().push(keys.clone());
                Ok(keys.into_iter().map(|k| (k, k * 2)).collect())
            })
        })
    }

    #[tokio::test]
    async fn test_repeated_key_fetched_once() {
        let calls = Calls::default();
        let loader = doubling_loader(calls.clone());

        let first = loader.load(21);
        let second = loader.load(21);
        let third = loader.load(21);
        assert!(loader.has_pending());

        loader.dispatch().await;

        assert_eq!(first.await, Ok(42));
        assert_eq!(second.await, Ok(42));
        assert_eq!(third.await, Ok(42));
        assert_eq!(*calls.lock().unwrap(), vec![vec![21]]);
    }

    #[tokio::test]
    async fn test_keys_coalesced_into_one_fetch() {
        let calls = Calls::default();
        let loader = doubling_loader(calls.clone());

        let results = loader.load_many(vec![7, 9, 7]);
        loader.dispatch().await;

        assert_eq!(results.await, vec![Ok(14), Ok(18), Ok(14)]);
        assert_eq!(loader.dispatch_count(), 1);
        assert_eq!(*calls.lock().unwrap(), vec![vec![7, 9]]);
    }

    #[tokio::test]
    async fn test_resolved_key_served_from_cache() {
        let calls = Calls::default();
        let loader = doubling_loader(calls.clone());

        let first = loader.load(1);
        loader.dispatch().await;
        assert_eq!(first.await, Ok(2));

        assert!(!loader.has_pending());
        assert_eq!(loader.load(1).await, Ok(2));
        loader.dispatch().await;
        assert_eq!(loader.dispatch_count(), 1);
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let loader = BatchLoader::new("customers", |_keys: Vec<i64>| {
            Box::pin(async move { Ok(HashMap::<i64, String>::new()) })
        });

        let missing = loader.load(3);
        loader.dispatch().await;

        let err = missing.await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_fetch_failure_rejects_whole_dispatch() {
        let loader = BatchLoader::new("broken", |_keys: Vec<i64>| {
            Box::pin(async move { Err::<HashMap<i64, i64>, _>("connection reset".to_string()) })
        });

        let a = loader.load(1);
        let b = loader.load(2);
        loader.dispatch().await;

        let expected = ResolveError::BatchFetchFailure {
            loader: "broken".to_string(),
            message: "connection reset".to_string(),
        };
        assert_eq!(a.await, Err(expected.clone()));
        assert_eq!(b.await, Err(expected));
    }

    #[tokio::test]
    async fn test_dropped_loader_cancels_placeholders() {
        let calls = Calls::default();
        let loader = doubling_loader(calls);
        let orphan = loader.load(5);
        drop(loader);

        assert_eq!(orphan.await, Err(ResolveError::RequestCancelled));
    }

    #[tokio::test]
    async fn test_registry_reuses_loader_by_name() {
        let registry = LoaderRegistry::new();
        let created = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let created = created.clone();
            let loader = registry
                .get_or_add("items", move |keys: Vec<i64>| {
                    created.fetch_add(1, Ordering::SeqCst);
                    Box::pin(async move { Ok(keys.into_iter().map(|k| (k, k)).collect()) })
                })
                .unwrap();
            let _ = loader.load(1);
        }

        assert_eq!(registry.len(), 1);
        assert_eq!(registry.dispatch_all().await, 1);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_registry_rejects_mismatched_types() {
        let registry = LoaderRegistry::new();
        registry
            .get_or_add("items", |keys: Vec<i64>| {
                Box::pin(async move { Ok(keys.into_iter().map(|k| (k, k)).collect()) })
            })
            .unwrap();

        let err = registry
            .get_or_add("items", |keys: Vec<String>| {
                Box::pin(async move { Ok(keys.into_iter().map(|k| (k.clone(), k)).collect()) })
            })
            .err()
            .unwrap();
        assert_eq!(
            err,
            ResolveError::LoaderTypeMismatch {
                loader: "items".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_all_only_touches_pending_loaders() {
        let registry = LoaderRegistry::new();
        let numbers = registry
            .get_or_add("numbers", |keys: Vec<i64>| {
                Box::pin(async move { Ok(keys.into_iter().map(|k| (k, k + 1)).collect()) })
            })
            .unwrap();
        let words = registry
            .get_or_add("words", |keys: Vec<String>| {
                Box::pin(async move { Ok(keys.into_iter().map(|k| (k.clone(), k.len())).collect()) })
            })
            .unwrap();

        let n = numbers.load(1);
        let w = words.load("four".to_string());
        assert!(registry.has_pending());
        assert_eq!(registry.dispatch_all().await, 2);
        assert_eq!(n.await, Ok(2));
        assert_eq!(w.await, Ok(4));

        assert!(!registry.has_pending());
        assert_eq!(registry.dispatch_all().await, 0);
    }
}
