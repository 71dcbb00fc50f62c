//! The entity cache.
//!
//! Every key has at most one entry holding the last fetched value, the time
//! it was last refreshed or last asked for, and the callers waiting on a
//! fetch. Lookups never block: a fresh, idle entry answers immediately and
//! anything else joins the waiting list.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use spacemux_protocol::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::CacheConfig;

/// Loads one entity by key.
///
/// `None` means the entity could not be loaded; the cache does not retry
/// on its own.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(&self, key: &str) -> impl Future<Output = Option<Value>> + Send;
}

#[derive(Default)]
struct Entry {
    value: Option<Value>,
    /// Set when a fetch is issued and again when one succeeds.
    last_updated: Option<Instant>,
    waiters: Vec<oneshot::Sender<Option<Value>>>,
}

struct Inner<F> {
    fetcher: F,
    config: CacheConfig,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Read-through cache in front of a [`Fetcher`].
///
/// Cheap to clone. Each fetch runs as its own Tokio task, so lookups must
/// happen inside a runtime.
pub struct EntityCache<F: Fetcher> {
    inner: Arc<Inner<F>>,
}

impl<F: Fetcher> Clone for EntityCache<F> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Result of [`EntityCache::lookup`].
pub enum Lookup {
    /// Answered from the cache: the last successfully fetched value, if
    /// any. A failed refresh keeps the earlier value.
    Ready(Option<Value>),
    /// Waiting for a fetch to complete.
    Pending(PendingLookup),
}

impl Lookup {
    /// Waits for the value, however it is delivered.
    pub async fn value(self) -> Option<Value> {
        match self {
            Self::Ready(value) => value,
            Self::Pending(pending) => pending.await,
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

/// A lookup waiting on a fetch. Resolves to `None` if the fetch fails.
pub struct PendingLookup {
    rx: oneshot::Receiver<Option<Value>>,
}

impl Future for PendingLookup {
    type Output = Option<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|r| r.ok().flatten())
    }
}

impl<F: Fetcher> EntityCache<F> {
    pub fn new(fetcher: F, config: CacheConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                fetcher,
                config: config.validated(),
                entries: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Looks up `key`.
    ///
    /// - `force`, or an entry older than the freshness window: join the
    ///   waiting list and fetch.
    /// - A fetch already in flight: join the waiting list. If that fetch
    ///   was issued longer than the stuck grace ago, fetch again.
    /// - Otherwise: answer from the cache.
    ///
    /// The caller is registered before this returns, so dropping the
    /// returned [`Lookup`] unpolled is harmless.
    pub fn lookup(&self, key: &str, force: bool) -> Lookup {
        let now = Instant::now();
        let config = &self.inner.config;

        let rx = {
            let mut entries = self.inner.entries.lock();
            let entry = entries.entry(key.to_string()).or_default();
            let age = entry.last_updated.map(|t| now.duration_since(t));
            let stale = age.is_none_or(|age| age > config.freshness);

            let fetch = if force || stale {
                true
            } else if !entry.waiters.is_empty() {
                age.is_some_and(|age| age >= config.stuck_grace)
            } else {
                return Lookup::Ready(entry.value.clone());
            };

            let (tx, rx) = oneshot::channel();
            entry.waiters.push(tx);
            if fetch {
                entry.last_updated = Some(now);
            }
            let waiting = entry.waiters.len();
            if entries.len() > config.max_entries {
                evict_idle(&mut entries, key);
            }

            if fetch {
                tracing::debug!(key, force, waiting, "fetching entity");
            } else {
                tracing::trace!(key, waiting, "joined in-flight fetch");
                return Lookup::Pending(PendingLookup { rx });
            }
            rx
        };

        self.spawn_fetch(key.to_string());
        Lookup::Pending(PendingLookup { rx })
    }

    /// Convenience for `lookup(key, force).value().await`.
    pub async fn get(&self, key: &str, force: bool) -> Option<Value> {
        self.lookup(key, force).value().await
    }

    /// Number of keys currently cached.
    pub fn len(&self) -> usize {
        self.inner.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn spawn_fetch(&self, key: String) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            let result = inner.fetcher.fetch(&key).await;
            inner.complete(&key, result);
        });
    }
}

impl<F> Inner<F> {
    /// Stores a successful result and wakes every waiter. A failed fetch
    /// also wakes every waiter, with `None`.
    fn complete(&self, key: &str, result: Option<Value>) {
        let waiters = {
            let mut entries = self.entries.lock();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            if let Some(value) = &result {
                entry.value = Some(value.clone());
                entry.last_updated = Some(Instant::now());
            }
            std::mem::take(&mut entry.waiters)
        };

        if result.is_none() {
            tracing::warn!(key, waiters = waiters.len(), "entity fetch failed");
        }
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

/// Drops the idle entry refreshed longest ago. Entries with waiters, and
/// the entry being looked up, are never evicted.
fn evict_idle(entries: &mut HashMap<String, Entry>, keep: &str) {
    let victim = entries
        .iter()
        .filter(|(k, e)| e.waiters.is_empty() && k.as_str() != keep)
        .min_by_key(|(_, e)| e.last_updated)
        .map(|(k, _)| k.clone());
    if let Some(key) = victim {
        tracing::trace!(key = %key, "evicting cache entry");
        entries.remove(&key);
    }
}
