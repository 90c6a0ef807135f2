//! In-memory query cache with stale-while-revalidate semantics.
//!
//! Every cached value lives in a [`CacheEntry`] keyed by `K`. A read serves the
//! cached value while it is fresh, serves it and revalidates in the background
//! once it is stale, and awaits the fetcher when nothing is cached. Concurrent
//! fetches of one key share a single in-flight request.
//!
//! State sits behind a `std::sync::Mutex` that is never held across an
//! `.await`, so a [`QueryCache::write`] is atomic with respect to readers.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ClientError, ClientResult};

/// Produces a fresh value for one key.
pub type Fetcher<V> = Arc<dyn Fn() -> BoxFuture<'static, ClientResult<V>> + Send + Sync>;

/// Applied to every fetched value before it is stored.
pub type Overlay<K, V> = Arc<dyn Fn(&K, V) -> V + Send + Sync>;

type SharedFetch<V> = Shared<BoxFuture<'static, ClientResult<V>>>;

/// Freshness and retention for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    /// Age after which a read triggers a background refetch.
    pub stale_time: Duration,
    /// How long an entry without subscribers is retained.
    pub gc_time: Duration,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
        }
    }
}

struct Inflight<V> {
    id: u64,
    future: SharedFetch<V>,
}

/// One cached query.
pub struct CacheEntry<V> {
    pub value: Option<V>,
    pub fetched_at: Option<Instant>,
    pub stale_after: Duration,
    pub gc_after: Duration,
    invalidated: bool,
    inflight: Option<Inflight<V>>,
    fetcher: Option<Fetcher<V>>,
    subscribers: usize,
    unobserved_since: Option<Instant>,
    version: u64,
    last_error: Option<ClientError>,
    notify: watch::Sender<Option<V>>,
}

impl<V: Clone> CacheEntry<V> {
    fn new(options: CacheOptions) -> Self {
        Self {
            value: None,
            fetched_at: None,
            stale_after: options.stale_time,
            gc_after: options.gc_time,
            invalidated: false,
            inflight: None,
            fetcher: None,
            subscribers: 0,
            unobserved_since: Some(Instant::now()),
            version: 0,
            last_error: None,
            notify: watch::channel(None).0,
        }
    }

    fn is_stale(&self, now: Instant) -> bool {
        self.invalidated
            || self
                .fetched_at
                .map_or(true, |at| now.duration_since(at) >= self.stale_after)
    }

    fn publish(&mut self) {
        self.version += 1;
        self.notify.send_replace(self.value.clone());
    }
}

/// Point-in-time view of an entry's bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStatus {
    pub is_stale: bool,
    pub is_fetching: bool,
    pub subscribers: usize,
    pub version: u64,
    pub last_error: Option<ClientError>,
}

struct Inner<K, V> {
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
    overlay: Mutex<Option<Overlay<K, V>>>,
    next_fetch_id: AtomicU64,
    defaults: CacheOptions,
}

/// Generic keyed cache. Cloning shares the same storage.
pub struct QueryCache<K, V> {
    inner: Arc<Inner<K, V>>,
}

impl<K, V> Clone for QueryCache<K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> fmt::Debug for QueryCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self
            .inner
            .entries
            .lock()
            .map(|e| e.len())
            .unwrap_or_default();
        f.debug_struct("QueryCache")
            .field("entries", &len)
            .field("defaults", &self.inner.defaults)
            .finish()
    }
}

impl<K, V> QueryCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(defaults: CacheOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                entries: Mutex::new(HashMap::new()),
                overlay: Mutex::new(None),
                next_fetch_id: AtomicU64::new(1),
                defaults,
            }),
        }
    }

    pub fn defaults(&self) -> CacheOptions {
        self.inner.defaults
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<K, CacheEntry<V>>> {
        self.inner.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Install the function applied to fetched values before they are stored.
    pub fn set_overlay(&self, overlay: Overlay<K, V>) {
        *self.inner.overlay.lock().unwrap_or_else(|e| e.into_inner()) = Some(overlay);
    }

    /// Read through the cache.
    ///
    /// Fresh value → returned as is. Stale value → returned, refetched in the
    /// background. No value → awaits the (possibly shared) fetch.
    pub async fn read(&self, key: &K, fetcher: Fetcher<V>, options: CacheOptions) -> ClientResult<V> {
        let pending = {
            let mut entries = self.entries();
            if !entries.contains_key(key) {
                self.schedule_collection(options.gc_time);
            }
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(options));
            entry.stale_after = options.stale_time;
            entry.gc_after = options.gc_time;
            entry.fetcher = Some(fetcher.clone());

            if let Some(value) = entry.value.clone() {
                if !entry.is_stale(Instant::now()) {
                    debug!(key = %key, "cache hit");
                    return Ok(value);
                }
                debug!(key = %key, "cache stale, revalidating in background");
                let refresh = self.start_fetch(key, entry, fetcher);
                spawn_detached(refresh);
                return Ok(value);
            }

            debug!(key = %key, "cache miss");
            self.start_fetch(key, entry, fetcher)
        };

        pending.await
    }

    /// Await a request for `key` even when a fresh value is cached. Joins a
    /// request already in flight.
    pub async fn refetch(&self, key: &K, fetcher: Fetcher<V>, options: CacheOptions) -> ClientResult<V> {
        let pending = {
            let mut entries = self.entries();
            if !entries.contains_key(key) {
                self.schedule_collection(options.gc_time);
            }
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(options));
            entry.stale_after = options.stale_time;
            entry.gc_after = options.gc_time;
            entry.fetcher = Some(fetcher.clone());
            debug!(key = %key, "forced refetch");
            self.start_fetch(key, entry, fetcher)
        };

        pending.await
    }

    fn start_fetch(&self, key: &K, entry: &mut CacheEntry<V>, fetcher: Fetcher<V>) -> SharedFetch<V> {
        if let Some(inflight) = &entry.inflight {
            debug!(key = %key, "joining in-flight request");
            return inflight.future.clone();
        }

        let id = self.inner.next_fetch_id.fetch_add(1, Ordering::Relaxed);
        let weak: Weak<Inner<K, V>> = Arc::downgrade(&self.inner);
        let owned_key = key.clone();
        let future = async move {
            let result = fetcher().await;
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.complete(&owned_key, id, &result);
            }
            result
        }
        .boxed()
        .shared();

        entry.inflight = Some(Inflight {
            id,
            future: future.clone(),
        });
        future
    }

    fn complete(&self, key: &K, id: u64, result: &ClientResult<V>) {
        let overlay = self
            .inner
            .overlay
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut entries = self.entries();
        let Some(entry) = entries.get_mut(key) else {
            debug!(key = %key, "fetch finished for evicted entry");
            return;
        };
        if entry.inflight.as_ref().map(|i| i.id) != Some(id) {
            debug!(key = %key, "fetch result detached, not stored");
            return;
        }
        entry.inflight = None;

        match result {
            Ok(value) => {
                let value = match &overlay {
                    Some(apply) => apply(key, value.clone()),
                    None => value.clone(),
                };
                entry.value = Some(value);
                entry.fetched_at = Some(Instant::now());
                entry.invalidated = false;
                entry.last_error = None;
                entry.publish();
            }
            Err(e) => {
                // Stale-if-error: keep whatever was there.
                warn!(key = %key, error = %e, "fetch failed, keeping previous value");
                entry.last_error = Some(e.clone());
            }
        }
    }

    /// Current value without fetching.
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries().get(key).and_then(|e| e.value.clone())
    }

    /// Bookkeeping for one entry.
    pub fn status(&self, key: &K) -> Option<EntryStatus> {
        let now = Instant::now();
        self.entries().get(key).map(|e| EntryStatus {
            is_stale: e.is_stale(now),
            is_fetching: e.inflight.is_some(),
            subscribers: e.subscribers,
            version: e.version,
            last_error: e.last_error.clone(),
        })
    }

    /// Apply a synchronous transformation. Returns the entry's new version.
    pub fn write<F>(&self, key: &K, updater: F) -> u64
    where
        F: FnOnce(Option<&V>) -> Option<V>,
    {
        let mut entries = self.entries();
        if !entries.contains_key(key) {
            self.schedule_collection(self.inner.defaults.gc_time);
        }
        let entry = entries
            .entry(key.clone())
            .or_insert_with(|| CacheEntry::new(self.inner.defaults));
        entry.value = updater(entry.value.as_ref());
        entry.publish();
        entry.version
    }

    /// Version counter of an entry (bumped on every stored change).
    pub fn version(&self, key: &K) -> Option<u64> {
        self.entries().get(key).map(|e| e.version)
    }

    /// Detach the in-flight request for `key`; its result will not be stored.
    pub fn cancel(&self, key: &K) -> bool {
        let mut entries = self.entries();
        let detached = entries
            .get_mut(key)
            .and_then(|e| e.inflight.take())
            .is_some();
        if detached {
            debug!(key = %key, "in-flight request detached");
        }
        detached
    }

    /// Mark matching entries stale; subscribed ones are refetched at once.
    ///
    /// In-flight requests of matching entries predate the invalidation and are
    /// detached. Returns the number of entries marked.
    pub fn invalidate<P>(&self, matches: P) -> usize
    where
        P: Fn(&K) -> bool,
    {
        let mut refetches = Vec::new();
        let mut marked = 0;
        {
            let mut entries = self.entries();
            for (key, entry) in entries.iter_mut().filter(|(k, _)| matches(k)) {
                marked += 1;
                entry.invalidated = true;
                entry.inflight = None;
                if entry.subscribers == 0 {
                    debug!(key = %key, "invalidated");
                    continue;
                }
                if let Some(fetcher) = entry.fetcher.clone() {
                    debug!(key = %key, "invalidated, refetching subscribed entry");
                    refetches.push(self.start_fetch(key, entry, fetcher));
                }
            }
        }

        for refetch in refetches {
            spawn_detached(refetch);
        }
        marked
    }

    /// Await the in-flight request for `key`, if there is one.
    pub async fn settled(&self, key: &K) -> Option<ClientResult<V>> {
        let pending = self
            .entries()
            .get(key)
            .and_then(|e| e.inflight.as_ref().map(|i| i.future.clone()));
        match pending {
            Some(future) => Some(future.await),
            None => None,
        }
    }

    /// Register interest in `key`. The entry is kept and refetched on
    /// invalidation for as long as the subscription lives.
    ///
    /// An entry that is invalidated or holds no value, with no request in
    /// flight, is refetched as soon as it gains a subscriber.
    pub fn subscribe(&self, key: &K) -> Subscription<K, V> {
        let (receiver, refetch) = {
            let mut entries = self.entries();
            let entry = entries
                .entry(key.clone())
                .or_insert_with(|| CacheEntry::new(self.inner.defaults));
            entry.subscribers += 1;
            entry.unobserved_since = None;

            let needs_data = entry.invalidated || entry.value.is_none();
            let refetch = match entry.fetcher.clone() {
                Some(fetcher) if needs_data && entry.inflight.is_none() => {
                    debug!(key = %key, "subscribed to missing or invalidated entry, refetching");
                    Some(self.start_fetch(key, entry, fetcher))
                }
                _ => None,
            };
            (entry.notify.subscribe(), refetch)
        };

        if let Some(refetch) = refetch {
            spawn_detached(refetch);
        }

        Subscription {
            cache: self.clone(),
            key: key.clone(),
            receiver,
        }
    }

    fn unsubscribe(&self, key: &K) {
        let gc_after = {
            let mut entries = self.entries();
            let Some(entry) = entries.get_mut(key) else {
                return;
            };
            entry.subscribers = entry.subscribers.saturating_sub(1);
            if entry.subscribers > 0 {
                return;
            }
            entry.unobserved_since = Some(Instant::now());
            entry.gc_after
        };

        self.schedule_collection(gc_after);
    }

    /// Run [`QueryCache::collect_garbage`] once `after` has elapsed.
    fn schedule_collection(&self, after: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                QueryCache { inner }.collect_garbage();
            }
        });
    }

    /// Drop entries that have gone unobserved for longer than their gc time.
    pub fn collect_garbage(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|key, entry| {
            let expired = entry.subscribers == 0
                && entry.inflight.is_none()
                && entry
                    .unobserved_since
                    .is_some_and(|since| now.duration_since(since) >= entry.gc_after);
            if expired {
                debug!(key = %key, "evicting unobserved entry");
            }
            !expired
        });
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn spawn_detached<V>(future: SharedFetch<V>)
where
    V: Clone + Send + Sync + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(async move {
                let _ = future.await;
            });
        }
        Err(_) => debug!("no runtime, background refetch deferred to next read"),
    }
}

/// Live interest in one cache key; dropping it starts the gc clock.
pub struct Subscription<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    cache: QueryCache<K, V>,
    key: K,
    receiver: watch::Receiver<Option<V>>,
}

impl<K, V> Subscription<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Latest value published for the key.
    pub fn current(&self) -> Option<V> {
        self.receiver.borrow().clone()
    }

    /// Wait until the value changes. Returns `false` if the entry was dropped.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }
}

impl<K, V> Drop for Subscription<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        self.cache.unsubscribe(&self.key);
    }
}

impl<K, V> fmt::Debug for Subscription<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key.to_string())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type TestCache = QueryCache<&'static str, u32>;

    const OPTS: CacheOptions = CacheOptions {
        stale_time: Duration::from_secs(60),
        gc_time: Duration::from_secs(120),
    };

    /// Returns 1, 2, 3, ... on successive calls, after a short delay.
    fn counting_fetcher(calls: Arc<AtomicUsize>) -> Fetcher<u32> {
        Arc::new(move || {
            let calls = calls.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(10)).await;
                Ok(calls.fetch_add(1, Ordering::SeqCst) as u32 + 1)
            }
            .boxed()
        })
    }

    fn failing_fetcher() -> Fetcher<u32> {
        Arc::new(|| {
            async {
                Err(ClientError::Network {
                    message: "connection reset".into(),
                })
            }
            .boxed()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_then_fresh_hit() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.read(&"k", counting_fetcher(calls.clone()), OPTS).await;
        let second = cache.read(&"k", counting_fetcher(calls.clone()), OPTS).await;

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_reads_share_one_request() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());

        let (a, b) = tokio::join!(
            cache.read(&"k", fetcher.clone(), OPTS),
            cache.read(&"k", fetcher.clone(), OPTS)
        );

        assert_eq!(a, Ok(1));
        assert_eq!(b, Ok(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_value_served_while_revalidating() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());

        cache.read(&"k", fetcher.clone(), OPTS).await.unwrap();
        tokio::time::advance(OPTS.stale_time + Duration::from_secs(1)).await;

        let served = cache.read(&"k", fetcher.clone(), OPTS).await;
        assert_eq!(served, Ok(1), "stale value is served immediately");

        let _ = cache.settled(&"k").await;
        assert_eq!(cache.get(&"k"), Some(2));
        assert!(!cache.status(&"k").unwrap().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_error_keeps_previous_value() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .read(&"k", counting_fetcher(calls.clone()), OPTS)
            .await
            .unwrap();
        cache.invalidate(|_| true);

        let served = cache.read(&"k", failing_fetcher(), OPTS).await;
        assert_eq!(served, Ok(1));
        let _ = cache.settled(&"k").await;

        assert_eq!(cache.get(&"k"), Some(1));
        let status = cache.status(&"k").unwrap();
        assert!(matches!(status.last_error, Some(ClientError::Network { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_miss_error_is_returned() {
        let cache = TestCache::new(OPTS);
        let result = cache.read(&"k", failing_fetcher(), OPTS).await;
        assert!(matches!(result, Err(ClientError::Network { .. })));
        assert_eq!(cache.get(&"k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_refetches_only_subscribed_entries() {
        let cache = TestCache::new(OPTS);
        let watched_calls = Arc::new(AtomicUsize::new(0));
        let idle_calls = Arc::new(AtomicUsize::new(0));

        cache
            .read(&"watched", counting_fetcher(watched_calls.clone()), OPTS)
            .await
            .unwrap();
        cache
            .read(&"idle", counting_fetcher(idle_calls.clone()), OPTS)
            .await
            .unwrap();
        let _sub = cache.subscribe(&"watched");

        assert_eq!(cache.invalidate(|_| true), 2);
        let _ = cache.settled(&"watched").await;

        assert_eq!(cache.get(&"watched"), Some(2));
        assert_eq!(watched_calls.load(Ordering::SeqCst), 2);
        assert_eq!(idle_calls.load(Ordering::SeqCst), 1);
        assert!(cache.status(&"idle").unwrap().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_detaches_inflight_result() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());

        let reader = cache.clone();
        let pending = tokio::spawn(async move { reader.read(&"k", fetcher, OPTS).await });
        tokio::task::yield_now().await;

        assert!(cache.cancel(&"k"));
        cache.write(&"k", |_| Some(99));

        assert_eq!(pending.await.unwrap(), Ok(1), "waiter still gets its result");
        assert_eq!(cache.get(&"k"), Some(99), "detached result is not stored");
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlay_applied_to_fetched_values() {
        let cache = TestCache::new(OPTS);
        cache.set_overlay(Arc::new(|_key: &&str, value: u32| value + 100));
        let calls = Arc::new(AtomicUsize::new(0));

        let returned = cache
            .read(&"k", counting_fetcher(calls.clone()), OPTS)
            .await
            .unwrap();

        assert_eq!(returned, 1, "caller sees the raw fetch result");
        assert_eq!(cache.get(&"k"), Some(101));
    }

    #[tokio::test(start_paused = true)]
    async fn test_write_bumps_version_and_notifies() {
        let cache = TestCache::new(OPTS);
        let mut sub = cache.subscribe(&"k");
        assert_eq!(sub.current(), None);

        let version = cache.write(&"k", |old| Some(old.copied().unwrap_or(0) + 5));
        assert!(sub.changed().await);
        assert_eq!(sub.current(), Some(5));
        assert_eq!(cache.version(&"k"), Some(version));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unobserved_entries_are_evicted_after_gc_time() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .read(&"k", counting_fetcher(calls.clone()), OPTS)
            .await
            .unwrap();
        let sub = cache.subscribe(&"k");

        tokio::time::advance(OPTS.gc_time * 2).await;
        cache.collect_garbage();
        assert_eq!(cache.get(&"k"), Some(1), "subscribed entries are kept");

        drop(sub);
        tokio::time::advance(OPTS.gc_time + Duration::from_secs(1)).await;
        cache.collect_garbage();
        assert_eq!(cache.get(&"k"), None);

        let again = cache.read(&"k", counting_fetcher(calls.clone()), OPTS).await;
        assert_eq!(again, Ok(2), "evicted entries are simply refetched");
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_never_subscribed_are_evicted() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .read(&"k", counting_fetcher(calls.clone()), OPTS)
            .await
            .unwrap();
        cache.write(&"written", |_| Some(7));
        assert_eq!(cache.len(), 2);

        tokio::time::sleep(OPTS.gc_time + Duration::from_secs(1)).await;
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetch_bypasses_fresh_value() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());

        cache.read(&"k", fetcher.clone(), OPTS).await.unwrap();
        let refetched = cache.refetch(&"k", fetcher.clone(), OPTS).await;

        assert_eq!(refetched, Ok(2));
        assert_eq!(cache.get(&"k"), Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribing_to_emptied_entry_refetches() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));
        let fetcher = counting_fetcher(calls.clone());

        let reader = cache.clone();
        let first = tokio::spawn({
            let fetcher = fetcher.clone();
            async move { reader.read(&"k", fetcher, OPTS).await }
        });
        tokio::task::yield_now().await;

        // The first response is detached and nothing was subscribed yet.
        cache.invalidate(|_| true);
        assert_eq!(first.await.unwrap(), Ok(1));
        assert_eq!(cache.get(&"k"), None);

        let mut sub = cache.subscribe(&"k");
        assert!(sub.changed().await);
        assert_eq!(sub.current(), Some(2));
        assert!(!cache.status(&"k").unwrap().is_stale);
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribing_to_fresh_entry_does_not_refetch() {
        let cache = TestCache::new(OPTS);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .read(&"k", counting_fetcher(calls.clone()), OPTS)
            .await
            .unwrap();
        let _sub = cache.subscribe(&"k");

        assert!(!cache.status(&"k").unwrap().is_fetching);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
