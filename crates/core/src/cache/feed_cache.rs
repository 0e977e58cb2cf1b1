//! Get-or-fetch cache over a [`Fetcher`].
//!
//! Concurrency contract:
//! - `entries` is guarded by an async `RwLock`; lookups take the read lock,
//!   commits and `load` take the write lock, `save` encodes under the read
//!   lock so a snapshot never contains a torn entry.
//! - Misses on the same URL share one spawned fetch task. Every waiter
//!   receives the same result. Misses on different URLs do not wait on each
//!   other.
//! - A flight commits its entry before it leaves the in-flight table, so a
//!   caller that finds no flight is guaranteed to see the committed entry.
//! - [`FeedCache::cancel`] abandons running flights. A cancelled flight
//!   commits nothing.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::{Mutex, RwLock, watch};

use super::entry::CacheEntry;
use super::fetcher::Fetcher;
use super::store::{self, EntryMap};
use crate::{Article, Error};

/// Outcome of a flight, cloned out to every waiter.
#[derive(Debug, Clone)]
enum FlightError {
    Failed(String),
    Cancelled,
}

type Flight = Shared<BoxFuture<'static, Result<Arc<Vec<Article>>, FlightError>>>;

/// Persistent, TTL-governed store of feed articles keyed by feed URL.
///
/// Construct once at startup and share behind an `Arc` with everything
/// that requests feeds.
pub struct FeedCache {
    path: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    entries: Arc<RwLock<EntryMap>>,
    in_flight: Arc<Mutex<HashMap<String, Flight>>>,
    shutdown: watch::Sender<bool>,
}

impl FeedCache {
    /// Create an empty cache bound to `path`. Performs no I/O.
    pub fn new(path: impl Into<PathBuf>, fetcher: Arc<dyn Fetcher>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            path: path.into(),
            fetcher,
            entries: Arc::new(RwLock::new(EntryMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            shutdown,
        }
    }

    /// The file this cache loads from and saves to by default.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the in-memory content with the file at the bound path.
    ///
    /// Fails with [`Error::NotFound`] when no file exists yet and with
    /// [`Error::Decode`] when it is malformed. On failure nothing changes.
    pub async fn load(&self) -> Result<(), Error> {
        let loaded = store::read(&self.path).await?;
        let count = loaded.len();

        *self.entries.write().await = loaded;

        tracing::info!(path = %self.path.display(), entries = count, "loaded feed cache");
        Ok(())
    }

    /// Persist every entry to the bound path.
    pub async fn save(&self) -> Result<(), Error> {
        self.save_to(&self.path).await
    }

    /// Persist every entry to `path`, or to the bound path when `path` is empty.
    ///
    /// The document is encoded under the read lock; if encoding fails the
    /// file on disk is not touched.
    pub async fn save_to(&self, path: &Path) -> Result<(), Error> {
        let path = if path.as_os_str().is_empty() { self.path.as_path() } else { path };

        let (document, count) = {
            let entries = self.entries.read().await;
            (store::encode(&entries)?, entries.len())
        };

        store::write_private(path, document.as_bytes()).await?;

        tracing::info!(path = %path.display(), entries = count, "saved feed cache");
        Ok(())
    }

    /// Articles for `url`, from memory when fresh, from the fetcher otherwise.
    ///
    /// On fetch failure the previous entry, stale or not, stays in place and
    /// [`Error::Fetch`] is returned.
    pub async fn get_articles(&self, url: &str) -> Result<Vec<Article>, Error> {
        if let Some(articles) = self.fresh_articles(url).await {
            tracing::debug!("cache hit for {}", url);
            return Ok(articles);
        }

        let flight = {
            let mut in_flight = self.in_flight.lock().await;

            // A flight may have committed between the lookup above and the lock.
            if let Some(articles) = self.fresh_articles(url).await {
                tracing::debug!("cache hit for {} after concurrent refresh", url);
                return Ok(articles);
            }

            match in_flight.get(url) {
                Some(flight) => {
                    tracing::debug!("joining in-flight fetch for {}", url);
                    flight.clone()
                }
                None if self.is_cancelled() => {
                    tracing::debug!("cache miss for {} after cancel", url);
                    return Err(Error::Cancelled(url.to_string()));
                }
                None => {
                    tracing::debug!("cache miss for {}", url);
                    let flight = self.start_flight(url);
                    in_flight.insert(url.to_string(), flight.clone());
                    flight
                }
            }
        };

        match flight.await {
            Ok(articles) => Ok(articles.as_ref().clone()),
            Err(FlightError::Failed(reason)) => Err(Error::Fetch { url: url.to_string(), reason }),
            Err(FlightError::Cancelled) => Err(Error::Cancelled(url.to_string())),
        }
    }

    /// Abandon every in-flight fetch, now and in the future.
    ///
    /// Waiters receive [`Error::Cancelled`] and no entry is written. Intended
    /// for application shutdown; a cancelled cache still serves fresh hits.
    pub fn cancel(&self) {
        self.shutdown.send_replace(true);
    }

    /// True once [`FeedCache::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Number of stored entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// True when no entry is stored, stale or fresh.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// A copy of the entry stored for `url`, if any.
    pub async fn entry(&self, url: &str) -> Option<CacheEntry> {
        self.entries.read().await.get(url).cloned()
    }

    /// Every stored URL, sorted.
    pub async fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.entries.read().await.keys().cloned().collect();
        urls.sort();
        urls
    }

    async fn fresh_articles(&self, url: &str) -> Option<Vec<Article>> {
        let now = Utc::now();
        let entries = self.entries.read().await;
        entries
            .get(url)
            .filter(|entry| entry.is_fresh_at(now))
            .map(|entry| entry.articles.clone())
    }

    /// Spawn the fetch for `url` and wrap its handle so waiters can share it.
    ///
    /// The task commits on success, then removes itself from the in-flight
    /// table whatever the outcome.
    fn start_flight(&self, url: &str) -> Flight {
        let url = url.to_string();
        let fetcher = Arc::clone(&self.fetcher);
        let entries = Arc::clone(&self.entries);
        let in_flight = Arc::clone(&self.in_flight);
        let mut shutdown = self.shutdown.subscribe();

        let task = tokio::spawn(async move {
            let fetched = tokio::select! {
                biased;
                _ = cancelled(&mut shutdown) => None,
                result = fetcher.fetch(&url) => Some(result),
            };

            let outcome = match fetched {
                None => {
                    tracing::warn!("fetch for {} cancelled", url);
                    Err(FlightError::Cancelled)
                }
                Some(Ok(articles)) => {
                    let mut entries = entries.write().await;
                    if *shutdown.borrow() {
                        tracing::warn!("fetch for {} finished after cancel, discarding", url);
                        Err(FlightError::Cancelled)
                    } else {
                        let entry = CacheEntry::fetched(url.clone(), articles, Utc::now());
                        let articles = Arc::new(entry.articles.clone());
                        tracing::debug!("stored {} articles for {} until {}", articles.len(), url, entry.expire_at);
                        entries.insert(url.clone(), entry);
                        Ok(articles)
                    }
                }
                Some(Err(e)) => {
                    tracing::warn!("fetch for {} failed: {}", url, e);
                    Err(FlightError::Failed(e.to_string()))
                }
            };

            in_flight.lock().await.remove(&url);
            outcome
        });

        async move {
            match task.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_cancelled() => Err(FlightError::Cancelled),
                Err(e) => Err(FlightError::Failed(format!("fetch task failed: {e}"))),
            }
        }
        .boxed()
        .shared()
    }
}

/// Resolves once shutdown is requested or the cache is dropped.
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|cancelled| *cancelled).await;
}

impl std::fmt::Debug for FeedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedCache").field("path", &self.path).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::DEFAULT_CACHE_DURATION;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Barrier;

    const FIXTURE: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/data/cache.json");
    const PRIMORDIAL: &str = "https://primordialsoup.info/feed";
    const EXAMPLE: &str = "https://example.com/feed";

    /// Returns one article per call and counts calls.
    #[derive(Default)]
    struct CountingFetcher {
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Fetcher for CountingFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<Article>, Error> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            Ok(vec![Article::new(format!("fetch #{n}"), format!("{url}/post-{n}"))])
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<Article>, Error> {
            Err(Error::HttpError("status 503".to_string()))
        }
    }

    /// Never completes.
    struct HangingFetcher;

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<Article>, Error> {
            std::future::pending().await
        }
    }

    /// Only completes once every participant is fetching at the same time.
    struct BarrierFetcher {
        barrier: Barrier,
    }

    #[async_trait]
    impl Fetcher for BarrierFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<Article>, Error> {
            self.barrier.wait().await;
            Ok(vec![Article::new("together", url)])
        }
    }

    async fn fixture_cache(fetcher: Arc<dyn Fetcher>) -> FeedCache {
        let cache = FeedCache::new(FIXTURE, fetcher);
        cache.load().await.unwrap();
        cache
    }

    async fn force_expired(cache: &FeedCache, url: &str) -> CacheEntry {
        let mut entries = cache.entries.write().await;
        let entry = entries.get_mut(url).unwrap();
        entry.expire_at = Utc::now() - chrono::Duration::from_std(DEFAULT_CACHE_DURATION).unwrap() * 2;
        entry.clone()
    }

    #[tokio::test]
    async fn test_new_is_empty() {
        let cache = FeedCache::new("/nonexistent/cache.json", Arc::new(FailingFetcher));
        assert!(cache.is_empty().await);
        assert_eq!(cache.path(), Path::new("/nonexistent/cache.json"));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = FeedCache::new(dir.path().join("no-file"), Arc::new(FailingFetcher));

        let err = cache.load().await.unwrap_err();
        assert!(err.is_not_found());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_load_fixture() {
        let cache = fixture_cache(Arc::new(FailingFetcher)).await;
        assert_eq!(cache.len().await, 1);
        assert!(cache.entry(PRIMORDIAL).await.is_some());
    }

    #[tokio::test]
    async fn test_load_malformed_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = FeedCache::new(&path, fetcher);
        cache.get_articles(EXAMPLE).await.unwrap();

        std::fs::write(&path, "{\"https://example.com/feed\": {\"url\": ").unwrap();

        let err = cache.load().await.unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
        assert_eq!(cache.len().await, 1);
        assert!(cache.entry(EXAMPLE).await.is_some());
    }

    #[tokio::test]
    async fn test_hit_and_miss() {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = fixture_cache(fetcher.clone()).await;
        let stored = cache.entry(PRIMORDIAL).await.unwrap();

        let articles = cache.get_articles(PRIMORDIAL).await.unwrap();
        assert_eq!(articles, stored.articles);
        assert_eq!(cache.len().await, 1);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.entry(PRIMORDIAL).await.unwrap(), stored);

        let before = Utc::now();
        let articles = cache.get_articles(EXAMPLE).await.unwrap();
        let after = Utc::now();

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 2);
        let entry = cache.entry(EXAMPLE).await.unwrap();
        assert_eq!(entry.url, EXAMPLE);
        assert_eq!(entry.articles, articles);

        let ttl = chrono::Duration::from_std(DEFAULT_CACHE_DURATION).unwrap();
        assert!(entry.expire_at >= before + ttl);
        assert!(entry.expire_at <= after + ttl);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refreshed() {
        let fetcher = Arc::new(CountingFetcher::default());
        let cache = fixture_cache(fetcher.clone()).await;

        let old = force_expired(&cache, PRIMORDIAL).await;
        let articles = cache.get_articles(PRIMORDIAL).await.unwrap();

        let new = cache.entry(PRIMORDIAL).await.unwrap();
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(new.expire_at > old.expire_at);
        assert_eq!(new.articles, articles);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_stale_entry() {
        let cache = fixture_cache(Arc::new(FailingFetcher)).await;
        let old = force_expired(&cache, PRIMORDIAL).await;

        let err = cache.get_articles(PRIMORDIAL).await.unwrap_err();
        match err {
            Error::Fetch { url, reason } => {
                assert_eq!(url, PRIMORDIAL);
                assert!(reason.contains("status 503"));
            }
            other => panic!("expected fetch error, got {other:?}"),
        }
        assert_eq!(cache.entry(PRIMORDIAL).await.unwrap(), old);

        let err = cache.get_articles(EXAMPLE).await.unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_retry_after_failure_fetches_again() {
        let cache = FeedCache::new("unused.json", Arc::new(FailingFetcher));
        assert!(cache.get_articles(EXAMPLE).await.is_err());
        assert!(cache.get_articles(EXAMPLE).await.is_err());
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_same_url_coalesces() {
        let fetcher = Arc::new(CountingFetcher { calls: AtomicUsize::new(0), delay: Some(Duration::from_millis(50)) });
        let cache = Arc::new(FeedCache::new("unused.json", fetcher.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move { cache.get_articles(EXAMPLE).await }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }

        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(cache.len().await, 1);
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_different_urls_run_in_parallel() {
        let fetcher = Arc::new(BarrierFetcher { barrier: Barrier::new(2) });
        let cache = Arc::new(FeedCache::new("unused.json", fetcher));

        let first = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_articles(PRIMORDIAL).await })
        };
        let second = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_articles(EXAMPLE).await })
        };

        let joined = tokio::time::timeout(Duration::from_secs(5), async { (first.await, second.await) })
            .await
            .expect("fetches for different urls must not serialize");

        assert!(joined.0.unwrap().is_ok());
        assert!(joined.1.unwrap().is_ok());
        assert_eq!(cache.len().await, 2);
    }

    #[tokio::test]
    async fn test_cancel_abandons_fetch() {
        let cache = Arc::new(FeedCache::new("unused.json", Arc::new(HangingFetcher)));

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move { cache.get_articles(EXAMPLE).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        cache.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), waiter).await.unwrap().unwrap();
        assert!(matches!(result, Err(Error::Cancelled(url)) if url == EXAMPLE));
        assert!(cache.is_cancelled());
        assert!(cache.is_empty().await);
        assert!(cache.in_flight.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_discards_instant_fetch() {
        for _ in 0..100 {
            let fetcher = Arc::new(CountingFetcher::default());
            let cache = FeedCache::new("unused.json", fetcher.clone());
            cache.cancel();

            assert!(matches!(cache.get_articles(EXAMPLE).await, Err(Error::Cancelled(_))));
            assert!(cache.is_empty().await);
            assert_eq!(fetcher.calls.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_racing_instant_fetch_commits_nothing() {
        for _ in 0..100 {
            let cache = Arc::new(FeedCache::new("unused.json", Arc::new(CountingFetcher::default())));
            let waiter = {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get_articles(EXAMPLE).await })
            };
            cache.cancel();

            match waiter.await.unwrap() {
                Ok(_) => assert!(cache.entry(EXAMPLE).await.is_some()),
                Err(e) => {
                    assert!(matches!(e, Error::Cancelled(_)));
                    assert!(cache.is_empty().await);
                }
            }
            let late = cache.get_articles("https://late.example.com/feed").await;
            assert!(matches!(late, Err(Error::Cancelled(_))));
        }
    }

    #[tokio::test]
    async fn test_cancelled_cache_still_serves_hits() {
        let cache = fixture_cache(Arc::new(HangingFetcher)).await;
        cache.cancel();

        assert!(cache.get_articles(PRIMORDIAL).await.is_ok());
        assert!(matches!(cache.get_articles(EXAMPLE).await, Err(Error::Cancelled(_))));
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache").join("cache.json");
        let fetcher = Arc::new(CountingFetcher::default());

        let cache = FeedCache::new(&path, fetcher.clone());
        cache.get_articles(EXAMPLE).await.unwrap();
        cache.get_articles(PRIMORDIAL).await.unwrap();
        cache.save().await.unwrap();

        let reloaded = FeedCache::new(&path, fetcher);
        reloaded.load().await.unwrap();
        assert_eq!(reloaded.urls().await, cache.urls().await);
        assert_eq!(reloaded.entry(EXAMPLE).await, cache.entry(EXAMPLE).await);
    }

    #[tokio::test]
    async fn test_save_to_empty_path_uses_bound_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let cache = FeedCache::new(&path, Arc::new(CountingFetcher::default()));

        cache.save_to(Path::new("")).await.unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[tokio::test]
    async fn test_save_to_other_path() {
        let dir = tempfile::tempdir().unwrap();
        let cache = fixture_cache(Arc::new(FailingFetcher)).await;
        let other = dir.path().join("copy.json");

        cache.save_to(&other).await.unwrap();

        let copy = FeedCache::new(&other, Arc::new(FailingFetcher));
        copy.load().await.unwrap();
        assert_eq!(copy.entry(PRIMORDIAL).await, cache.entry(PRIMORDIAL).await);
    }
}
