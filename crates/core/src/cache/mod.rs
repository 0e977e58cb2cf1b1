//! TTL-governed feed content cache.
//!
//! This module sits between the application and the network. For every
//! requested feed URL it decides whether to serve previously fetched
//! articles or to fetch fresh ones. It provides:
//!
//! - An in-memory map from feed URL to [`CacheEntry`], guarded by a lock
//! - A JSON store codec with private, atomically replaced files
//! - Lazy expiry: stale entries are replaced on next access, never swept
//! - Coalescing of concurrent misses on the same URL into one fetch

pub mod entry;
pub mod feed_cache;
pub mod fetcher;
pub mod store;

pub use crate::Error;

pub use entry::{CacheEntry, DEFAULT_CACHE_DURATION};
pub use feed_cache::FeedCache;
pub use fetcher::Fetcher;

/// Get the default location of the cache file.
pub fn default_cache_path() -> std::path::PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("tabfeed")
        .join("cache.json")
}
