//! Cache entry type and expiry policy.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::Article;

/// Time-to-live applied uniformly to every feed (one hour).
pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(60 * 60);

/// The cached record for one feed URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub url: String,
    pub articles: Vec<Article>,
    pub expire_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Build an entry for articles fetched at `fetched_at`.
    ///
    /// The expiry is always `fetched_at + DEFAULT_CACHE_DURATION`.
    pub fn fetched(url: impl Into<String>, articles: Vec<Article>, fetched_at: DateTime<Utc>) -> Self {
        Self { url: url.into(), articles, expire_at: fetched_at + ttl() }
    }

    /// An entry is fresh strictly before its expiry; at the boundary it is stale.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expire_at
    }

    pub fn is_expired(&self) -> bool {
        !self.is_fresh_at(Utc::now())
    }
}

fn ttl() -> chrono::Duration {
    chrono::Duration::from_std(DEFAULT_CACHE_DURATION).unwrap_or(chrono::Duration::hours(1))
}
