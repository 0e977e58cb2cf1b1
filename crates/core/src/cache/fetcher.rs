//! The capability the cache pulls fresh articles through.

use async_trait::async_trait;

use crate::{Article, Error};

/// Turns a feed URL into an ordered sequence of articles.
///
/// Implementations must be safe to call concurrently for different URLs.
/// Any error is treated uniformly by the cache as a fetch failure.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<Article>, Error>;
}

