//! Article records as produced by a [`Fetcher`](crate::Fetcher).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single item of a feed.
///
/// The cache treats articles as immutable values: it stores and returns
/// whatever the fetcher produced, in the order it produced them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub title: String,
    pub link: String,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Article {
    /// Create an article with only a title and link.
    pub fn new(title: impl Into<String>, link: impl Into<String>) -> Self {
        Self { title: title.into(), link: link.into(), published: None, summary: None }
    }
}
