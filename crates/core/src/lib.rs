//! Core types and shared functionality for tabfeed.
//!
//! This crate provides:
//! - The feed content cache (TTL-governed, persisted as JSON)
//! - The `Fetcher` seam the cache pulls articles through
//! - Unified error types
//! - Configuration structures and the colorscheme file

pub mod article;
pub mod cache;
pub mod colorscheme;
pub mod config;
pub mod error;

pub use article::Article;
pub use cache::{CacheEntry, DEFAULT_CACHE_DURATION, FeedCache, Fetcher};
pub use colorscheme::{ColorField, Colorscheme};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
