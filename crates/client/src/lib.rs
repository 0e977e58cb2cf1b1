//! Client code for tabfeed.
//!
//! This crate provides the network side of the feed cache: the HTTP fetch
//! pipeline and RSS/Atom parsing behind the `tabfeed_core::Fetcher` seam.

pub mod fetch;
pub mod parse;

pub use fetch::{FeedClient, FetchConfig, UrlError, canonicalize};
pub use parse::{html_to_text, parse_feed};
