//! Unified error types for tabfeed.
//!
//! Every variant renders with a stable upper-case code prefix so that log
//! lines and CLI output can be grepped by failure class.

use std::path::PathBuf;

/// Unified error types for the tabfeed libraries.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Backing file does not exist. A normal first-run condition.
    #[error("CACHE_NOT_FOUND: {}", .0.display())]
    NotFound(PathBuf),

    /// Persisted data could not be decoded.
    #[error("DECODE_FAILED: {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    /// In-memory state could not be serialized.
    #[error("ENCODE_FAILED: {0}")]
    Encode(#[from] serde_json::Error),

    /// Reading or writing a file failed.
    #[error("IO_ERROR: {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fetching a feed failed. The cache is left untouched.
    #[error("FETCH_FAILED: {url}: {reason}")]
    Fetch { url: String, reason: String },

    /// The fetch was abandoned before it completed.
    #[error("FETCH_CANCELLED: {0}")]
    Cancelled(String),

    /// Invalid feed URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// HTTP error response or transport failure.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// The response body is not a recognizable RSS or Atom document.
    #[error("FEED_PARSE_FAILED: {0}")]
    FeedParse(String),
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub(crate) fn decode(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Decode { path: path.into(), reason: reason.to_string() }
    }

    /// True when the error only means "no file has been written yet".
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Fetch { url: "https://example.com/feed".to_string(), reason: "status 503".to_string() };
        assert!(err.to_string().contains("FETCH_FAILED"));
        assert!(err.to_string().contains("https://example.com/feed"));
        assert!(err.to_string().contains("status 503"));
    }

    #[test]
    fn test_not_found_display_includes_path() {
        let err = Error::NotFound(PathBuf::from("/tmp/tabfeed/cache.json"));
        assert!(err.is_not_found());
        assert!(err.to_string().starts_with("CACHE_NOT_FOUND"));
        assert!(err.to_string().contains("/tmp/tabfeed/cache.json"));
    }

    #[test]
    fn test_decode_is_not_not_found() {
        let err = Error::decode("cache.json", "expected value at line 1 column 1");
        assert!(!err.is_not_found());
        assert!(err.to_string().contains("DECODE_FAILED"));
    }
}
