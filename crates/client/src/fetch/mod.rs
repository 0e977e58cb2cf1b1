//! HTTP fetch pipeline for feeds.
//!
//! ### URL Canonicalization
//! - Trim whitespace, unwrap `feed:`, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Request timeout: 20s (configurable)

pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, canonicalize};

use crate::parse::parse_feed;
use tabfeed_core::{AppConfig, Article, Error, Fetcher};

const FEED_ACCEPT: &str = "application/rss+xml, application/atom+xml, application/xml;q=0.9, text/xml;q=0.9, */*;q=0.8";

/// Configuration for the feed client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "tabfeed/<version>")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            max_redirects: 5,
        }
    }
}

/// Fetches feeds over HTTP and parses them into articles.
pub struct FeedClient {
    http: Client,
    config: FetchConfig,
}

impl FeedClient {
    /// Create a new feed client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Download the raw feed document, enforcing status and size limits.
    ///
    /// Returns the body together with the URL it was finally served from.
    pub async fn fetch_bytes(&self, url_str: &str) -> Result<(::url::Url, Bytes), Error> {
        let start = Instant::now();
        let url = canonicalize(url_str).map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let response = self
            .http
            .get(url.as_str())
            .header(header::ACCEPT, FEED_ACCEPT)
            .send()
            .await
            .map_err(|e| Error::HttpError(format!("network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {}", e)))?;

        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            "fetched {} -> {} in {}ms ({} bytes)",
            url,
            final_url,
            start.elapsed().as_millis(),
            bytes.len()
        );

        Ok((final_url, bytes))
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }
}

#[async_trait]
impl Fetcher for FeedClient {
    async fn fetch(&self, url: &str) -> Result<Vec<Article>, Error> {
        let (final_url, bytes) = self.fetch_bytes(url).await?;
        let articles = parse_feed(&bytes, &final_url)?;
        tracing::debug!("parsed {} articles from {}", articles.len(), final_url);
        Ok(articles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    const RSS: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>Test</title>
<item><title>First</title><link>/first</link></item>
</channel></rss>"#;

    /// Serve exactly one HTTP response on a local port and return its base URL.
    async fn serve_once(status: &'static str, body: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/rss+xml\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        });

        format!("http://{addr}")
    }

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert!(config.user_agent.starts_with("tabfeed/"));
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, Duration::from_millis(20000));
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { user_agent: "custom/1.0".into(), timeout_ms: 1500, ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.user_agent, "custom/1.0");
        assert_eq!(config.timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn test_fetch_parses_feed() {
        let base = serve_once("200 OK", RSS.to_string()).await;
        let client = FeedClient::new(FetchConfig::default()).unwrap();

        let articles = client.fetch(&format!("{base}/feed.xml")).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].title, "First");
        assert_eq!(articles[0].link, format!("{base}/first"));
    }

    #[tokio::test]
    async fn test_fetch_http_error() {
        let base = serve_once("404 Not Found", String::new()).await;
        let client = FeedClient::new(FetchConfig::default()).unwrap();

        let err = client.fetch(&format!("{base}/missing.xml")).await.unwrap_err();
        assert!(matches!(err, Error::HttpError(msg) if msg.contains("404")));
    }

    #[tokio::test]
    async fn test_fetch_too_large() {
        let base = serve_once("200 OK", RSS.to_string()).await;
        let config = FetchConfig { max_bytes: 16, ..Default::default() };
        let client = FeedClient::new(config).unwrap();

        let err = client.fetch(&format!("{base}/feed.xml")).await.unwrap_err();
        assert!(matches!(err, Error::FetchTooLarge(_)));
    }

    #[tokio::test]
    async fn test_fetch_invalid_url() {
        let client = FeedClient::new(FetchConfig::default()).unwrap();
        let err = client.fetch("ftp://example.com/feed").await.unwrap_err();
        assert!(matches!(err, Error::InvalidUrl(_)));
    }
}
