//! Subcommand implementations.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tabfeed_client::{FeedClient, FetchConfig, canonicalize};
use tabfeed_core::colorscheme::default_pywal_path;
use tabfeed_core::{AppConfig, Article, CacheEntry, Colorscheme, Error, FeedCache};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Refresh the given feeds and print their articles.
pub async fn read(config: &AppConfig, urls: &[String], limit: Option<usize>) -> Result<()> {
    let cache = Arc::new(open_cache(config)?);
    load_cache(&cache).await;

    let mut feeds = Vec::with_capacity(urls.len());
    for raw in urls {
        match canonicalize(raw) {
            Ok(url) => feeds.push(url.to_string()),
            Err(e) => tracing::warn!("skipping {:?}: {}", raw, e),
        }
    }

    let interrupt = tokio::spawn(cancel_on_interrupt(cache.clone()));
    let results = refresh_all(&cache, &feeds, config.max_concurrency).await;
    interrupt.abort();

    let mut out = std::io::stdout().lock();
    let mut failed = 0usize;
    for (url, result) in feeds.iter().zip(results) {
        match result {
            Ok(articles) => write_feed(&mut out, url, &articles, limit)?,
            Err(e) => {
                failed += 1;
                writeln!(out, "{url}\n  error: {e}\n")?;
            }
        }
    }
    drop(out);

    cache.save().await.context("failed to save the feed cache")?;

    if failed > 0 {
        tracing::warn!("{} of {} feeds failed", failed, feeds.len());
    }
    Ok(())
}

/// List what the cache currently holds.
pub async fn list_cache(config: &AppConfig) -> Result<()> {
    let cache = open_cache(config)?;
    load_cache(&cache).await;

    let mut out = std::io::stdout().lock();
    if cache.is_empty().await {
        writeln!(out, "cache at {} is empty", cache.path().display())?;
        return Ok(());
    }

    let now = Utc::now();
    for url in cache.urls().await {
        if let Some(entry) = cache.entry(&url).await {
            writeln!(out, "{}", status_line(&entry, now))?;
        }
    }
    Ok(())
}

/// Print the configured colorscheme, falling back to the built-in palette.
pub async fn colors(config: &AppConfig) -> Result<()> {
    let scheme = Colorscheme::load_or_default(&config.colorscheme_path).await;
    let mut out = std::io::stdout().lock();
    write_colors(&mut out, &scheme)?;
    Ok(())
}

/// Import a pywal export and save it as the colorscheme.
pub async fn convert_colors(config: &AppConfig, wal: Option<&Path>, output: Option<&Path>) -> Result<()> {
    let wal = wal.map(Path::to_path_buf).unwrap_or_else(default_pywal_path);
    let output = output.unwrap_or(config.colorscheme_path.as_path());

    let scheme = Colorscheme::from_pywal(&wal)
        .await
        .with_context(|| format!("failed to convert {}", wal.display()))?;
    scheme.save(output).await?;

    println!("wrote colorscheme to {}", output.display());
    Ok(())
}

fn open_cache(config: &AppConfig) -> Result<FeedCache> {
    let client = FeedClient::new(FetchConfig::from(config))?;
    Ok(FeedCache::new(&config.cache_path, Arc::new(client)))
}

/// Load the cache file. A missing file is the normal first run; an unreadable
/// one is reported and the session starts empty.
async fn load_cache(cache: &FeedCache) {
    match cache.load().await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => tracing::debug!("no cache file at {}", cache.path().display()),
        Err(e) => tracing::warn!("ignoring cache file: {}", e),
    }
}

async fn cancel_on_interrupt(cache: Arc<FeedCache>) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::warn!("interrupted, cancelling in-flight fetches");
        cache.cancel();
    }
}

/// Request every feed with at most `max_concurrency` requests at a time.
///
/// Results come back in the order of `urls`.
pub async fn refresh_all(
    cache: &Arc<FeedCache>, urls: &[String], max_concurrency: usize,
) -> Vec<Result<Vec<Article>, Error>> {
    let semaphore = Arc::new(Semaphore::new(max_concurrency.max(1)));
    let mut join_set = JoinSet::new();

    for (index, url) in urls.iter().cloned().enumerate() {
        let cache = cache.clone();
        let semaphore = semaphore.clone();
        join_set.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok();
            (index, cache.get_articles(&url).await)
        });
    }

    let mut slots: Vec<Option<Result<Vec<Article>, Error>>> = urls.iter().map(|_| None).collect();
    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok((index, result)) => slots[index] = Some(result),
            Err(e) => tracing::error!("feed task failed: {}", e),
        }
    }

    slots
        .into_iter()
        .zip(urls)
        .map(|(slot, url)| {
            slot.unwrap_or_else(|| Err(Error::Fetch { url: url.clone(), reason: "task did not complete".into() }))
        })
        .collect()
}

fn write_feed(out: &mut impl Write, url: &str, articles: &[Article], limit: Option<usize>) -> std::io::Result<()> {
    writeln!(out, "{url} ({} articles)", articles.len())?;
    for article in articles.iter().take(limit.unwrap_or(usize::MAX)) {
        let date = article
            .published
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "----------".to_string());
        writeln!(out, "  {date}  {}", article.title)?;
        if !article.link.is_empty() {
            writeln!(out, "              {}", article.link)?;
        }
    }
    writeln!(out)
}

fn status_line(entry: &CacheEntry, now: DateTime<Utc>) -> String {
    let state = if entry.is_fresh_at(now) { "fresh" } else { "stale" };
    format!(
        "{state}  {:>4} articles  expires {}  {}",
        entry.articles.len(),
        entry.expire_at.format("%Y-%m-%d %H:%M:%S"),
        entry.url
    )
}

fn write_colors(out: &mut impl Write, scheme: &Colorscheme) -> std::io::Result<()> {
    for (name, value) in scheme.fields() {
        writeln!(out, "{name:<10} {value}")?;
    }
    Ok(())
}
