//! On-disk store codec.
//!
//! The cache is persisted as one pretty-printed JSON object keyed by feed
//! URL. Keys are written in sorted order so successive snapshots diff
//! cleanly:
//!
//! ```json
//! {
//!   "https://example.com/feed": {
//!     "url": "https://example.com/feed",
//!     "articles": [{ "title": "...", "link": "...", "published": null, "summary": null }],
//!     "expire_at": "2026-10-16T12:00:00.123456789Z"
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;

use super::entry::CacheEntry;
use crate::Error;

/// The in-memory shape of a decoded cache document.
pub type EntryMap = HashMap<String, CacheEntry>;

/// Serialize the entry map.
pub fn encode(entries: &EntryMap) -> Result<String, Error> {
    let ordered: BTreeMap<&str, &CacheEntry> = entries.iter().map(|(url, entry)| (url.as_str(), entry)).collect();
    Ok(serde_json::to_string_pretty(&ordered)?)
}

/// Deserialize a cache document read from `path`.
///
/// Rejects malformed or truncated JSON and any entry whose `url` is empty
/// or differs from the key it is stored under. Never returns a partial map.
pub fn decode(path: &Path, bytes: &[u8]) -> Result<EntryMap, Error> {
    let entries: EntryMap = serde_json::from_slice(bytes).map_err(|e| Error::decode(path, e))?;

    for (key, entry) in &entries {
        if entry.url.is_empty() {
            return Err(Error::decode(path, format!("entry under key {key:?} has an empty url")));
        }
        if entry.url != *key {
            return Err(Error::decode(path, format!("entry url {:?} does not match its key {key:?}", entry.url)));
        }
    }

    Ok(entries)
}

/// Read and decode the cache document at `path`.
pub async fn read(path: &Path) -> Result<EntryMap, Error> {
    let bytes = read_bytes(path).await?;
    decode(path, &bytes)
}

/// Read a whole file, mapping a missing file to [`Error::NotFound`].
///
/// Content is not checked here; invalid UTF-8 surfaces as a decode error.
pub(crate) async fn read_bytes(path: &Path) -> Result<Vec<u8>, Error> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(bytes),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(Error::NotFound(path.to_path_buf())),
        Err(e) => Err(Error::io(path, e)),
    }
}

/// Write `contents` to `path`, readable only by the owning user.
///
/// Missing parent directories are created. The data goes to a temporary
/// sibling first and is renamed into place, so a failed write leaves any
/// previous file intact. Every call uses its own temporary file, so
/// overlapping writes to one path both succeed and the last rename wins.
pub async fn write_private(path: &Path, contents: &[u8]) -> Result<(), Error> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await.map_err(|e| Error::io(parent, e))?;
    }

    let tmp = temp_sibling(path);
    if let Err(e) = write_new(&tmp, contents).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e);
    }

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(Error::io(path, e));
    }

    Ok(())
}

async fn write_new(path: &Path, contents: &[u8]) -> Result<(), Error> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await.map_err(|e| Error::io(path, e))?;
    file.write_all(contents).await.map_err(|e| Error::io(path, e))?;
    file.sync_all().await.map_err(|e| Error::io(path, e))?;
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    static NEXT: AtomicU64 = AtomicU64::new(0);

    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_else(|| "cache".into());
    name.push(format!(".{}.{}.tmp", std::process::id(), NEXT.fetch_add(1, Ordering::Relaxed)));
    path.with_file_name(name)
}
