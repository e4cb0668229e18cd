//! Local cache of remote files.
//!
//! Each remote path maps to one file under the cache root:
//!
//! ```text
//! <root>/world/playerdata/<uuid>.dat
//! <root>/world/stats/<uuid>.json
//! ```
//!
//! A cached copy is replaced only when the remote one is newer or has a
//! different size. Replacement writes `<name>.part` and renames it over the
//! old copy, so an abandoned download never clobbers a complete file. The
//! cached file's mtime is set to the remote mtime. Nothing is ever evicted.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use jiff::Timestamp;

use super::{RemoteEntry, RemoteStore, Result};

/// A remote file's bytes, whether freshly downloaded or served from cache.
#[derive(Debug, Clone)]
pub struct CachedFile {
    pub remote_path: String,
    pub bytes: Vec<u8>,
    /// Remote modification time.
    pub modified: Timestamp,
}

impl CachedFile {
    /// File name without extension.
    pub fn stem(&self) -> &str {
        let name = self.remote_path.rsplit('/').next().unwrap_or(&self.remote_path);
        name.split_once('.').map_or(name, |(stem, _)| stem)
    }
}

/// Result of fetching a whole directory.
#[derive(Debug, Default)]
pub struct BulkFetch {
    pub files: Vec<CachedFile>,
    /// Remote paths that were listed but could not be fetched.
    pub failed: Vec<String>,
}

pub struct FileCache {
    store: Arc<dyn RemoteStore>,
    root: PathBuf,
}

impl FileCache {
    pub fn new(store: Arc<dyn RemoteStore>, root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            root: root.into(),
        }
    }

    /// Fetch one remote file, downloading only if the cached copy is stale.
    pub async fn fetch(&self, remote_path: &str) -> Result<CachedFile> {
        let entry = self.store.stat(remote_path).await?;
        self.fetch_entry(&entry).await
    }

    /// Fetch every file in `dir` whose name ends in `.{extension}`.
    ///
    /// Per-file failures are logged and collected, never fatal.
    pub async fn fetch_all(&self, dir: &str, extension: &str) -> Result<BulkFetch> {
        let suffix = format!(".{extension}");
        let entries = self.store.list(dir).await?;

        let mut bulk = BulkFetch::default();
        for entry in entries
            .iter()
            .filter(|e| e.is_file && e.name().ends_with(&suffix))
        {
            match self.fetch_entry(entry).await {
                Ok(file) => bulk.files.push(file),
                Err(e) => {
                    tracing::warn!(path = %entry.path, error = %e, "Skipping remote file");
                    bulk.failed.push(entry.path.clone());
                }
            }
        }
        Ok(bulk)
    }

    /// Where `remote_path` is cached. Empty, `.` and `..` components are dropped.
    pub fn local_path(&self, remote_path: &str) -> PathBuf {
        let mut path = self.root.clone();
        for part in remote_path.split('/') {
            if !matches!(part, "" | "." | "..") {
                path.push(part);
            }
        }
        path
    }

    async fn fetch_entry(&self, entry: &RemoteEntry) -> Result<CachedFile> {
        let local = self.local_path(&entry.path);

        if let Some(bytes) = read_if_fresh(&local, entry).await? {
            tracing::trace!(path = %entry.path, "Cache hit");
            return Ok(CachedFile {
                remote_path: entry.path.clone(),
                bytes,
                modified: entry.modified,
            });
        }

        let bytes = self.store.download(&entry.path).await?;
        store_local(&local, &bytes, entry.modified).await?;
        tracing::debug!(path = %entry.path, size = bytes.len(), "Downloaded remote file");

        Ok(CachedFile {
            remote_path: entry.path.clone(),
            bytes,
            modified: entry.modified,
        })
    }
}

/// The cached bytes, if a cached copy exists and is not older or differently sized.
async fn read_if_fresh(local: &Path, entry: &RemoteEntry) -> Result<Option<Vec<u8>>> {
    let metadata = match tokio::fs::metadata(local).await {
        Ok(m) => m,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let Some(local_modified) = metadata
        .modified()
        .ok()
        .and_then(|t| Timestamp::try_from(t).ok())
    else {
        return Ok(None);
    };

    if entry.modified > local_modified || entry.size != metadata.len() {
        return Ok(None);
    }

    Ok(Some(tokio::fs::read(local).await?))
}

/// Write-then-rename so readers never see a partial file.
async fn store_local(local: &Path, bytes: &[u8], modified: Timestamp) -> Result<()> {
    if let Some(parent) = local.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut part_name = local.file_name().unwrap_or_default().to_os_string();
    part_name.push(".part");
    let part = local.with_file_name(part_name);

    tokio::fs::write(&part, bytes).await?;
    set_modified(&part, modified)?;
    tokio::fs::rename(&part, local).await?;
    Ok(())
}

fn set_modified(path: &Path, modified: Timestamp) -> io::Result<()> {
    let file = fs::OpenOptions::new().write(true).open(path)?;
    file.set_modified(SystemTime::from(modified))
}
