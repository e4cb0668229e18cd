//! Remote file access: the server's save files, reached over FTP.
//!
//! [`RemoteStore`] is the seam between the ingestion pipeline and the
//! transport. [`FtpStore`] is the production implementation; [`FileCache`]
//! sits in front of any store and only downloads what changed.

mod cache;
mod ftp;

use async_trait::async_trait;
use jiff::Timestamp;

pub use cache::{BulkFetch, CachedFile, FileCache};
pub use ftp::FtpStore;

/// Errors from remote file operations.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote file not found: {0}")]
    NotFound(String),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("transfer of {path} failed: {message}")]
    Transfer { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, RemoteError>;

/// Metadata of a single remote file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    /// Full remote path, e.g. `world/playerdata/<uuid>.dat`.
    pub path: String,
    pub size: u64,
    pub modified: Timestamp,
    pub is_file: bool,
}

impl RemoteEntry {
    /// Last path component.
    pub fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// Read-only access to a remote file tree.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Metadata for one file. Fails with [`RemoteError::NotFound`] when absent.
    async fn stat(&self, path: &str) -> Result<RemoteEntry>;

    /// Immediate children of a directory.
    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>>;

    /// Whole-file download.
    async fn download(&self, path: &str) -> Result<Vec<u8>>;
}

/// Join a remote directory and a child name.
pub(crate) fn join(dir: &str, name: &str) -> String {
    let dir = dir.trim_end_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
pub(crate) mod fake {
    //! In-memory store with call counters.

    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Default)]
    pub struct FakeStore {
        files: Mutex<BTreeMap<String, (Vec<u8>, Timestamp)>>,
        broken: Mutex<BTreeSet<String>>,
        pub downloads: AtomicUsize,
    }

    impl FakeStore {
        pub fn put(&self, path: &str, bytes: Vec<u8>, modified: Timestamp) {
            self.files
                .lock()
                .unwrap()
                .insert(path.to_string(), (bytes, modified));
        }

        pub fn remove(&self, path: &str) {
            self.files.lock().unwrap().remove(path);
        }

        /// Downloads of `path` fail from now on.
        pub fn break_file(&self, path: &str) {
            self.broken.lock().unwrap().insert(path.to_string());
        }

        pub fn downloads(&self) -> usize {
            self.downloads.load(Ordering::SeqCst)
        }

        fn entry(path: &str, bytes: &[u8], modified: Timestamp) -> RemoteEntry {
            RemoteEntry {
                path: path.to_string(),
                size: bytes.len() as u64,
                modified,
                is_file: true,
            }
        }
    }

    #[async_trait]
    impl RemoteStore for FakeStore {
        async fn stat(&self, path: &str) -> Result<RemoteEntry> {
            let files = self.files.lock().unwrap();
            let (bytes, modified) = files
                .get(path)
                .ok_or_else(|| RemoteError::NotFound(path.to_string()))?;
            Ok(Self::entry(path, bytes, *modified))
        }

        async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
            let prefix = format!("{}/", dir.trim_end_matches('/'));
            let files = self.files.lock().unwrap();
            Ok(files
                .iter()
                .filter(|(path, _)| {
                    path.strip_prefix(&prefix)
                        .is_some_and(|rest| !rest.contains('/'))
                })
                .map(|(path, (bytes, modified))| Self::entry(path, bytes, *modified))
                .collect())
        }

        async fn download(&self, path: &str) -> Result<Vec<u8>> {
            self.downloads.fetch_add(1, Ordering::SeqCst);
            if self.broken.lock().unwrap().contains(path) {
                return Err(RemoteError::Transfer {
                    path: path.to_string(),
                    message: "connection reset".to_string(),
                });
            }
            let files = self.files.lock().unwrap();
            files
                .get(path)
                .map(|(bytes, _)| bytes.clone())
                .ok_or_else(|| RemoteError::NotFound(path.to_string()))
        }
    }
}
