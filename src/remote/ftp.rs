//! FTP-backed [`RemoteStore`].
//!
//! `suppaftp`'s synchronous client runs on the blocking pool. One logged-in
//! connection is reused across calls; it is dropped after any transport
//! failure and re-established on the next call.

use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use jiff::Timestamp;
use suppaftp::list::File;
use suppaftp::types::FileType;
use suppaftp::{FtpError, FtpStream, Status};

use crate::config::FtpConfig;

use super::{RemoteEntry, RemoteError, RemoteStore, Result, join};

pub struct FtpStore {
    inner: Arc<Inner>,
}

struct Inner {
    config: FtpConfig,
    conn: Mutex<Option<FtpStream>>,
}

impl FtpStore {
    /// Creates a store. No connection is made until the first call.
    pub fn new(config: FtpConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                conn: Mutex::new(None),
            }),
        }
    }

    /// Run `op` against the shared connection on the blocking pool.
    async fn with_conn<T, F>(&self, path: &str, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut FtpStream) -> core::result::Result<T, FtpError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let path = path.to_string();
        tokio::task::spawn_blocking(move || inner.run(&path, op))
            .await
            .map_err(|e| RemoteError::Connection(format!("FTP worker failed: {e}")))?
    }
}

impl Inner {
    fn run<T>(
        &self,
        path: &str,
        op: impl FnOnce(&mut FtpStream) -> core::result::Result<T, FtpError>,
    ) -> Result<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| RemoteError::Connection("FTP connection lock poisoned".to_string()))?;

        let mut stream = match guard.take() {
            Some(stream) => stream,
            None => self.connect()?,
        };

        match op(&mut stream) {
            Ok(value) => {
                *guard = Some(stream);
                Ok(value)
            }
            Err(e) if is_not_found(&e) => {
                // The server answered; the connection is still good.
                *guard = Some(stream);
                Err(RemoteError::NotFound(path.to_string()))
            }
            Err(e) => {
                tracing::debug!(path, error = %e, "Dropping FTP connection after failure");
                Err(RemoteError::Transfer {
                    path: path.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }

    fn connect(&self) -> Result<FtpStream> {
        let FtpConfig {
            host,
            port,
            username,
            password,
        } = &self.config;

        let mut stream = FtpStream::connect((host.as_str(), *port))
            .map_err(|e| RemoteError::Connection(format!("{host}:{port}: {e}")))?;
        stream
            .login(username, password)
            .map_err(|e| RemoteError::Connection(format!("login as {username} failed: {e}")))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| RemoteError::Connection(format!("binary mode refused: {e}")))?;

        tracing::debug!(host = %host, port, "FTP connection established");
        Ok(stream)
    }
}

fn is_not_found(error: &FtpError) -> bool {
    matches!(error, FtpError::UnexpectedResponse(resp) if resp.status == Status::FileUnavailable)
}

#[async_trait]
impl RemoteStore for FtpStore {
    async fn stat(&self, path: &str) -> Result<RemoteEntry> {
        let remote = path.to_string();
        let (size, modified) = self
            .with_conn(path, move |ftp| {
                let size = ftp.size(&remote)?;
                let modified = ftp.mdtm(&remote)?;
                Ok((size, modified.and_utc().timestamp()))
            })
            .await?;

        let modified = Timestamp::from_second(modified).map_err(|e| RemoteError::Transfer {
            path: path.to_string(),
            message: format!("bad modification time: {e}"),
        })?;

        Ok(RemoteEntry {
            path: path.to_string(),
            size: size as u64,
            modified,
            is_file: true,
        })
    }

    async fn list(&self, dir: &str) -> Result<Vec<RemoteEntry>> {
        let remote = dir.to_string();
        let lines = self
            .with_conn(dir, move |ftp| ftp.list(Some(&remote)))
            .await?;

        let mut entries = Vec::with_capacity(lines.len());
        for line in &lines {
            let file = match File::from_str(line) {
                Ok(file) => file,
                Err(e) => {
                    tracing::debug!(dir, line = %line, error = %e, "Skipping unparsable listing line");
                    continue;
                }
            };
            let Ok(modified) = Timestamp::try_from(file.modified()) else {
                continue;
            };
            entries.push(RemoteEntry {
                path: join(dir, file.name()),
                size: file.size() as u64,
                modified,
                is_file: file.is_file(),
            });
        }
        Ok(entries)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let remote = path.to_string();
        let buffer = self
            .with_conn(path, move |ftp| ftp.retr_as_buffer(&remote))
            .await?;
        Ok(buffer.into_inner())
    }
}
