//! Local persistence: player identities and crews.
//!
//! Everything lives in one `SQLite` file:
//!
//! ```text
//! ~/.mmnm/mirror.sqlite
//!   players   # uuid → name, linked account, last refresh
//!   crews     # crew name → captain, chat role
//! ```

mod crews;
mod players;

use std::fs;
use std::path::PathBuf;

use rusqlite::Connection;
use uuid::Uuid;

use crate::model::IdentityRecord;

pub use crews::StoredCrew;

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("player not found: {0}")]
    PlayerNotFound(Uuid),

    #[error("player already exists: {0}")]
    PlayerAlreadyExists(Uuid),

    #[error("crew not found: {0}")]
    CrewNotFound(String),

    #[error("corrupt data: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS players (
    uuid          TEXT PRIMARY KEY,
    name          TEXT NOT NULL,
    account_id    INTEGER,
    refreshed_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS players_name ON players (name COLLATE NOCASE);
CREATE INDEX IF NOT EXISTS players_account ON players (account_id);

CREATE TABLE IF NOT EXISTS crews (
    name          TEXT PRIMARY KEY,
    captain_uuid  TEXT,
    role_id       INTEGER
);
";

/// The four lookups the identity resolver needs.
pub trait IdentityStore: Send + Sync {
    fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<IdentityRecord>>;

    /// Case-insensitive; the most recently refreshed match wins.
    fn find_by_name(&self, name: &str) -> Result<Option<IdentityRecord>>;

    /// Fails with [`StorageError::PlayerAlreadyExists`] on a duplicate uuid.
    fn insert(&self, record: &IdentityRecord) -> Result<()>;

    /// Fails with [`StorageError::PlayerNotFound`] when the uuid is unknown.
    fn update(&self, record: &IdentityRecord) -> Result<()>;
}

/// `SQLite`-backed store. Opens a connection per operation.
pub struct Storage {
    path: PathBuf,
}

impl Storage {
    /// Opens (creating if needed) the database at `path` and ensures the schema.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let storage = Self { path };
        storage.open()?.execute_batch(SCHEMA)?;
        Ok(storage)
    }

    fn open(&self) -> Result<Connection> {
        Ok(Connection::open(&self.path)?)
    }
}

/// Chat ids (accounts, roles) are 64-bit unsigned; `SQLite` integers are signed.
fn id_to_sql(value: Option<u64>) -> Result<Option<i64>> {
    value
        .map(|id| {
            i64::try_from(id).map_err(|_| StorageError::Corrupt(format!("id out of range: {id}")))
        })
        .transpose()
}

fn id_from_sql(value: Option<i64>) -> Result<Option<u64>> {
    value
        .map(|id| {
            u64::try_from(id).map_err(|_| StorageError::Corrupt(format!("negative id: {id}")))
        })
        .transpose()
}

fn parse_uuid(raw: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .map_err(|e| StorageError::Corrupt(format!("invalid uuid {raw}: {e}")))
}
