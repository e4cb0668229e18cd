//! Identity storage: the `players` table.

use rusqlite::{Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::model::IdentityRecord;

use super::{
    IdentityStore, Result, Storage, StorageError, id_from_sql, id_to_sql, parse_uuid,
};

const COLUMNS: &str = "uuid, name, account_id, refreshed_at";

impl IdentityStore for Storage {
    fn find_by_uuid(&self, uuid: Uuid) -> Result<Option<IdentityRecord>> {
        let conn = self.open()?;
        query_one(
            &conn,
            &format!("SELECT {COLUMNS} FROM players WHERE uuid = ?1"),
            &uuid.to_string(),
        )
    }

    fn find_by_name(&self, name: &str) -> Result<Option<IdentityRecord>> {
        let conn = self.open()?;
        query_one(
            &conn,
            &format!(
                "SELECT {COLUMNS} FROM players WHERE name = ?1 COLLATE NOCASE
                 ORDER BY refreshed_at DESC LIMIT 1"
            ),
            name,
        )
    }

    fn insert(&self, record: &IdentityRecord) -> Result<()> {
        let conn = self.open()?;
        let result = conn.execute(
            "INSERT INTO players (uuid, name, account_id, refreshed_at) VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                record.uuid.to_string(),
                &record.name,
                id_to_sql(record.account_id)?,
                record.refreshed_at.to_string(),
            ],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::PlayerAlreadyExists(record.uuid))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn update(&self, record: &IdentityRecord) -> Result<()> {
        let conn = self.open()?;
        let rows = conn.execute(
            "UPDATE players SET name = ?1, account_id = ?2, refreshed_at = ?3 WHERE uuid = ?4",
            rusqlite::params![
                &record.name,
                id_to_sql(record.account_id)?,
                record.refreshed_at.to_string(),
                record.uuid.to_string(),
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::PlayerNotFound(record.uuid));
        }
        Ok(())
    }
}

impl Storage {
    /// Every stored identity, sorted by name.
    pub fn list_identities(&self) -> Result<Vec<IdentityRecord>> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM players ORDER BY name COLLATE NOCASE"
        ))?;
        let rows = stmt.query_map([], raw_row)?;
        let mut records = Vec::new();
        for row in rows {
            records.push(into_record(row?)?);
        }
        Ok(records)
    }
}

type RawRow = (String, String, Option<i64>, String);

fn raw_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn query_one(conn: &Connection, sql: &str, param: &str) -> Result<Option<IdentityRecord>> {
    conn.query_row(sql, [param], raw_row)
        .optional()?
        .map(into_record)
        .transpose()
}

fn into_record((uuid, name, account_id, refreshed_at): RawRow) -> Result<IdentityRecord> {
    let refreshed_at = refreshed_at
        .parse::<jiff::Timestamp>()
        .map_err(|e| StorageError::Corrupt(format!("invalid refreshed_at: {e}")))?;
    Ok(IdentityRecord {
        uuid: parse_uuid(&uuid)?,
        name,
        account_id: id_from_sql(account_id)?,
        refreshed_at,
    })
}
