//! Crew storage: the `crews` table.
//!
//! Holds the crews seen in the last world read so that a later read can
//! tell which crews were founded or disbanded in between.

use uuid::Uuid;

use super::{Result, Storage, StorageError, id_from_sql, id_to_sql, parse_uuid};

/// A crew as last persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredCrew {
    pub name: String,
    pub captain_uuid: Option<Uuid>,
    /// Chat role created for the crew, if any.
    pub role_id: Option<u64>,
}

impl Storage {
    /// Every stored crew, sorted by name.
    pub fn list_crews(&self) -> Result<Vec<StoredCrew>> {
        let conn = self.open()?;
        let mut stmt =
            conn.prepare("SELECT name, captain_uuid, role_id FROM crews ORDER BY name")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        let mut crews = Vec::new();
        for row in rows {
            let (name, captain, role_id) = row?;
            crews.push(StoredCrew {
                name,
                captain_uuid: captain.as_deref().map(parse_uuid).transpose()?,
                role_id: id_from_sql(role_id)?,
            });
        }
        Ok(crews)
    }

    pub fn find_crew(&self, name: &str) -> Result<Option<StoredCrew>> {
        Ok(self.list_crews()?.into_iter().find(|c| c.name == name))
    }

    /// Insert a crew, or update its captain if it is already stored.
    /// An existing role id is kept.
    pub fn upsert_crew(&self, name: &str, captain_uuid: Option<Uuid>) -> Result<()> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO crews (name, captain_uuid) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET captain_uuid = excluded.captain_uuid",
            rusqlite::params![name, captain_uuid.map(|u| u.to_string())],
        )?;
        Ok(())
    }

    pub fn set_crew_role(&self, name: &str, role_id: Option<u64>) -> Result<()> {
        let conn = self.open()?;
        let rows = conn.execute(
            "UPDATE crews SET role_id = ?1 WHERE name = ?2",
            rusqlite::params![id_to_sql(role_id)?, name],
        )?;
        if rows == 0 {
            return Err(StorageError::CrewNotFound(name.to_string()));
        }
        Ok(())
    }

    /// Remove a crew. Returns the removed row, or `None` if it was not stored.
    pub fn delete_crew(&self, name: &str) -> Result<Option<StoredCrew>> {
        let Some(existing) = self.find_crew(name)? else {
            return Ok(None);
        };
        let conn = self.open()?;
        conn.execute("DELETE FROM crews WHERE name = ?1", [name])?;
        Ok(Some(existing))
    }
}
