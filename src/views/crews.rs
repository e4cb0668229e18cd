//! Crew registry: the current crews and what changed since the last read.
//!
//! On every world read the crew list is compared with the crews table in
//! the store. New crews are inserted, vanished ones deleted, and the diff
//! is kept for inspection.

use std::collections::HashSet;
use std::sync::Arc;

use crate::events::{Event, Subscriber};
use crate::model::Crew;
use crate::storage::{Storage, StorageError, StoredCrew};

use super::Latest;

/// Crews founded and disbanded between two world reads.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrewDiff {
    pub created: Vec<Crew>,
    pub deleted: Vec<StoredCrew>,
}

impl CrewDiff {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.deleted.is_empty()
    }
}

pub struct CrewRegistry {
    storage: Arc<Storage>,
    crews: Latest<[Crew]>,
    last_diff: Latest<CrewDiff>,
}

impl CrewRegistry {
    pub fn new(storage: Arc<Storage>) -> Self {
        Self {
            storage,
            crews: Latest::empty(),
            last_diff: Latest::new(Arc::new(CrewDiff::default())),
        }
    }

    /// Replace the crew list and persist the changes against the store.
    pub fn update(&self, crews: &[Crew]) -> Result<CrewDiff, StorageError> {
        let mut sorted = crews.to_vec();
        sorted.sort_by(|a, b| a.name.cmp(&b.name));

        let diff = self.sync(&sorted)?;
        for crew in &diff.created {
            tracing::info!(crew = %crew.name, members = crew.members.len(), "Crew created");
        }
        for crew in &diff.deleted {
            tracing::info!(crew = %crew.name, "Crew deleted");
        }

        self.crews.set(Arc::from(sorted));
        self.last_diff.set(Arc::new(diff.clone()));
        Ok(diff)
    }

    fn sync(&self, crews: &[Crew]) -> Result<CrewDiff, StorageError> {
        let stored = self.storage.list_crews()?;
        let stored_names: HashSet<&str> = stored.iter().map(|c| c.name.as_str()).collect();
        let current_names: HashSet<&str> = crews.iter().map(|c| c.name.as_str()).collect();

        let mut diff = CrewDiff::default();
        for crew in crews {
            if !stored_names.contains(crew.name.as_str()) {
                diff.created.push(crew.clone());
            }
            self.storage
                .upsert_crew(&crew.name, crew.captain().map(|m| m.uuid))?;
        }
        for crew in stored {
            if !current_names.contains(crew.name.as_str()) {
                self.storage.delete_crew(&crew.name)?;
                diff.deleted.push(crew);
            }
        }
        Ok(diff)
    }

    /// All crews, sorted by name.
    pub fn all(&self) -> Arc<[Crew]> {
        self.crews.get()
    }

    /// Crews whose name contains `query`, ignoring case.
    pub fn search(&self, query: &str, limit: usize) -> Vec<Crew> {
        let query = query.to_lowercase();
        self.all()
            .iter()
            .filter(|c| c.name.to_lowercase().contains(&query))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn last_diff(&self) -> Arc<CrewDiff> {
        self.last_diff.get()
    }
}

impl Subscriber for CrewRegistry {
    fn name(&self) -> &'static str {
        "crews"
    }

    /// Persists inline on the publishing task. A world read is published
    /// once per tick and touches one row per crew on a local file, and
    /// readers rely on the diff being stored once `publish` returns.
    fn handle(&self, event: &Event) {
        if let Event::WorldRead(world) = event
            && let Err(e) = self.update(&world.crews)
        {
            tracing::warn!(error = %e, "Failed to persist crews");
        }
    }
}
