//! World-level state: the mod's shared save data and server logs.

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::nbt::Tree;

/// A bounty issued on a player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bounty {
    pub uuid: Uuid,
    pub name: String,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrewMember {
    pub username: String,
    pub is_captain: bool,
    pub uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Crew {
    pub name: String,
    pub members: Vec<CrewMember>,

    /// Flag design, kept undecoded.
    pub jolly_roger: Tree,
}

impl Crew {
    /// The first member flagged as captain.
    pub fn captain(&self) -> Option<&CrewMember> {
        self.members.iter().find(|m| m.is_captain)
    }
}

/// A player who logged out while holding devil fruits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarantineEntry {
    pub uuid: Uuid,
    pub logged_out_at: Timestamp,
    /// Qualified names of the fruits held at logout.
    pub fruits: Vec<String>,
}

impl QuarantineEntry {
    /// Whether the entry still suppresses fruit accounting at `now`.
    pub fn is_active(&self, now: Timestamp, window: SignedDuration) -> bool {
        now.duration_since(self.logged_out_at) <= window
    }
}

/// What was derived from one read of `mineminenomi.dat`.
#[derive(Debug, Clone)]
pub struct WorldSnapshot {
    /// Sorted by amount, highest first.
    pub bounties: Vec<Bounty>,
    pub crews: Vec<Crew>,
    pub quarantine: Vec<QuarantineEntry>,

    pub read_at: Timestamp,
}

impl WorldSnapshot {
    /// Whether `uuid` is inside the quarantine window at `now`.
    pub fn is_quarantined(&self, uuid: Uuid, now: Timestamp, window: SignedDuration) -> bool {
        self.quarantine
            .iter()
            .any(|e| e.uuid == uuid && e.is_active(now, window))
    }
}

/// One server log file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogFile {
    /// Rotation index from the file name, `0` for `latest.log`.
    pub index: u32,
    pub name: String,
    /// Date part of the file name, empty for `latest.log`.
    pub date: String,
    pub lines: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGOUT: i64 = 1_750_000_000;

    fn entry() -> QuarantineEntry {
        QuarantineEntry {
            uuid: Uuid::from_u64_pair(0, 7),
            logged_out_at: Timestamp::from_second(LOGOUT).unwrap(),
            fruits: vec!["mera_mera".into()],
        }
    }

    fn after(seconds: i64) -> Timestamp {
        Timestamp::from_second(LOGOUT + seconds).unwrap()
    }

    #[test]
    fn quarantine_window_is_inclusive() {
        let window = SignedDuration::from_hours(72);
        let entry = entry();

        assert!(entry.is_active(after(72 * 3600), window));
        assert!(!entry.is_active(after(72 * 3600 + 1), window));
    }

    #[test]
    fn snapshot_checks_uuid_and_window() {
        let window = SignedDuration::from_hours(72);
        let snapshot = WorldSnapshot {
            bounties: vec![],
            crews: vec![],
            quarantine: vec![entry()],
            read_at: after(0),
        };

        assert!(snapshot.is_quarantined(Uuid::from_u64_pair(0, 7), after(3600), window));
        assert!(!snapshot.is_quarantined(Uuid::from_u64_pair(0, 8), after(3600), window));
        assert!(!snapshot.is_quarantined(Uuid::from_u64_pair(0, 7), after(73 * 3600), window));
    }
}
