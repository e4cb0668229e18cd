//! Core data model for the mirror.
//!
//! These types are what the ingestion pipeline produces and what the views
//! consume: catalog fruits, player records, identities, and the world-level
//! snapshot (bounties, crews, fruit quarantine).

mod fruit;
mod identity;
mod player;
mod world;

pub use fruit::{DevilFruit, Rarity};
pub use identity::IdentityRecord;
pub use player::{Faction, FightingStyle, InventoryItem, PlayerRecord, Race, SubRace, haki_limit};
pub use world::{Bounty, Crew, CrewMember, LogFile, QuarantineEntry, WorldSnapshot};
