//! Derived views over published data.
//!
//! Each view subscribes to the event bus and keeps an `Arc` to the last
//! data it received, replaced whole on every event. Queries never block
//! ingestion for longer than it takes to clone that `Arc`.

pub mod bounties;
pub mod circulation;
pub mod crews;
pub mod factions;
pub mod logs;
pub mod players;

use std::sync::{Arc, PoisonError, RwLock};

pub use bounties::BountyBoard;
pub use circulation::{Circulation, FruitOwner};
pub use crews::{CrewDiff, CrewRegistry};
pub use factions::{FactionRoles, RoleChange};
pub use logs::PlayerLogs;
pub use players::{PlayerDirectory, Stat};

/// A snapshot slot shared between the publisher and readers.
struct Latest<T: ?Sized>(RwLock<Arc<T>>);

impl<T: ?Sized> Latest<T> {
    fn new(value: Arc<T>) -> Self {
        Self(RwLock::new(value))
    }

    fn get(&self) -> Arc<T> {
        Arc::clone(&self.0.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn set(&self, value: Arc<T>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = value;
    }
}

impl<T> Latest<[T]> {
    fn empty() -> Self {
        Self::new(Arc::from(Vec::new()))
    }
}

/// Case-insensitive prefix match used by every name lookup.
fn starts_with_ignore_case(name: &str, prefix: &str) -> bool {
    name.to_lowercase().starts_with(&prefix.to_lowercase())
}

#[cfg(test)]
pub(crate) mod fixtures {
    //! Player records for view tests.

    use std::collections::BTreeMap;

    use jiff::Timestamp;
    use uuid::Uuid;

    use crate::model::{DevilFruit, PlayerRecord, Rarity};

    pub fn fruit(qualified: &str, rarity: Rarity) -> DevilFruit {
        let words: Vec<String> = qualified
            .split('_')
            .map(|w| {
                let mut chars = w.chars();
                chars
                    .next()
                    .map(|c| c.to_uppercase().chain(chars).collect())
                    .unwrap_or_default()
            })
            .collect();
        let format_name = format!("{} no Mi", words.join(" "));
        DevilFruit {
            qualified_name: qualified.to_string(),
            name: format!("{qualified}_no_mi"),
            format_name,
            rarity,
        }
    }

    pub fn player(n: u64, name: &str) -> PlayerRecord {
        PlayerRecord {
            uuid: Uuid::from_u64_pair(0, n),
            name: name.to_string(),
            account_id: None,
            race: None,
            sub_race: None,
            faction: None,
            fighting_style: None,
            belly: 0,
            bounty: 0,
            loyalty: 0,
            doriki: 0,
            hardening_haki: 0.0,
            imbuing_haki: 0.0,
            observation_haki: 0.0,
            haki_limit: 2200.0,
            conqueror_haki: false,
            eaten_fruits: Vec::new(),
            inventory_fruits: Vec::new(),
            devil_fruits: Vec::new(),
            last_seen: Timestamp::UNIX_EPOCH,
            inactive: false,
            inventory: Vec::new(),
            mob_kills: BTreeMap::new(),
        }
    }

    /// Give `player` eaten and inventory fruits, keeping the union in sync.
    pub fn with_fruits(
        mut player: PlayerRecord,
        eaten: &[DevilFruit],
        inventory: &[DevilFruit],
    ) -> PlayerRecord {
        player.eaten_fruits = eaten.to_vec();
        player.inventory_fruits = inventory.to_vec();
        player.devil_fruits = eaten.iter().chain(inventory).cloned().collect();
        player
    }
}
