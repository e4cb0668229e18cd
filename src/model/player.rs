//! Player records: one immutable snapshot per player per ingestion pass.

use std::collections::BTreeMap;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fruit::DevilFruit;

/// Generates a closed enumeration keyed by the mod's string identifiers.
///
/// `from_key` returns `None` for empty or unknown keys: an unset
/// classification is a valid state, not an error.
macro_rules! keyed_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $key:literal, $label:literal;)+ }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            pub fn from_key(key: &str) -> Option<Self> {
                match key {
                    $($key => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn as_str(self) -> &'static str {
                match self {
                    $(Self::$variant => $key,)+
                }
            }

            pub fn label(self) -> &'static str {
                match self {
                    $(Self::$variant => $label,)+
                }
            }
        }
    };
}

keyed_enum! {
    Race {
        Human => "human", "Human";
        Cyborg => "cyborg", "Cyborg";
        Mink => "mink", "Mink";
        Fishman => "fishman", "Fishman";
    }
}

keyed_enum! {
    SubRace {
        MinkBunny => "mink_bunny", "Bunny";
        MinkDog => "mink_dog", "Dog";
        MinkLion => "mink_lion", "Lion";
    }
}

keyed_enum! {
    Faction {
        Pirate => "pirate", "Pirate";
        Marine => "marine", "Marine";
        Revolutionary => "revolutionary", "Revolutionary";
        BountyHunter => "bounty_hunter", "Bounty Hunter";
    }
}

keyed_enum! {
    FightingStyle {
        Brawler => "brawler", "Brawler";
        Swordsman => "swordsman", "Swordsman";
        BlackLeg => "black_leg", "Black Leg";
        Sniper => "sniper", "Sniper";
        Doctor => "doctor", "Doctor";
        ArtOfWeather => "art_of_weather", "Art of Weather";
    }
}

/// One stack in a player's inventory, as saved by the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    /// Namespaced item id, e.g. `mineminenomi:mera_mera_no_mi`.
    pub id: String,
    pub count: i64,
    pub slot: Option<i64>,
}

/// Everything known about a player after one ingestion pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerRecord {
    // ── Identity ──
    pub uuid: Uuid,
    pub name: String,
    pub account_id: Option<u64>,

    // ── Classification ──
    pub race: Option<Race>,
    pub sub_race: Option<SubRace>,
    pub faction: Option<Faction>,
    pub fighting_style: Option<FightingStyle>,

    // ── Progression ──
    pub belly: u64,
    pub bounty: u64,
    pub loyalty: i64,
    pub doriki: i64,

    // ── Haki ──
    pub hardening_haki: f64,
    pub imbuing_haki: f64,
    pub observation_haki: f64,
    pub haki_limit: f64,
    pub conqueror_haki: bool,

    // ── Devil fruits ──
    /// Eaten fruits. The darkness fruit may appear twice.
    pub eaten_fruits: Vec<DevilFruit>,
    /// Unconsumed fruits held in the inventory.
    pub inventory_fruits: Vec<DevilFruit>,
    /// Eaten followed by inventory fruits.
    pub devil_fruits: Vec<DevilFruit>,

    // ── Activity ──
    pub last_seen: Timestamp,
    pub inactive: bool,

    // ── Auxiliary ──
    pub inventory: Vec<InventoryItem>,
    /// Kill counters keyed by namespaced mob id.
    pub mob_kills: BTreeMap<String, u64>,
}

impl PlayerRecord {
    pub fn total_mob_kills(&self) -> u64 {
        self.mob_kills.values().sum()
    }
}

/// Haki ceiling: `2200 + 32 × (hardening + imbuing + observation)`,
/// rounded to one decimal place.
pub fn haki_limit(hardening: f64, imbuing: f64, observation: f64) -> f64 {
    let raw = 2200.0 + 32.0 * (hardening + imbuing + observation);
    (raw * 10.0).round() / 10.0
}
