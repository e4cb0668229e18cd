//! Devil fruit descriptors, as listed in the catalog.

use serde::{Deserialize, Serialize};

/// The box a fruit spawns in. Declaration order is display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    GoldenBox,
    IronBox,
    WoodenBox,
}

impl Rarity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GoldenBox => "golden_box",
            Self::IronBox => "iron_box",
            Self::WoodenBox => "wooden_box",
        }
    }
}

/// A single catalog entry. Identity is the qualified name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevilFruit {
    /// The key the mod stores for an eaten fruit, e.g. `mera_mera`.
    pub qualified_name: String,

    /// The item name without namespace, e.g. `mera_mera_no_mi`.
    pub name: String,

    /// Display name, e.g. `Mera Mera no Mi`.
    pub format_name: String,

    pub rarity: Rarity,
}

impl PartialEq for DevilFruit {
    fn eq(&self, other: &Self) -> bool {
        self.qualified_name == other.qualified_name
    }
}

impl Eq for DevilFruit {}

impl std::hash::Hash for DevilFruit {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.qualified_name.hash(state);
    }
}
