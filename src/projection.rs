//! Player projection: one decoded save file into one [`PlayerRecord`].
//!
//! The untyped tree is first decoded into [`SaveData`], where every field
//! the mod always writes is required and everything else is explicitly
//! optional. Assembly then works on typed values only.
//!
//! Save layout read here:
//!
//! ```text
//! UUIDMost, UUIDLeast              # optional; falls back to the file name
//! Inventory[{ id, Count, Slot }]
//! ForgeCaps
//!   mineminenomi:entity_stats      # race, subRace, faction, fightingStyle,
//!                                  # doriki, belly, bounty, loyalty
//!   mineminenomi:haki_data         # busoshokuHardeningHakiExp,
//!                                  # busoshokuImbuingHakiExp, kenbunshokuHakiExp
//!   mineminenomi:devil_fruit       # devilFruit, hasYamiPower
//!   mineminenomi:ability_data      # unlockedAbilities[{ name }]
//! ```

use std::collections::BTreeMap;

use jiff::{SignedDuration, Timestamp};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::identity::{Identity, IdentityError, IdentityResolver};
use crate::model::{
    DevilFruit, Faction, FightingStyle, InventoryItem, PlayerRecord, QuarantineEntry, Race,
    SubRace, haki_limit,
};
use crate::nbt::{self, NbtError, Tree};
use crate::remote::CachedFile;

const CAPS: &str = "ForgeCaps";
const ENTITY_STATS: &str = "mineminenomi:entity_stats";
const HAKI_DATA: &str = "mineminenomi:haki_data";
const DEVIL_FRUIT: &str = "mineminenomi:devil_fruit";
const ABILITY_DATA: &str = "mineminenomi:ability_data";

/// Ability that marks conqueror's haki.
const CONQUEROR_ABILITY: &str = "mineminenomi:haoshoku_haki";

/// The darkness fruit, appended when `hasYamiPower` is set.
const YAMI_YAMI: &str = "yami_yami";

const FRUIT_NAMESPACE: &str = "mineminenomi:";
const FRUIT_SUFFIX: &str = "_no_mi";

#[derive(Debug, thiserror::Error)]
pub enum ProjectionError {
    #[error("undecodable save: {0}")]
    Decode(#[from] NbtError),

    #[error("missing or invalid field {0}")]
    MissingField(String),

    #[error("identity lookup failed: {0}")]
    Identity(#[from] IdentityError),
}

pub type Result<T> = core::result::Result<T, ProjectionError>;

/// Everything projection reads besides the save itself.
pub struct ProjectionContext<'a> {
    pub catalog: &'a Catalog,
    /// Players who recently logged out holding fruits.
    pub quarantine: &'a [QuarantineEntry],
    pub quarantine_window: SignedDuration,
    pub inactive_after: SignedDuration,
    pub now: Timestamp,
}

impl ProjectionContext<'_> {
    fn is_quarantined(&self, uuid: Uuid) -> bool {
        self.quarantine
            .iter()
            .any(|e| e.uuid == uuid && e.is_active(self.now, self.quarantine_window))
    }
}

// ── Typed save ──

#[derive(Debug, Clone, PartialEq)]
pub struct EntityStats {
    pub race: Option<Race>,
    pub sub_race: Option<SubRace>,
    pub faction: Option<Faction>,
    pub fighting_style: Option<FightingStyle>,
    pub doriki: i64,
    pub belly: i64,
    pub bounty: i64,
    pub loyalty: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HakiData {
    pub hardening: f64,
    pub imbuing: f64,
    pub observation: f64,
}

/// The parts of a player save the mirror uses, validated once.
#[derive(Debug, Clone, PartialEq)]
pub struct SaveData {
    pub uuid: Option<Uuid>,
    pub stats: EntityStats,
    pub haki: HakiData,
    /// Qualified name of the eaten fruit, if any.
    pub devil_fruit: Option<String>,
    pub has_yami_power: bool,
    pub unlocked_abilities: Vec<String>,
    pub inventory: Vec<InventoryItem>,
}

impl SaveData {
    /// `Ok(None)` when the save has no mod data yet.
    pub fn from_tree(tree: &Tree) -> Result<Option<Self>> {
        let Some(caps) = tree.get(CAPS) else {
            return Ok(None);
        };

        let entity = required(caps, &[ENTITY_STATS])?;
        let stats = EntityStats {
            race: optional_str(entity, "race").and_then(Race::from_key),
            sub_race: optional_str(entity, "subRace").and_then(SubRace::from_key),
            faction: optional_str(entity, "faction").and_then(Faction::from_key),
            fighting_style: optional_str(entity, "fightingStyle").and_then(FightingStyle::from_key),
            doriki: required_i64(entity, ENTITY_STATS, "doriki")?,
            belly: required_i64(entity, ENTITY_STATS, "belly")?,
            bounty: required_i64(entity, ENTITY_STATS, "bounty")?,
            loyalty: required_i64(entity, ENTITY_STATS, "loyalty")?,
        };

        let haki_node = required(caps, &[HAKI_DATA])?;
        let haki = HakiData {
            hardening: required_f64(haki_node, HAKI_DATA, "busoshokuHardeningHakiExp")?,
            imbuing: required_f64(haki_node, HAKI_DATA, "busoshokuImbuingHakiExp")?,
            observation: required_f64(haki_node, HAKI_DATA, "kenbunshokuHakiExp")?,
        };

        let fruit_node = required(caps, &[DEVIL_FRUIT])?;
        let devil_fruit = optional_str(fruit_node, "devilFruit")
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let has_yami_power = fruit_node
            .get("hasYamiPower")
            .and_then(Tree::as_bool)
            .unwrap_or(false);

        let abilities = required(caps, &[ABILITY_DATA])?;
        let unlocked_abilities = abilities
            .get("unlockedAbilities")
            .and_then(Tree::as_list)
            .unwrap_or_default()
            .iter()
            .filter_map(|a| a.get("name").and_then(Tree::as_str))
            .map(str::to_string)
            .collect();

        Ok(Some(Self {
            uuid: root_uuid(tree),
            stats,
            haki,
            devil_fruit,
            has_yami_power,
            unlocked_abilities,
            inventory: inventory(tree),
        }))
    }
}

fn required<'a>(node: &'a Tree, keys: &[&str]) -> Result<&'a Tree> {
    node.path(keys)
        .filter(|n| n.as_compound().is_some())
        .ok_or_else(|| ProjectionError::MissingField(format!("{CAPS}.{}", keys.join("."))))
}

/// Integer field. Floating tags are truncated toward zero; the mod has
/// written some counters as doubles.
#[allow(clippy::cast_possible_truncation)]
fn required_i64(node: &Tree, section: &str, key: &str) -> Result<i64> {
    node.get(key)
        .and_then(|n| match n {
            Tree::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            other => other.as_i64(),
        })
        .ok_or_else(|| ProjectionError::MissingField(format!("{CAPS}.{section}.{key}")))
}

fn required_f64(node: &Tree, section: &str, key: &str) -> Result<f64> {
    node.get(key)
        .and_then(Tree::as_f64)
        .ok_or_else(|| ProjectionError::MissingField(format!("{CAPS}.{section}.{key}")))
}

fn optional_str<'a>(node: &'a Tree, key: &str) -> Option<&'a str> {
    node.get(key).and_then(Tree::as_str)
}

fn root_uuid(tree: &Tree) -> Option<Uuid> {
    let most = tree.get("UUIDMost").and_then(Tree::as_i64)?;
    let least = tree.get("UUIDLeast").and_then(Tree::as_i64)?;
    Some(uuid_from_parts(most, least))
}

fn inventory(tree: &Tree) -> Vec<InventoryItem> {
    tree.get("Inventory")
        .and_then(Tree::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|item| {
            let id = item.get("id").and_then(Tree::as_str)?;
            Some(InventoryItem {
                id: id.to_string(),
                count: item.get("Count").and_then(Tree::as_i64).unwrap_or(1),
                slot: item.get("Slot").and_then(Tree::as_i64),
            })
        })
        .collect()
}

/// Rebuild a UUID from its two signed big-endian halves.
#[allow(clippy::cast_sign_loss)]
pub fn uuid_from_parts(most: i64, least: i64) -> Uuid {
    Uuid::from_u64_pair(most as u64, least as u64)
}

// ── Assembly ──

/// Decode, resolve, and assemble one player.
///
/// `Ok(None)` means the player has no mod data yet. Any error concerns
/// this player only.
pub async fn project(
    file: &CachedFile,
    stats: Option<&serde_json::Value>,
    ctx: &ProjectionContext<'_>,
    resolver: &IdentityResolver,
) -> Result<Option<PlayerRecord>> {
    let tree = nbt::parse(&file.bytes)?;
    let Some(save) = SaveData::from_tree(&tree)? else {
        return Ok(None);
    };

    let uuid = match save.uuid {
        Some(uuid) => uuid,
        None => file
            .stem()
            .parse::<Uuid>()
            .map_err(|_| ProjectionError::MissingField("UUIDMost/UUIDLeast".to_string()))?,
    };

    let identity = resolver.resolve(uuid).await?;
    Ok(Some(assemble(uuid, save, identity, stats, file.modified, ctx)))
}

/// Build the record from already validated parts.
pub fn assemble(
    uuid: Uuid,
    save: SaveData,
    identity: Identity,
    stats: Option<&serde_json::Value>,
    last_seen: Timestamp,
    ctx: &ProjectionContext<'_>,
) -> PlayerRecord {
    let (eaten_fruits, inventory_fruits) = if ctx.is_quarantined(uuid) {
        (Vec::new(), Vec::new())
    } else {
        (
            eaten_fruits(&save, ctx.catalog),
            inventory_fruits(&save.inventory, ctx.catalog),
        )
    };
    let devil_fruits = eaten_fruits
        .iter()
        .chain(&inventory_fruits)
        .cloned()
        .collect();

    let conqueror_haki = save
        .unlocked_abilities
        .iter()
        .any(|a| a == CONQUEROR_ABILITY);

    let HakiData {
        hardening,
        imbuing,
        observation,
    } = save.haki;

    PlayerRecord {
        uuid,
        name: identity.name,
        account_id: identity.account_id,
        race: save.stats.race,
        sub_race: save.stats.sub_race,
        faction: save.stats.faction,
        fighting_style: save.stats.fighting_style,
        belly: non_negative(save.stats.belly),
        bounty: non_negative(save.stats.bounty),
        loyalty: save.stats.loyalty,
        doriki: save.stats.doriki,
        hardening_haki: hardening,
        imbuing_haki: imbuing,
        observation_haki: observation,
        haki_limit: haki_limit(hardening, imbuing, observation),
        conqueror_haki,
        eaten_fruits,
        inventory_fruits,
        devil_fruits,
        last_seen,
        inactive: ctx.now.duration_since(last_seen) > ctx.inactive_after,
        inventory: save.inventory,
        mob_kills: stats.map(mob_kills).unwrap_or_default(),
    }
}

/// The eaten fruit, then the darkness fruit if its flag is set. Both may
/// be `yami_yami`; the duplicate is kept.
fn eaten_fruits(save: &SaveData, catalog: &Catalog) -> Vec<DevilFruit> {
    let mut fruits: Vec<DevilFruit> = save
        .devil_fruit
        .as_deref()
        .and_then(|q| catalog.by_qualified_name(q))
        .into_iter()
        .cloned()
        .collect();
    if save.has_yami_power
        && let Some(yami) = catalog.by_qualified_name(YAMI_YAMI)
    {
        fruits.push(yami.clone());
    }
    fruits
}

fn inventory_fruits(inventory: &[InventoryItem], catalog: &Catalog) -> Vec<DevilFruit> {
    inventory
        .iter()
        .filter_map(|item| {
            let name = item.id.strip_prefix(FRUIT_NAMESPACE)?;
            if !name.ends_with(FRUIT_SUFFIX) {
                return None;
            }
            catalog.by_name(name).cloned()
        })
        .collect()
}

/// Kill counters from a vanilla stats file: `stats["minecraft:killed"]`.
pub fn mob_kills(stats: &serde_json::Value) -> BTreeMap<String, u64> {
    stats
        .get("stats")
        .and_then(|s| s.get("minecraft:killed"))
        .and_then(serde_json::Value::as_object)
        .map(|killed| {
            killed
                .iter()
                .filter_map(|(mob, count)| Some((mob.clone(), count.as_u64()?)))
                .collect()
        })
        .unwrap_or_default()
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}
