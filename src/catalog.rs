//! The devil fruit catalog.
//!
//! Loaded once at startup, either from the bundled `resources/fruits.json`
//! or from a path in the config, and shared read-only afterwards. The file
//! groups fruits by rarity:
//!
//! ```text
//! { "golden_box": [ { "mera_mera": { "name": "mera_mera_no_mi", "format_name": "Mera Mera no Mi" } } ], ... }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::model::{DevilFruit, Rarity};

/// The catalog shipped with the binary.
const BUNDLED: &str = include_str!("../resources/fruits.json");

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid catalog: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown rarity tier: {0}")]
    UnknownRarity(String),

    #[error("duplicate fruit: {0}")]
    Duplicate(String),
}

#[derive(Deserialize)]
struct FruitFields {
    name: String,
    format_name: String,
}

/// Immutable set of known fruits with lookups by qualified and short name.
#[derive(Debug)]
pub struct Catalog {
    fruits: Vec<DevilFruit>,
    by_qualified: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl Catalog {
    /// The catalog bundled into the binary.
    pub fn bundled() -> Result<Self, CatalogError> {
        Self::from_json(BUNDLED)
    }

    /// Load a catalog file from disk.
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let contents = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let tiers: BTreeMap<String, Vec<BTreeMap<String, FruitFields>>> =
            serde_json::from_str(json)?;

        let mut fruits = Vec::new();
        for (tier, groups) in tiers {
            let rarity = parse_rarity(&tier)?;
            for group in groups {
                for (qualified_name, fields) in group {
                    fruits.push(DevilFruit {
                        qualified_name,
                        name: fields.name,
                        format_name: fields.format_name,
                        rarity,
                    });
                }
            }
        }
        Self::new(fruits)
    }

    pub fn new(fruits: Vec<DevilFruit>) -> Result<Self, CatalogError> {
        let mut by_qualified = HashMap::with_capacity(fruits.len());
        let mut by_name = HashMap::with_capacity(fruits.len());
        for (i, fruit) in fruits.iter().enumerate() {
            if by_qualified.insert(fruit.qualified_name.clone(), i).is_some() {
                return Err(CatalogError::Duplicate(fruit.qualified_name.clone()));
            }
            by_name.insert(fruit.name.clone(), i);
        }
        Ok(Self {
            fruits,
            by_qualified,
            by_name,
        })
    }

    /// Look up a fruit by the key the mod stores for eaten fruits.
    pub fn by_qualified_name(&self, qualified_name: &str) -> Option<&DevilFruit> {
        self.by_qualified.get(qualified_name).map(|&i| &self.fruits[i])
    }

    /// Look up a fruit by its item name without namespace.
    pub fn by_name(&self, name: &str) -> Option<&DevilFruit> {
        self.by_name.get(name).map(|&i| &self.fruits[i])
    }

    /// Every fruit, in rarity order then display name.
    pub fn sorted(&self) -> Vec<&DevilFruit> {
        let mut fruits: Vec<&DevilFruit> = self.fruits.iter().collect();
        fruits.sort_by(|a, b| {
            a.rarity
                .cmp(&b.rarity)
                .then_with(|| a.format_name.cmp(&b.format_name))
        });
        fruits
    }

    pub fn of_rarity(&self, rarity: Rarity) -> impl Iterator<Item = &DevilFruit> {
        self.fruits.iter().filter(move |f| f.rarity == rarity)
    }

    /// Fruits whose display name starts with `prefix`, case-insensitively.
    pub fn search(&self, prefix: &str, limit: usize) -> Vec<&DevilFruit> {
        let prefix = prefix.to_lowercase();
        let mut matches: Vec<&DevilFruit> = self
            .fruits
            .iter()
            .filter(|f| f.format_name.to_lowercase().starts_with(&prefix))
            .collect();
        matches.sort_by(|a, b| a.format_name.cmp(&b.format_name));
        matches.truncate(limit);
        matches
    }

    pub fn len(&self) -> usize {
        self.fruits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fruits.is_empty()
    }
}

fn parse_rarity(tier: &str) -> Result<Rarity, CatalogError> {
    match tier {
        "golden_box" => Ok(Rarity::GoldenBox),
        "iron_box" => Ok(Rarity::IronBox),
        "wooden_box" => Ok(Rarity::WoodenBox),
        other => Err(CatalogError::UnknownRarity(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"{
        "golden_box": [
            { "yami_yami": { "name": "yami_yami_no_mi", "format_name": "Yami Yami no Mi" } },
            { "gura_gura": { "name": "gura_gura_no_mi", "format_name": "Gura Gura no Mi" } }
        ],
        "wooden_box": [
            { "bane_bane": { "name": "bane_bane_no_mi", "format_name": "Bane Bane no Mi" } }
        ]
    }"#;

    #[test]
    fn groups_fruits_by_rarity() {
        let catalog = Catalog::from_json(SMALL).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.of_rarity(Rarity::GoldenBox).count(), 2);
        assert_eq!(catalog.of_rarity(Rarity::IronBox).count(), 0);
        assert_eq!(
            catalog.by_qualified_name("bane_bane").map(|f| f.rarity),
            Some(Rarity::WoodenBox)
        );
    }

    #[test]
    fn looks_up_by_short_name() {
        let catalog = Catalog::from_json(SMALL).unwrap();

        let fruit = catalog.by_name("gura_gura_no_mi").unwrap();
        assert_eq!(fruit.qualified_name, "gura_gura");
        assert!(catalog.by_name("gura_gura").is_none());
    }

    #[test]
    fn sorted_orders_by_rarity_then_name() {
        let catalog = Catalog::from_json(SMALL).unwrap();
        let names: Vec<&str> = catalog
            .sorted()
            .iter()
            .map(|f| f.format_name.as_str())
            .collect();

        assert_eq!(names, ["Gura Gura no Mi", "Yami Yami no Mi", "Bane Bane no Mi"]);
    }

    #[test]
    fn search_is_case_insensitive_prefix() {
        let catalog = Catalog::from_json(SMALL).unwrap();
        let hits = catalog.search("ya", 25);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].qualified_name, "yami_yami");
    }

    #[test]
    fn rejects_unknown_rarity() {
        let err = Catalog::from_json(r#"{ "diamond_box": [] }"#).unwrap_err();
        assert!(matches!(err, CatalogError::UnknownRarity(_)));
    }

    #[test]
    fn rejects_duplicates() {
        let json = r#"{
            "golden_box": [ { "yami_yami": { "name": "a_no_mi", "format_name": "A" } } ],
            "iron_box": [ { "yami_yami": { "name": "b_no_mi", "format_name": "B" } } ]
        }"#;
        let err = Catalog::from_json(json).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate(_)));
    }

    #[test]
    fn bundled_catalog_loads_and_has_darkness_fruit() {
        let catalog = Catalog::bundled().unwrap();

        assert!(!catalog.is_empty());
        assert!(catalog.by_qualified_name("yami_yami").is_some());
        assert!(catalog.by_name("mera_mera_no_mi").is_some());
    }
}
