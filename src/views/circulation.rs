//! Devil fruit circulation: which fruits are still out there to be found.

use std::sync::Arc;

use uuid::Uuid;

use crate::catalog::Catalog;
use crate::events::{Event, Subscriber};
use crate::model::{DevilFruit, PlayerRecord};

use super::Latest;

/// Fruits per display column.
pub const COLUMN_SIZE: usize = 8;

/// One holder of a given fruit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FruitOwner {
    pub name: String,
    pub uuid: Uuid,
    pub eaten: bool,
    /// Copies held in the inventory.
    pub in_inventory: usize,
}

pub struct Circulation {
    catalog: Arc<Catalog>,
    players: Latest<[PlayerRecord]>,
}

impl Circulation {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self {
            catalog,
            players: Latest::empty(),
        }
    }

    pub fn update(&self, players: Arc<[PlayerRecord]>) {
        self.players.set(players);
    }

    /// Catalog fruits nobody holds, by rarity then display name.
    pub fn available(&self) -> Vec<DevilFruit> {
        let players = self.players.get();
        self.catalog
            .sorted()
            .into_iter()
            .filter(|fruit| !players.iter().any(|p| p.devil_fruits.contains(fruit)))
            .cloned()
            .collect()
    }

    /// [`available`](Self::available) split into display columns.
    pub fn available_columns(&self) -> Vec<Vec<DevilFruit>> {
        self.available()
            .chunks(COLUMN_SIZE)
            .map(<[DevilFruit]>::to_vec)
            .collect()
    }

    /// Everyone holding the fruit. `None` if the fruit is not in the catalog.
    pub fn owners(&self, qualified_name: &str) -> Option<Vec<FruitOwner>> {
        let fruit = self.catalog.by_qualified_name(qualified_name)?;
        let players = self.players.get();
        Some(
            players
                .iter()
                .filter(|p| p.devil_fruits.contains(fruit))
                .map(|p| FruitOwner {
                    name: p.name.clone(),
                    uuid: p.uuid,
                    eaten: p.eaten_fruits.contains(fruit),
                    in_inventory: p.inventory_fruits.iter().filter(|f| *f == fruit).count(),
                })
                .collect(),
        )
    }

    /// Fruits held by more than one player, in catalog order.
    pub fn duplicates(&self) -> Vec<(DevilFruit, Vec<FruitOwner>)> {
        self.catalog
            .sorted()
            .into_iter()
            .filter_map(|fruit| {
                let owners = self.owners(&fruit.qualified_name)?;
                (owners.len() > 1).then(|| (fruit.clone(), owners))
            })
            .collect()
    }

    /// Players carrying more than one unconsumed fruit.
    pub fn overstocked(&self) -> Vec<(String, Vec<DevilFruit>)> {
        let players = self.players.get();
        let mut overstocked: Vec<(String, Vec<DevilFruit>)> = players
            .iter()
            .filter(|p| p.inventory_fruits.len() > 1)
            .map(|p| (p.name.clone(), p.inventory_fruits.clone()))
            .collect();
        overstocked.sort_by(|a, b| a.0.cmp(&b.0));
        overstocked
    }
}

impl Subscriber for Circulation {
    fn name(&self) -> &'static str {
        "circulation"
    }

    fn handle(&self, event: &Event) {
        if let Event::PlayersRead(players) = event {
            self.update(Arc::clone(players));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::model::Rarity;
    use crate::views::fixtures::{fruit, player, with_fruits};

    fn catalog() -> Arc<Catalog> {
        Arc::new(
            Catalog::new(vec![
                fruit("bara_bara", Rarity::WoodenBox),
                fruit("mera_mera", Rarity::IronBox),
                fruit("gura_gura", Rarity::GoldenBox),
                fruit("hito_hito", Rarity::IronBox),
            ])
            .unwrap(),
        )
    }

    fn names(fruits: &[DevilFruit]) -> Vec<&str> {
        fruits.iter().map(|f| f.qualified_name.as_str()).collect()
    }

    #[test]
    fn available_excludes_possessed_fruits() {
        let view = Circulation::new(catalog());
        let mera = fruit("mera_mera", Rarity::IronBox);
        view.update(Arc::from(vec![with_fruits(player(1, "Ace"), &[mera], &[])]));

        assert_eq!(
            names(&view.available()),
            ["gura_gura", "hito_hito", "bara_bara"]
        );
    }

    #[test]
    fn nothing_held_means_whole_catalog_available() {
        let view = Circulation::new(catalog());
        assert_eq!(view.available().len(), 4);
        assert_eq!(view.available_columns().len(), 1);
    }

    #[test]
    fn owners_report_eaten_and_inventory_counts() {
        let view = Circulation::new(catalog());
        let mera = fruit("mera_mera", Rarity::IronBox);
        view.update(Arc::from(vec![
            with_fruits(player(1, "Ace"), std::slice::from_ref(&mera), &[]),
            with_fruits(player(2, "Sabo"), &[], &[mera.clone(), mera.clone()]),
            player(3, "Luffy"),
        ]));

        let owners = view.owners("mera_mera").unwrap();
        assert_eq!(owners.len(), 2);
        assert!(owners[0].eaten);
        assert_eq!(owners[0].in_inventory, 0);
        assert!(!owners[1].eaten);
        assert_eq!(owners[1].in_inventory, 2);
        assert!(view.owners("unknown").is_none());
    }

    #[test]
    fn duplicates_and_overstock() {
        let view = Circulation::new(catalog());
        let mera = fruit("mera_mera", Rarity::IronBox);
        let bara = fruit("bara_bara", Rarity::WoodenBox);
        view.update(Arc::from(vec![
            with_fruits(player(1, "Ace"), std::slice::from_ref(&mera), &[]),
            with_fruits(player(2, "Sabo"), &[], &[mera.clone(), bara.clone()]),
        ]));

        let dupes = view.duplicates();
        assert_eq!(dupes.len(), 1);
        assert_eq!(dupes[0].0.qualified_name, "mera_mera");

        let overstocked = view.overstocked();
        assert_eq!(overstocked.len(), 1);
        assert_eq!(overstocked[0].0, "Sabo");
        assert_eq!(names(&overstocked[0].1), ["mera_mera", "bara_bara"]);
    }

    #[test]
    fn columns_hold_eight_fruits() {
        let fruits = (0..19)
            .map(|i| fruit(&format!("fruit_{i:02}"), Rarity::WoodenBox))
            .collect();
        let view = Circulation::new(Arc::new(Catalog::new(fruits).unwrap()));

        let columns = view.available_columns();
        let sizes: Vec<usize> = columns.iter().map(Vec::len).collect();
        assert_eq!(sizes, [8, 8, 3]);
    }
}
