//! Player directory: lookups, inactivity, mob kills, leaderboards.

use std::sync::Arc;

use uuid::Uuid;

use crate::events::{Event, Subscriber};
use crate::model::PlayerRecord;

use super::{Latest, starts_with_ignore_case};

/// Most suggestions returned by a name search.
pub const SEARCH_LIMIT: usize = 25;

/// Leaderboard column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Stat {
    Doriki,
    Belly,
    Bounty,
    Loyalty,
    /// Sum of the three haki accumulators.
    Haki,
    MobKills,
}

impl Stat {
    #[allow(clippy::cast_precision_loss)]
    pub fn value(self, player: &PlayerRecord) -> f64 {
        match self {
            Self::Doriki => player.doriki as f64,
            Self::Belly => player.belly as f64,
            Self::Bounty => player.bounty as f64,
            Self::Loyalty => player.loyalty as f64,
            Self::Haki => player.hardening_haki + player.imbuing_haki + player.observation_haki,
            Self::MobKills => player.total_mob_kills() as f64,
        }
    }
}

pub struct PlayerDirectory {
    players: Latest<[PlayerRecord]>,
}

impl Default for PlayerDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerDirectory {
    pub fn new() -> Self {
        Self {
            players: Latest::empty(),
        }
    }

    pub fn update(&self, players: Arc<[PlayerRecord]>) {
        self.players.set(players);
    }

    pub fn all(&self) -> Arc<[PlayerRecord]> {
        self.players.get()
    }

    pub fn by_uuid(&self, uuid: Uuid) -> Option<PlayerRecord> {
        self.all().iter().find(|p| p.uuid == uuid).cloned()
    }

    pub fn by_account(&self, account_id: u64) -> Option<PlayerRecord> {
        self.all()
            .iter()
            .find(|p| p.account_id == Some(account_id))
            .cloned()
    }

    /// A player by UUID, or else by exact name ignoring case.
    pub fn find(&self, query: &str) -> Option<PlayerRecord> {
        if let Ok(uuid) = query.parse::<Uuid>() {
            return self.by_uuid(uuid);
        }
        self.all()
            .iter()
            .find(|p| p.name.eq_ignore_ascii_case(query))
            .cloned()
    }

    /// Up to [`SEARCH_LIMIT`] `(name, uuid)` pairs whose name starts with
    /// `prefix`, sorted by name.
    pub fn search(&self, prefix: &str) -> Vec<(String, Uuid)> {
        let mut matches: Vec<(String, Uuid)> = self
            .all()
            .iter()
            .filter(|p| starts_with_ignore_case(&p.name, prefix))
            .map(|p| (p.name.clone(), p.uuid))
            .collect();
        matches.sort_by_key(|(name, _)| name.to_lowercase());
        matches.truncate(SEARCH_LIMIT);
        matches
    }

    /// Inactive players, longest absent first. With `with_fruits`, only
    /// those still holding a fruit.
    pub fn inactive(&self, with_fruits: bool) -> Vec<PlayerRecord> {
        let mut inactive: Vec<PlayerRecord> = self
            .all()
            .iter()
            .filter(|p| p.inactive && (!with_fruits || !p.devil_fruits.is_empty()))
            .cloned()
            .collect();
        inactive.sort_by_key(|p| p.last_seen);
        inactive
    }

    /// Kill counts, highest first, and their total.
    pub fn mob_kills(&self, uuid: Uuid) -> Option<(Vec<(String, u64)>, u64)> {
        let player = self.by_uuid(uuid)?;
        let mut kills: Vec<(String, u64)> = player.mob_kills.into_iter().collect();
        kills.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let total = kills.iter().map(|(_, n)| n).sum();
        Some((kills, total))
    }

    /// Top `limit` players by `stat`, highest first.
    pub fn leaderboard(&self, stat: Stat, limit: usize) -> Vec<(String, f64)> {
        let mut rows: Vec<(String, f64)> = self
            .all()
            .iter()
            .map(|p| (p.name.clone(), stat.value(p)))
            .collect();
        rows.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        rows.truncate(limit);
        rows
    }
}

impl Subscriber for PlayerDirectory {
    fn name(&self) -> &'static str {
        "players"
    }

    fn handle(&self, event: &Event) {
        if let Event::PlayersRead(players) = event {
            self.update(Arc::clone(players));
        }
    }
}

/// `minecraft:wither_skeleton` → `Wither Skeleton`.
pub fn mob_display_name(id: &str) -> String {
    let name = id.split_once(':').map_or(id, |(_, name)| name);
    name.split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|c| c.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    use jiff::Timestamp;

    use crate::model::Rarity;
    use crate::views::fixtures::{fruit, player, with_fruits};

    fn directory(players: Vec<PlayerRecord>) -> PlayerDirectory {
        let directory = PlayerDirectory::new();
        directory.update(Arc::from(players));
        directory
    }

    #[test]
    fn find_by_uuid_or_name() {
        let dir = directory(vec![player(1, "Luffy"), player(2, "Zoro")]);

        assert_eq!(dir.find("zoro").map(|p| p.name), Some("Zoro".into()));
        let uuid = Uuid::from_u64_pair(0, 1).to_string();
        assert_eq!(dir.find(&uuid).map(|p| p.name), Some("Luffy".into()));
        assert!(dir.find("Nami").is_none());
    }

    #[test]
    fn search_is_prefix_case_insensitive_and_capped() {
        let mut players: Vec<PlayerRecord> =
            (0..30).map(|i| player(i, &format!("Marine{i:02}"))).collect();
        players.push(player(100, "luffy"));
        players.push(player(101, "Law"));
        let dir = directory(players);

        let hits: Vec<String> = dir.search("l").into_iter().map(|(n, _)| n).collect();
        assert_eq!(hits, ["Law", "luffy"]);
        assert_eq!(dir.search("mar").len(), SEARCH_LIMIT);
    }

    #[test]
    fn inactive_filters_by_fruit_holding() {
        let mera = fruit("mera_mera", Rarity::IronBox);
        let mut gone = with_fruits(player(1, "Ace"), &[mera], &[]);
        gone.inactive = true;
        gone.last_seen = Timestamp::from_second(100).unwrap();
        let mut idle = player(2, "Buggy");
        idle.inactive = true;
        idle.last_seen = Timestamp::from_second(50).unwrap();
        let dir = directory(vec![gone, idle, player(3, "Luffy")]);

        let all: Vec<String> = dir.inactive(false).into_iter().map(|p| p.name).collect();
        assert_eq!(all, ["Buggy", "Ace"]);
        let holding: Vec<String> = dir.inactive(true).into_iter().map(|p| p.name).collect();
        assert_eq!(holding, ["Ace"]);
    }

    #[test]
    fn mob_kills_sorted_with_total() {
        let mut hunter = player(1, "Zoro");
        hunter.mob_kills.insert("minecraft:zombie".into(), 3);
        hunter.mob_kills.insert("minecraft:spider".into(), 10);
        let dir = directory(vec![hunter]);

        let (kills, total) = dir.mob_kills(Uuid::from_u64_pair(0, 1)).unwrap();
        assert_eq!(kills[0], ("minecraft:spider".to_string(), 10));
        assert_eq!(total, 13);
        assert!(dir.mob_kills(Uuid::nil()).is_none());
    }

    #[test]
    fn leaderboard_orders_by_stat() {
        let mut a = player(1, "Garp");
        a.doriki = 9000;
        let mut b = player(2, "Koby");
        b.doriki = 1200;
        let dir = directory(vec![b, a]);

        let board = dir.leaderboard(Stat::Doriki, 1);
        assert_eq!(board, [("Garp".to_string(), 9000.0)]);
    }

    #[test]
    fn mob_names_are_humanized() {
        assert_eq!(mob_display_name("minecraft:wither_skeleton"), "Wither Skeleton");
        assert_eq!(mob_display_name("zombie"), "Zombie");
    }
}
