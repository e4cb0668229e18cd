//! Output formatting for CLI display.

use std::fmt::Write as _;

use jiff::Timestamp;

use crate::model::{DevilFruit, Faction, FightingStyle, PlayerRecord, Race, SubRace};
use crate::views::FruitOwner;

/// `1234567` → `1,234,567`.
pub(super) fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Whole days between `then` and `now`, e.g. `4d ago`.
pub(super) fn format_age(then: Timestamp, now: Timestamp) -> String {
    let hours = now.duration_since(then).as_hours();
    if hours < 24 {
        format!("{hours}h ago")
    } else {
        format!("{}d ago", hours / 24)
    }
}

pub(super) fn format_fruits(fruits: &[DevilFruit]) -> String {
    if fruits.is_empty() {
        return "none".to_string();
    }
    fruits
        .iter()
        .map(|f| f.format_name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// `Ace (eaten, 2 in inventory)`.
pub(super) fn format_owner(owner: &FruitOwner) -> String {
    let mut notes = Vec::new();
    if owner.eaten {
        notes.push("eaten".to_string());
    }
    if owner.in_inventory > 0 {
        notes.push(format!("{} in inventory", owner.in_inventory));
    }
    format!("{} ({})", owner.name, notes.join(", "))
}

/// Multi-line profile of a player.
pub(super) fn format_player(player: &PlayerRecord, now: Timestamp) -> String {
    let label = |value: Option<&'static str>| value.unwrap_or("-");

    let mut out = String::new();
    let _ = writeln!(out, "{}  ({})", player.name, player.uuid);
    let _ = writeln!(
        out,
        "  race: {}  sub-race: {}  faction: {}  style: {}",
        label(player.race.map(Race::label)),
        label(player.sub_race.map(SubRace::label)),
        label(player.faction.map(Faction::label)),
        label(player.fighting_style.map(FightingStyle::label)),
    );
    let _ = writeln!(
        out,
        "  doriki: {}  belly: {}  bounty: {}  loyalty: {}",
        player.doriki,
        format_amount(player.belly),
        format_amount(player.bounty),
        player.loyalty,
    );
    let _ = writeln!(
        out,
        "  haki: hardening {:.1}  imbuing {:.1}  observation {:.1}  limit {:.1}{}",
        player.hardening_haki,
        player.imbuing_haki,
        player.observation_haki,
        player.haki_limit,
        if player.conqueror_haki { "  (conqueror)" } else { "" },
    );
    let _ = writeln!(out, "  eaten: {}", format_fruits(&player.eaten_fruits));
    let _ = writeln!(out, "  inventory: {}", format_fruits(&player.inventory_fruits));
    let _ = write!(
        out,
        "  last seen: {}{}",
        format_age(player.last_seen, now),
        if player.inactive { "  [inactive]" } else { "" },
    );
    if let Some(account) = player.account_id {
        let _ = write!(out, "\n  linked account: {account}");
    }
    out
}
