//! World projection: the mod's shared save (`data/mineminenomi.dat`).
//!
//! ```text
//! data
//!   issuedBounties              # { "<uuid>": amount }
//!   crews[{ name, members[{ username, isCaptain, idMost, idLeast }], jollyRoger }]
//!   devilFruitsInInventories[{ uuid, date, fruits, fruit-0 .. fruit-<n-1> }]
//! ```
//!
//! Malformed entries are skipped one at a time; the world snapshot itself
//! never fails once the file has decoded.

use std::collections::BTreeMap;

use jiff::Timestamp;
use uuid::Uuid;

use crate::identity::IdentityResolver;
use crate::model::{Bounty, Crew, CrewMember, QuarantineEntry, WorldSnapshot};
use crate::nbt::Tree;
use crate::projection::uuid_from_parts;

/// Build the snapshot, resolving bounty holders to names.
pub async fn snapshot(tree: &Tree, resolver: &IdentityResolver, now: Timestamp) -> WorldSnapshot {
    let mut bounties = Vec::new();
    for (uuid, amount) in issued_bounties(tree) {
        let name = match resolver.resolve(uuid).await {
            Ok(identity) => identity.name,
            Err(e) => {
                tracing::warn!(%uuid, error = %e, "Could not resolve bounty holder");
                uuid.to_string()
            }
        };
        bounties.push(Bounty { uuid, name, amount });
    }
    bounties.sort_by(|a, b| b.amount.cmp(&a.amount));

    WorldSnapshot {
        bounties,
        crews: crews(tree),
        quarantine: quarantine(tree),
        read_at: now,
    }
}

fn data(tree: &Tree) -> Option<&Tree> {
    tree.get("data")
}

/// `(holder, amount)` pairs in file order. Negative amounts read as zero.
pub fn issued_bounties(tree: &Tree) -> Vec<(Uuid, u64)> {
    let Some(issued) = data(tree)
        .and_then(|d| d.get("issuedBounties"))
        .and_then(Tree::as_compound)
    else {
        return Vec::new();
    };

    issued
        .iter()
        .filter_map(|(key, amount)| {
            let Ok(uuid) = key.parse::<Uuid>() else {
                tracing::debug!(key = %key, "Skipping bounty with invalid uuid");
                return None;
            };
            let amount = u64::try_from(amount.as_i64()?).unwrap_or(0);
            Some((uuid, amount))
        })
        .collect()
}

pub fn crews(tree: &Tree) -> Vec<Crew> {
    data(tree)
        .and_then(|d| d.get("crews"))
        .and_then(Tree::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(crew)
        .collect()
}

fn crew(node: &Tree) -> Option<Crew> {
    let name = node.get("name").and_then(Tree::as_str)?;
    let members = node
        .get("members")
        .and_then(Tree::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(|m| {
            let most = m.get("idMost").and_then(Tree::as_i64)?;
            let least = m.get("idLeast").and_then(Tree::as_i64)?;
            Some(CrewMember {
                username: m.get("username").and_then(Tree::as_str)?.to_string(),
                is_captain: m.get("isCaptain").and_then(Tree::as_bool).unwrap_or(false),
                uuid: uuid_from_parts(most, least),
            })
        })
        .collect();

    Some(Crew {
        name: name.to_string(),
        members,
        jolly_roger: node.get("jollyRoger").cloned().unwrap_or(Tree::Null),
    })
}

/// Players who logged out holding fruits, with the fruits they held.
pub fn quarantine(tree: &Tree) -> Vec<QuarantineEntry> {
    data(tree)
        .and_then(|d| d.get("devilFruitsInInventories"))
        .and_then(Tree::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(quarantine_entry)
        .collect()
}

fn quarantine_entry(node: &Tree) -> Option<QuarantineEntry> {
    let uuid = node.get("uuid").and_then(Tree::as_str)?.parse::<Uuid>().ok()?;
    let millis = node.get("date").and_then(Tree::as_i64)?;
    let logged_out_at = Timestamp::from_millisecond(millis).ok()?;

    // Never more indexed fruits than keys in the entry.
    let keys = node.as_compound().map_or(0, BTreeMap::len);
    let count = node
        .get("fruits")
        .and_then(Tree::as_i64)
        .map_or(0, |n| usize::try_from(n).unwrap_or(0).min(keys));
    let fruits = (0..count)
        .filter_map(|i| node.get(&format!("fruit-{i}")).and_then(Tree::as_str))
        .map(str::to_string)
        .collect();

    Some(QuarantineEntry {
        uuid,
        logged_out_at,
        fruits,
    })
}
