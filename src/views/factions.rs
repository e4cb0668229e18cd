//! Faction role sync.
//!
//! Every linked player should hold exactly the chat role of their faction
//! and none of the other faction roles. This view works out the desired
//! role per account and, given the roles accounts currently hold, the
//! changes needed. Applying them is up to the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::config::FactionRoleConfig;
use crate::events::{Event, Subscriber};
use crate::model::PlayerRecord;

use super::Latest;

/// Roles to add to and remove from one account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleChange {
    pub account_id: u64,
    pub add: Vec<u64>,
    pub remove: Vec<u64>,
}

pub struct FactionRoles {
    roles: FactionRoleConfig,
    players: Latest<[PlayerRecord]>,
}

impl FactionRoles {
    pub fn new(roles: FactionRoleConfig) -> Self {
        Self {
            roles,
            players: Latest::empty(),
        }
    }

    pub fn update(&self, players: Arc<[PlayerRecord]>) {
        self.players.set(players);
    }

    /// Desired faction role per linked account. `None` means the player has
    /// no faction, or one without a configured role.
    pub fn desired(&self) -> BTreeMap<u64, Option<u64>> {
        self.players
            .get()
            .iter()
            .filter_map(|p| {
                let account = p.account_id?;
                Some((account, p.faction.and_then(|f| self.roles.role_for(f))))
            })
            .collect()
    }

    /// Changes that bring `current` (roles held per account) in line with
    /// [`desired`](Self::desired). Accounts absent from `current` are not
    /// members and are skipped.
    pub fn plan(&self, current: &HashMap<u64, Vec<u64>>) -> Vec<RoleChange> {
        let faction_roles = self.roles.all();

        self.desired()
            .into_iter()
            .filter_map(|(account_id, want)| {
                let held = current.get(&account_id)?;
                let add: Vec<u64> = want.filter(|r| !held.contains(r)).into_iter().collect();
                let remove: Vec<u64> = faction_roles
                    .iter()
                    .copied()
                    .filter(|r| Some(*r) != want && held.contains(r))
                    .collect();
                (!add.is_empty() || !remove.is_empty()).then_some(RoleChange {
                    account_id,
                    add,
                    remove,
                })
            })
            .collect()
    }
}

impl Subscriber for FactionRoles {
    fn name(&self) -> &'static str {
        "factions"
    }

    fn handle(&self, event: &Event) {
        if let Event::PlayersRead(players) = event {
            self.update(Arc::clone(players));
        }
    }
}
