//! The bounty board.

use std::sync::Arc;

use crate::events::{Event, Subscriber};
use crate::model::Bounty;

use super::Latest;

pub struct BountyBoard {
    bounties: Latest<[Bounty]>,
}

impl Default for BountyBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl BountyBoard {
    pub fn new() -> Self {
        Self {
            bounties: Latest::empty(),
        }
    }

    pub fn update(&self, bounties: Arc<[Bounty]>) {
        self.bounties.set(bounties);
    }

    /// Open bounties, highest first.
    pub fn open(&self) -> Vec<Bounty> {
        let mut open: Vec<Bounty> = self
            .bounties
            .get()
            .iter()
            .filter(|b| b.amount > 0)
            .cloned()
            .collect();
        open.sort_by(|a, b| b.amount.cmp(&a.amount).then_with(|| a.name.cmp(&b.name)));
        open
    }
}

impl Subscriber for BountyBoard {
    fn name(&self) -> &'static str {
        "bounties"
    }

    fn handle(&self, event: &Event) {
        if let Event::WorldRead(world) = event {
            self.update(Arc::from(world.bounties.clone()));
        }
    }
}
