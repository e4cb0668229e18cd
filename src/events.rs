//! In-process fan-out from the ingestion pipeline to the views.
//!
//! Publishing is synchronous: every subscriber's [`Subscriber::handle`]
//! runs to completion, in subscription order, before `publish` returns.
//! Payloads are shared `Arc`s, so subscribers keep a reference to the
//! published data instead of copying it. A subscriber with slow work to do
//! must hand it off rather than hold up the publisher.

use std::sync::Arc;

use crate::model::{LogFile, PlayerRecord, WorldSnapshot};

/// What the pipeline publishes after each read.
#[derive(Debug, Clone)]
pub enum Event {
    WorldRead(Arc<WorldSnapshot>),
    /// The complete player list of one pass.
    PlayersRead(Arc<[PlayerRecord]>),
    LogsRead(Arc<[LogFile]>),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WorldRead(_) => "world_read",
            Self::PlayersRead(_) => "players_read",
            Self::LogsRead(_) => "logs_read",
        }
    }
}

pub trait Subscriber: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle(&self, event: &Event);
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Vec<Arc<dyn Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, subscriber: Arc<dyn Subscriber>) {
        tracing::debug!(subscriber = subscriber.name(), "Subscriber registered");
        self.subscribers.push(subscriber);
    }

    pub fn publish(&self, event: &Event) {
        tracing::trace!(
            kind = event.kind(),
            subscribers = self.subscribers.len(),
            "Publishing event"
        );
        for subscriber in &self.subscribers {
            subscriber.handle(event);
        }
    }
}
