use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::{
    clock::Round,
    config::SimConfiguration,
    model::{Block, BlockId, PartyId},
    sim::metrics::{RoundRecord, Summary},
};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    Config(SimConfiguration),
    BlockProposed {
        round: Round,
        id: BlockId,
        parent: BlockId,
        proposer: PartyId,
    },
    Round(RoundRecord),
    Summary(Summary),
}

#[derive(Clone)]
pub struct EventTracker {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventTracker {
    pub fn new(sender: mpsc::UnboundedSender<Event>) -> Self {
        Self { sender }
    }

    pub fn track_config(&self, config: &SimConfiguration) {
        self.send(Event::Config(config.clone()));
    }

    pub fn track_block_proposed(&self, block: &Block) {
        let (Some(parent), Some(proposer)) = (block.parent, block.proposer) else {
            return;
        };
        self.send(Event::BlockProposed {
            round: block.round,
            id: block.id,
            parent,
            proposer,
        });
    }

    pub fn track_round(&self, record: RoundRecord) {
        self.send(Event::Round(record));
    }

    pub fn track_summary(&self, summary: Summary) {
        self.send(Event::Summary(summary));
    }

    fn send(&self, event: Event) {
        if self.sender.send(event).is_err() {
            warn!("tried sending event after monitor finished");
        }
    }
}
