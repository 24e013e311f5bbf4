use super::{StubProver, StubRpc};
use crate::{Config, OutputMessage};
use sba_consensus_roles::provisioner::{SecretKey, Sortition};
use std::sync::Arc;

/// Enum representing the behavior of the node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Behavior {
    /// A provisioner that is always online and behaves honestly.
    Honest,
    /// Same as honest, except that it never proposes a block (which is a legit behavior).
    HonestNotProposing,
    /// A provisioner whose messages never reach anybody.
    Offline,
}

/// Struct representing a node.
#[derive(Debug)]
pub struct Node {
    /// Provisioner key of the node.
    pub key: SecretKey,
    /// How the node behaves.
    pub behavior: Behavior,
    /// Candidate store of the node, filled from gossip.
    pub rpc: Arc<StubRpc>,
}

impl Node {
    /// Honest node with an empty candidate store.
    pub fn new(key: SecretKey, behavior: Behavior) -> Self {
        Self {
            key,
            behavior,
            rpc: Arc::default(),
        }
    }

    /// Config of the consensus component of the `id`-th node.
    pub(crate) fn config(&self, id: u64, sortition: Arc<dyn Sortition>) -> Config {
        let prover = match self.behavior {
            Behavior::Honest => StubProver::new(id),
            Behavior::HonestNotProposing | Behavior::Offline => StubProver::ineligible(id),
        };
        super::config(
            self.key.clone(),
            sortition,
            self.rpc.clone(),
            Arc::new(prover),
        )
    }

    /// Whether output `msg` of the node reaches the network.
    pub(crate) fn delivers(&self, msg: &OutputMessage) -> bool {
        match self.behavior {
            Behavior::Offline => !matches!(msg, OutputMessage::Gossip(_)),
            Behavior::Honest | Behavior::HonestNotProposing => true,
        }
    }
}
