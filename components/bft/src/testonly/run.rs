use super::{Behavior, Node};
use crate::{ctx, OutputMessage, Timeouts};
use anyhow::Context as _;
use sba_consensus_crypto::keccak256::Keccak256;
use sba_consensus_roles::provisioner::{
    testonly::Setup, BlockHash, Certificate, ConsensusMsg, Provisioners, Round, RoundUpdate, Seed,
    Sortition, Step,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::mpsc, task::JoinSet};
use tracing::Instrument as _;

/// In-process network of provisioners.
///
/// Plays every collaborator the nodes need: a gossip hub relaying every
/// message to all other nodes, a candidate broker storing every gossiped
/// candidate in the stores of all nodes, and block acceptance starting
/// the next round on all nodes as soon as one of them certifies a block.
#[derive(Debug)]
pub struct Network {
    /// Participating nodes.
    pub nodes: Vec<Node>,
    /// Stake set of the nodes.
    pub provisioners: Arc<Provisioners>,
    /// Committee extraction used by all nodes.
    pub sortition: Arc<dyn Sortition>,
    /// Committee seats per step.
    pub committee_size: usize,
    /// Phase timeouts of all nodes.
    pub timeouts: Timeouts,
    /// Last step of a round.
    pub max_step: Step,
    /// Seed of the first round.
    pub seed: Seed,
}

impl Network {
    /// Network of `setup`'s provisioners, `behaviors[i]` being the behavior
    /// of `setup.keys[i]`. Every node sits in every committee.
    pub fn new(setup: &Setup, behaviors: &[Behavior]) -> Self {
        Self {
            nodes: setup
                .keys
                .iter()
                .zip(behaviors)
                .map(|(key, behavior)| Node::new(key.clone(), *behavior))
                .collect(),
            provisioners: setup.provisioners.clone(),
            sortition: Arc::new(setup.fixed_sortition()),
            committee_size: setup.keys.len(),
            timeouts: super::timeouts(),
            max_step: Step(u8::MAX),
            seed: Seed([0; 32]),
        }
    }

    /// Update of the round following the one `cert` finalized.
    fn next_round(ru: &RoundUpdate, cert: &Certificate) -> RoundUpdate {
        let seed = Keccak256::concat([&ru.seed.0[..], &cert.block_hash.0[..]]);
        RoundUpdate {
            round: ru.round.next(),
            provisioners: ru.provisioners.clone(),
            seed: Seed(*seed.as_bytes()),
            committee_size: ru.committee_size,
            prev_hash: cert.block_hash,
        }
    }

    /// Runs the network until `rounds` rounds are finalized.
    /// Returns the first certificate of every round.
    pub async fn run(self, ctx: &ctx::Ctx, rounds: usize) -> anyhow::Result<Vec<Certificate>> {
        let nodes_ctx = ctx.child();
        let mut tasks = JoinSet::new();
        let (hub_send, mut hub_recv) = mpsc::unbounded_channel();
        let mut round_senders = vec![];
        let mut inbound_senders = vec![];
        for (i, node) in self.nodes.iter().enumerate() {
            let mut cfg = node.config(i as u64, self.sortition.clone());
            cfg.timeouts = self.timeouts;
            cfg.max_step = self.max_step;
            let (round_send, round_recv) = mpsc::unbounded_channel();
            let (inbound_send, inbound_recv) = mpsc::unbounded_channel();
            let (out_send, mut out_recv) = mpsc::unbounded_channel::<OutputMessage>();
            round_senders.push(round_send);
            inbound_senders.push(inbound_send);

            let node_ctx = nodes_ctx.clone();
            tasks.spawn(
                async move {
                    cfg.run(&node_ctx, round_recv, inbound_recv, out_send)
                        .await
                        .with_context(|| format!("node {i}"))
                }
                .instrument(tracing::info_span!("node", i)),
            );
            let hub = hub_send.clone();
            tasks.spawn(async move {
                while let Some(msg) = out_recv.recv().await {
                    if hub.send((i, msg)).is_err() {
                        break;
                    }
                }
                Ok(())
            });
        }
        drop(hub_send);

        let mut ru = RoundUpdate {
            round: Round(1),
            provisioners: self.provisioners.clone(),
            seed: self.seed,
            committee_size: self.committee_size,
            prev_hash: BlockHash::EMPTY,
        };
        for send in &round_senders {
            let _ = send.send(ru.clone());
        }

        let mut finalized: BTreeMap<Round, BlockHash> = BTreeMap::new();
        let mut certs = vec![];
        while certs.len() < rounds {
            let (from, msg) = tokio::select! {
                () = ctx.canceled() => return Err(ctx::Canceled.into()),
                Some(res) = tasks.join_next() => {
                    res.context("task panicked")??;
                    continue;
                }
                msg = hub_recv.recv() => msg.context("all nodes stopped")?,
            };
            if !self.nodes[from].delivers(&msg) {
                continue;
            }
            match msg {
                OutputMessage::Gossip(msg) => {
                    if let ConsensusMsg::Candidate(c) = &msg {
                        for node in &self.nodes {
                            node.rpc.insert(c.block.clone());
                        }
                    }
                    for (to, send) in inbound_senders.iter().enumerate() {
                        if to != from {
                            let _ = send.send(msg.clone());
                        }
                    }
                }
                OutputMessage::RoundStarted(_) => {}
                OutputMessage::Certificate(cert) => {
                    let prev = *finalized.entry(cert.round).or_insert(cert.block_hash);
                    anyhow::ensure!(
                        prev == cert.block_hash,
                        "conflicting blocks finalized in round {}",
                        cert.round
                    );
                    if cert.round != ru.round {
                        continue;
                    }
                    tracing::info!("round {} finalized {:?}", cert.round, cert.block_hash);
                    ru = Self::next_round(&ru, &cert);
                    certs.push(cert);
                    for send in &round_senders {
                        let _ = send.send(ru.clone());
                    }
                }
            }
        }

        nodes_ctx.cancel();
        drop(round_senders);
        drop(inbound_senders);
        drop(hub_recv);
        while let Some(res) = tasks.join_next().await {
            res.context("task panicked")??;
        }
        Ok(certs)
    }
}
