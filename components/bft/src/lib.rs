//! Round/step agreement component. Every round runs the phase chain
//! generation → first reduction → second reduction → agreement until
//! a certificate is produced or a newer round replaces it.
//!
//! The component is driven through channels: [`RoundUpdate`]s start rounds,
//! inbound [`ConsensusMsg`]s are the votes and proposals gossiped by other
//! provisioners, and every message to gossip or to hand to block acceptance
//! leaves as an [`OutputMessage`].

use anyhow::Context as _;
use sba_consensus_roles::provisioner::{
    BlockHash, Candidate, Certificate, ConsensusMsg, PublicKey, Round, RoundUpdate, Seed,
};
use std::fmt;
use tokio::sync::mpsc;

pub use config::{Config, Timeouts};

mod aggregator;
pub mod bids;
mod classify;
mod config;
pub mod ctx;
mod emitter;
mod handler;
mod metrics;
mod phase;
mod queue;
mod round;
pub mod testonly;
#[cfg(test)]
mod tests;
mod timeout;

/// Message produced by the component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputMessage {
    /// Signed message to gossip to the other provisioners.
    Gossip(ConsensusMsg),
    /// The component started working on a round.
    RoundStarted(Round),
    /// A block got agreed on. Handed over to block acceptance.
    Certificate(Certificate),
}

/// Access to candidate blocks.
///
/// Implementations **must** propagate context cancellation using [`ctx::Error::Canceled`].
#[async_trait::async_trait]
pub trait Rpc: 'static + fmt::Debug + Send + Sync {
    /// Fetches the candidate block with the given hash.
    /// A missing candidate is reported as an internal error.
    async fn get_candidate(&self, ctx: &ctx::Ctx, hash: &BlockHash) -> ctx::Result<Candidate>;
    /// Validates the content of a candidate against the chain state.
    async fn verify_candidate_block(&self, ctx: &ctx::Ctx, block: &Candidate) -> ctx::Result<()>;
    /// Identities of the most recent agreement committee, rewarded by the coinbase
    /// of the next generated block.
    async fn get_last_committee(&self, ctx: &ctx::Ctx) -> ctx::Result<Vec<PublicKey>>;
}

/// Blind-bid proof, opaque to consensus apart from its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proof {
    /// Score of the proof. Higher scores win the selection.
    pub score: u64,
    /// Proof bytes, forwarded untouched.
    pub proof: Vec<u8>,
}

/// Block generation capabilities of the local node.
#[async_trait::async_trait]
pub trait Prover: 'static + fmt::Debug + Send + Sync {
    /// Proves the local bid against `seed`, hiding it among `bids`.
    /// `None` if the node has no bid eligible for this round.
    async fn prove(
        &self,
        ctx: &ctx::Ctx,
        seed: &Seed,
        bids: &[bids::Bid],
    ) -> ctx::Result<Option<Proof>>;
    /// Assembles a candidate block extending `ru.prev_hash`,
    /// paying the coinbase to `coinbase`.
    async fn generate_block(
        &self,
        ctx: &ctx::Ctx,
        ru: &RoundUpdate,
        coinbase: Vec<PublicKey>,
    ) -> ctx::Result<Candidate>;
}

impl Config {
    /// Runs the component until `ctx` is canceled or `rounds` is closed.
    ///
    /// Every `RoundUpdate` received on `rounds` cancels the round in progress
    /// (if any) and starts the new one.
    pub async fn run(
        self,
        ctx: &ctx::Ctx,
        rounds: mpsc::UnboundedReceiver<RoundUpdate>,
        inbound: mpsc::UnboundedReceiver<ConsensusMsg>,
        outbound: mpsc::UnboundedSender<OutputMessage>,
    ) -> anyhow::Result<()> {
        tracing::info!("Starting consensus component {:?}", self.secret_key.public());
        self.timeouts.validate().context("timeouts")?;
        let res = round::Driver::new(self, inbound, outbound)
            .run(ctx, rounds)
            .await;
        match res {
            Ok(()) | Err(ctx::Error::Canceled(_)) => Ok(()),
            Err(ctx::Error::Internal(err)) => Err(err),
        }
    }
}
