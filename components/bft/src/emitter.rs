//! Outgoing side of the component: signing, gossip and candidate RPCs.
use crate::{ctx, metrics, OutputMessage, Proof, Rpc};
use sba_consensus_roles::provisioner::{
    self, Agreement, BlockHash, Candidate, CandidateMsg, ConsensusMsg, Header, PublicKey,
    Reduction, Round, Score, Seed, Step, StepVotes,
};
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;

/// Signing failed. Means that the local key is corrupted, which is fatal.
#[derive(Debug, thiserror::Error)]
#[error("local key produced a signature which doesn't verify against {public:?}: {err:#}")]
pub(crate) struct SigningError {
    public: Box<PublicKey>,
    #[source]
    err: provisioner::Error,
}

/// Why a candidate couldn't be verified. Every variant results in a vote for the empty hash.
#[derive(Debug, thiserror::Error)]
pub(crate) enum VerifyError {
    /// `GetCandidate` failed.
    #[error("candidate not found: {0:#}")]
    NotFound(#[source] anyhow::Error),
    /// The candidate doesn't match the requested position or was rejected by `VerifyCandidateBlock`.
    #[error("invalid candidate: {0:#}")]
    Invalid(#[source] anyhow::Error),
    /// One of the calls didn't finish in time.
    #[error("{0} timed out")]
    Timeout(&'static str),
    /// The calling phase got canceled. Not a verdict on the candidate.
    #[error(transparent)]
    Canceled(#[from] ctx::Canceled),
}

/// Signs and publishes the messages of the local provisioner.
#[derive(Debug)]
pub(crate) struct Emitter {
    key: provisioner::SecretKey,
    public: PublicKey,
    outbound: mpsc::UnboundedSender<OutputMessage>,
    rpc: Arc<dyn Rpc>,
    get_candidate_timeout: Duration,
    verify_candidate_timeout: Duration,
}

impl Emitter {
    pub(crate) fn new(
        key: provisioner::SecretKey,
        outbound: mpsc::UnboundedSender<OutputMessage>,
        rpc: Arc<dyn Rpc>,
        get_candidate_timeout: Duration,
        verify_candidate_timeout: Duration,
    ) -> Self {
        Self {
            public: key.public(),
            key,
            outbound,
            rpc,
            get_candidate_timeout,
            verify_candidate_timeout,
        }
    }

    /// Public key of the local provisioner.
    pub(crate) fn public(&self) -> &PublicKey {
        &self.public
    }

    fn header(&self, round: Round, step: Step, block_hash: BlockHash) -> Header {
        Header {
            round,
            step,
            block_hash,
            sender: self.public.clone(),
        }
    }

    /// Checks the fresh signature against the public key derived at startup.
    fn check(&self, msg: ConsensusMsg) -> Result<ConsensusMsg, SigningError> {
        msg.signature()
            .verify(&msg.signable(), &self.public)
            .map_err(|err| SigningError {
                public: self.public.clone().into(),
                err,
            })?;
        Ok(msg)
    }

    /// Signed reduction vote for `block_hash`.
    pub(crate) fn reduction(
        &self,
        round: Round,
        step: Step,
        block_hash: BlockHash,
    ) -> Result<ConsensusMsg, SigningError> {
        let header = self.header(round, step, block_hash);
        self.check(Reduction::sign(&self.key, header).into())
    }

    /// Signed agreement vote carrying the step votes of both reductions.
    pub(crate) fn agreement(
        &self,
        round: Round,
        step: Step,
        votes: [StepVotes; 2],
    ) -> Result<ConsensusMsg, SigningError> {
        let header = self.header(round, step, votes[1].block_hash);
        self.check(Agreement::sign(&self.key, header, votes).into())
    }

    /// Signed selection proposal for `block_hash`.
    pub(crate) fn score(
        &self,
        round: Round,
        step: Step,
        block_hash: BlockHash,
        proof: Proof,
        seed: Seed,
    ) -> Result<ConsensusMsg, SigningError> {
        let header = self.header(round, step, block_hash);
        self.check(Score::sign(&self.key, header, proof.score, proof.proof, seed).into())
    }

    /// Signed candidate block message.
    pub(crate) fn candidate(
        &self,
        round: Round,
        step: Step,
        block: Candidate,
    ) -> Result<ConsensusMsg, SigningError> {
        let header = self.header(round, step, BlockHash::EMPTY);
        self.check(CandidateMsg::sign(&self.key, header, block).into())
    }

    /// Hands `msg` over to gossip. Never blocks. A closed channel is logged:
    /// the state machine keeps going without an audience.
    pub(crate) fn republish(&self, msg: ConsensusMsg) {
        self.publish(OutputMessage::Gossip(msg));
    }

    /// Hands `msg` over to the output channel.
    pub(crate) fn publish(&self, msg: OutputMessage) {
        if let Err(mpsc::error::SendError(msg)) = self.outbound.send(msg) {
            metrics::METRICS.publish_failures.inc();
            tracing::warn!("output channel closed, dropping {msg:?}");
        }
    }

    /// Fetches the candidate `hash` of `round` and has it verified.
    /// Each call is bounded by its own timeout.
    pub(crate) async fn verify_candidate(
        &self,
        ctx: &ctx::Ctx,
        round: Round,
        hash: &BlockHash,
    ) -> Result<Candidate, VerifyError> {
        let block = {
            let call = &ctx.with_timeout(self.get_candidate_timeout);
            match call.wait(self.rpc.get_candidate(call, hash)).await {
                Ok(Ok(block)) => block,
                Ok(Err(ctx::Error::Internal(err))) => return Err(VerifyError::NotFound(err)),
                Ok(Err(ctx::Error::Canceled(_))) | Err(ctx::Canceled) => {
                    return Err(Self::interrupted(ctx, "GetCandidate"))
                }
            }
        };
        if block.hash() != *hash {
            return Err(VerifyError::Invalid(anyhow::anyhow!(
                "got candidate {:?}, want {hash:?}",
                block.hash()
            )));
        }
        if block.round != round {
            return Err(VerifyError::Invalid(anyhow::anyhow!(
                "candidate of round {}, want round {round}",
                block.round
            )));
        }
        let call = &ctx.with_timeout(self.verify_candidate_timeout);
        match call.wait(self.rpc.verify_candidate_block(call, &block)).await {
            Ok(Ok(())) => Ok(block),
            Ok(Err(ctx::Error::Internal(err))) => Err(VerifyError::Invalid(err)),
            Ok(Err(ctx::Error::Canceled(_))) | Err(ctx::Canceled) => {
                Err(Self::interrupted(ctx, "VerifyCandidateBlock"))
            }
        }
    }

    /// Tells a deadline of a call apart from a cancellation of the caller.
    fn interrupted(ctx: &ctx::Ctx, call: &'static str) -> VerifyError {
        if ctx.is_active() {
            VerifyError::Timeout(call)
        } else {
            VerifyError::Canceled(ctx::Canceled)
        }
    }
}
