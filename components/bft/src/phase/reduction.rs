//! Reduction steps: a committee vote turning one proposed hash into step votes.
use super::RoundState;
use crate::{
    aggregator::{Aggregator, Ignored},
    ctx,
    metrics::{self, DropReason, OutcomeLabel, PhaseLabel},
};
use anyhow::Context as _;
use sba_consensus_roles::provisioner::{BlockHash, ConsensusMsg, Step, StepVotes};
use std::time::Instant;

/// Runs a reduction step voting on `hash` (possibly empty).
///
/// Returns the step votes of the first hash reaching a quorum, or the
/// empty result if the step times out, the quorum is on the empty hash,
/// or the winning candidate doesn't verify.
#[tracing::instrument(skip_all, fields(round = %state.round(), step = %step, phase = ?phase))]
pub(super) async fn run(
    ctx: &ctx::Ctx,
    state: &mut RoundState<'_>,
    phase: PhaseLabel,
    step: Step,
    hash: BlockHash,
) -> ctx::Result<StepVotes> {
    let started = Instant::now();
    let round = state.round();
    let mut agg = Aggregator::new(state.handler.committee(round, step)?);
    let mut result = None;

    if state.handler.am_member(round, step)? {
        let vote_for = if hash.is_empty() || state.verify_candidate(ctx, &hash).await? {
            hash
        } else {
            BlockHash::EMPTY
        };
        let vote = state
            .emitter
            .reduction(round, step, vote_for)
            .context("reduction vote")?;
        // Own vote can't be a duplicate, and members aren't ignored.
        result = agg.collect_vote(vote.header(), vote.signature())?.unwrap_or(None);
        tracing::debug!("voting for {vote_for:?}");
        state.republish(ctx, vote);
    }
    // The voting window opens once the own vote is out.
    state.begin(phase, step);

    while result.is_none() {
        let Some(msg) = state.recv(ctx, step).await? else {
            break;
        };
        if !matches!(msg, ConsensusMsg::Reduction(_)) {
            state.unexpected(&msg);
            continue;
        }
        if !state.verify_vote(&msg)? {
            continue;
        }
        match agg.collect_vote(msg.header(), msg.signature())? {
            Ok(votes) => result = votes,
            Err(Ignored::Duplicate) => {
                metrics::METRICS.dropped_messages[&DropReason::Duplicate.into()].inc();
            }
            Err(Ignored::NonMember | Ignored::Done) => {}
        }
    }

    let Some(votes) = result else {
        state.finish(OutcomeLabel::TimedOut);
        return Ok(StepVotes::empty());
    };
    metrics::METRICS.quorum_latency[&phase.into()].observe(started.elapsed());
    tracing::debug!(
        "quorum on {:?} with {} signers",
        votes.block_hash,
        votes.signers.count()
    );
    if votes.block_hash.is_empty() {
        state.finish(OutcomeLabel::Empty);
        return Ok(StepVotes::empty());
    }
    // Members which didn't vote for the hash haven't verified it yet.
    if !state.verify_candidate(ctx, &votes.block_hash).await? {
        tracing::warn!(
            "quorum reached on {:?}, which doesn't verify",
            votes.block_hash
        );
        state.finish(OutcomeLabel::Empty);
        return Ok(StepVotes::empty());
    }
    state.finish(OutcomeLabel::Completed);
    Ok(votes)
}
