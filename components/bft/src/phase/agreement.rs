//! Agreement step: a committee vote on the outcome of both reductions.
use super::{RoundState, Steps, Transition};
use crate::{
    aggregator::{Aggregator, Ignored},
    ctx,
    metrics::{self, DropReason, OutcomeLabel, PhaseLabel},
};
use anyhow::Context as _;
use sba_consensus_roles::provisioner::{Agreement, BlockHash, Certificate, ConsensusMsg, StepVotes};
use std::{collections::BTreeMap, time::Instant};

/// Collects agreement votes until the committee reaches a quorum on one hash,
/// which finalizes the round.
///
/// A node whose own reductions didn't both certify the same hash can't vote
/// and restarts right away.
#[tracing::instrument(skip_all, fields(round = %state.round(), step = %steps.agreement))]
pub(super) async fn run(
    ctx: &ctx::Ctx,
    state: &mut RoundState<'_>,
    steps: Steps,
    votes: [StepVotes; 2],
) -> ctx::Result<Transition> {
    let [first, second] = &votes;
    if first.is_empty() || second.is_empty() || first.block_hash != second.block_hash {
        tracing::info!("reductions didn't agree, restarting");
        return Ok(Transition::Restart);
    }

    let started = Instant::now();
    let step = steps.agreement;
    state.begin(PhaseLabel::Agreement, step);
    let round = state.round();
    let mut agg = Aggregator::new(state.handler.committee(round, step)?);
    // Step votes of every hash with at least one valid agreement vote.
    let mut certified: BTreeMap<BlockHash, [StepVotes; 2]> = BTreeMap::new();
    certified.insert(second.block_hash, votes.clone());
    let mut result = None;

    if state.handler.am_member(round, step)? {
        let vote = state
            .emitter
            .agreement(round, step, votes.clone())
            .context("agreement vote")?;
        result = agg.collect_vote(vote.header(), vote.signature())?.unwrap_or(None);
        state.republish(ctx, vote);
    }

    while result.is_none() {
        let Some(msg) = state.recv(ctx, step).await? else {
            break;
        };
        let ConsensusMsg::Agreement(vote) = &msg else {
            state.unexpected(&msg);
            continue;
        };
        if !state.verify_vote(&msg)? {
            continue;
        }
        let hash = vote.header.block_hash;
        if !certified.contains_key(&hash) {
            if let Err(err) = check_votes(state, steps, vote) {
                tracing::warn!(
                    "dropping agreement of {:?}: {err:#}",
                    vote.header.sender
                );
                metrics::METRICS.dropped_messages[&DropReason::Invalid.into()].inc();
                continue;
            }
            certified.insert(hash, vote.votes.clone());
        }
        match agg.collect_vote(&vote.header, &vote.signature)? {
            Ok(votes) => result = votes,
            Err(Ignored::Duplicate) => {
                metrics::METRICS.dropped_messages[&DropReason::Duplicate.into()].inc();
            }
            Err(Ignored::NonMember | Ignored::Done) => {}
        }
    }

    let Some(agreed) = result else {
        state.finish(OutcomeLabel::TimedOut);
        return Ok(Transition::Restart);
    };
    metrics::METRICS.quorum_latency[&PhaseLabel::Agreement.into()].observe(started.elapsed());
    state.finish(OutcomeLabel::Completed);
    let [first, second] = certified
        .remove(&agreed.block_hash)
        .context("quorum on a hash without step votes")?;
    tracing::info!(
        "agreement on {:?} with {} signers",
        agreed.block_hash,
        agreed.signers.count()
    );
    Ok(Transition::Finalized(Certificate {
        round,
        step,
        block_hash: agreed.block_hash,
        first,
        second,
    }))
}

/// Checks the step votes an agreement vote is based on.
fn check_votes(state: &mut RoundState<'_>, steps: Steps, vote: &Agreement) -> anyhow::Result<()> {
    let round = state.round();
    for (sv, step) in vote
        .votes
        .iter()
        .zip([steps.first_reduction, steps.second_reduction])
    {
        anyhow::ensure!(
            sv.block_hash == vote.header.block_hash,
            "step votes of step {step} are for another hash"
        );
        let committee = state.handler.committee(round, step)?;
        sv.verify(round, step, &committee)
            .with_context(|| format!("step votes of step {step}"))?;
    }
    Ok(())
}
