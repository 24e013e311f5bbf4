//! Candidate generation and selection.
use super::{Phase, RoundState, Steps, Transition};
use crate::{
    ctx::{self, Wrap as _},
    metrics::{self, DropReason, OutcomeLabel, PhaseLabel},
    Proof,
};
use anyhow::Context as _;
use sba_consensus_roles::provisioner::{BlockHash, Candidate, ConsensusMsg, Score};

/// Proposes a candidate if the local bid scores high enough, then collects
/// score proposals until the phase timer expires. The best proposal
/// (highest score, lowest hash on a tie) goes to the first reduction.
#[tracing::instrument(skip_all, fields(round = %state.round(), step = %steps.generation))]
pub(super) async fn run(
    ctx: &ctx::Ctx,
    state: &mut RoundState<'_>,
    steps: Steps,
) -> ctx::Result<Transition> {
    let step = steps.generation;
    state.begin(PhaseLabel::Generation, step);
    let round = state.round();

    let mut best: Option<Score> = None;
    if let Some((proof, block)) = propose(ctx, state).await? {
        let hash = block.hash();
        tracing::info!("proposing candidate {hash:?} with score {}", proof.score);
        let candidate = state
            .emitter
            .candidate(round, step, block)
            .context("candidate message")?;
        let score = state
            .emitter
            .score(round, step, hash, proof, state.ru().seed)
            .context("score message")?;
        state.trust_candidate(hash);
        state.republish(ctx, candidate);
        if let ConsensusMsg::Score(s) = &score {
            best = Some(s.clone());
        }
        state.republish(ctx, score);
    }

    // Selection runs until the timer expires, any proposal may still be beaten.
    while let Some(msg) = state.recv(ctx, step).await? {
        match msg {
            ConsensusMsg::Score(score) => {
                if let Err(err) = check_score(state, &score) {
                    tracing::warn!("dropping score of {:?}: {err:#}", score.header.sender);
                    metrics::METRICS.dropped_messages[&DropReason::Invalid.into()].inc();
                    continue;
                }
                if best.as_ref().map_or(true, |b| score.beats(b)) {
                    tracing::debug!(
                        "best score so far: {} for {:?}",
                        score.score,
                        score.header.block_hash
                    );
                    best = Some(score);
                }
            }
            // Candidates are stored by the candidate broker, which gets them from gossip directly.
            ConsensusMsg::Candidate(_) => {}
            msg => state.unexpected(&msg),
        }
    }

    let candidate = match best {
        Some(score) => {
            state.finish(OutcomeLabel::Completed);
            score.header.block_hash
        }
        None => {
            state.finish(OutcomeLabel::TimedOut);
            BlockHash::EMPTY
        }
    };
    Ok(Transition::Next(Phase::FirstReduction { steps, candidate }))
}

/// Proof and block of the local provisioner, if it is eligible to propose.
/// Failures of the collaborators only cost the local proposal.
async fn propose(
    ctx: &ctx::Ctx,
    state: &RoundState<'_>,
) -> ctx::OrCanceled<Option<(Proof, Candidate)>> {
    let res = async {
        let cfg = state.cfg;
        let ru = state.ru();
        let bids = cfg.bids.subset(ctx, ru.seed).await.wrap("bids.subset()")?;
        let Some(proof) = cfg.prover.prove(ctx, &ru.seed, &bids).await.wrap("prove()")? else {
            return Ok(None);
        };
        if proof.score <= cfg.score_threshold {
            tracing::debug!(
                "score {} not above threshold {}",
                proof.score,
                cfg.score_threshold
            );
            return Ok(None);
        }
        let coinbase = cfg
            .rpc
            .get_last_committee(ctx)
            .await
            .wrap("get_last_committee()")?;
        let block = cfg
            .prover
            .generate_block(ctx, ru, coinbase)
            .await
            .wrap("generate_block()")?;
        Ok::<_, ctx::Error>(Some((proof, block)))
    };
    match res.await {
        Ok(res) => Ok(res),
        Err(ctx::Error::Canceled(err)) => Err(err),
        Err(ctx::Error::Internal(err)) => {
            tracing::warn!("block generation failed: {err:#}");
            Ok(None)
        }
    }
}

/// Checks a score proposal of another generator.
fn check_score(state: &RoundState<'_>, score: &Score) -> anyhow::Result<()> {
    anyhow::ensure!(!score.header.block_hash.is_empty(), "empty block hash");
    anyhow::ensure!(score.seed == state.ru().seed, "proof for another seed");
    anyhow::ensure!(
        score.score > state.cfg.score_threshold,
        "score {} not above threshold",
        score.score
    );
    score
        .signature
        .verify(&score.signable(), &score.header.sender)
        .context("signature")
}
