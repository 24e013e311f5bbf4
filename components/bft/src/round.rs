//! Round driver: runs the phase chain of the current round and replaces it
//! whenever a newer round starts.
use crate::{
    ctx,
    emitter::Emitter,
    handler::Handler,
    metrics,
    phase::{Phase, RoundState, Steps, Transition},
    queue::Queue,
    Config, OutputMessage,
};
use sba_consensus_roles::provisioner::{Certificate, ConsensusMsg, Round, RoundUpdate, Step};
use std::{sync::Arc, time::Instant};
use tokio::sync::mpsc;

/// How a round ended, short of being canceled.
#[derive(Debug)]
pub(crate) enum Outcome {
    /// A block was agreed on.
    Finalized(Certificate),
    /// Every iteration up to the last allowed step failed.
    Exhausted,
}

/// Owns everything which outlives a single round.
#[derive(Debug)]
pub(crate) struct Driver {
    cfg: Config,
    emitter: Emitter,
    inbound: mpsc::UnboundedReceiver<ConsensusMsg>,
    queue: Queue,
    current: Option<Round>,
}

impl Driver {
    pub(crate) fn new(
        cfg: Config,
        inbound: mpsc::UnboundedReceiver<ConsensusMsg>,
        outbound: mpsc::UnboundedSender<OutputMessage>,
    ) -> Self {
        Self {
            emitter: Emitter::new(
                cfg.secret_key.clone(),
                outbound,
                cfg.rpc.clone(),
                cfg.get_candidate_timeout,
                cfg.verify_candidate_timeout,
            ),
            cfg,
            inbound,
            queue: Queue::default(),
            current: None,
        }
    }

    /// Whether `ru` moves the driver forward.
    fn is_newer(&self, ru: &RoundUpdate) -> bool {
        match self.current {
            Some(current) if ru.round <= current => {
                tracing::warn!("ignoring update for round {}, at round {current}", ru.round);
                false
            }
            _ => true,
        }
    }

    /// Runs rounds as they come in on `rounds`, until `ctx` is canceled or
    /// `rounds` is closed and the last round has ended.
    pub(crate) async fn run(
        mut self,
        ctx: &ctx::Ctx,
        mut rounds: mpsc::UnboundedReceiver<RoundUpdate>,
    ) -> ctx::Result<()> {
        let mut next = ctx.wait(rounds.recv()).await?;
        let mut closed = false;
        while let Some(ru) = next.take() {
            if !self.is_newer(&ru) {
                next = ctx.wait(rounds.recv()).await?;
                continue;
            }
            let round = ru.round;
            self.current = Some(round);
            let round_ctx = &ctx.child();
            let res = {
                let fut = self.run_round(round_ctx, Arc::new(ru));
                tokio::pin!(fut);
                loop {
                    tokio::select! {
                        res = &mut fut => break res,
                        update = rounds.recv(), if !closed => match update {
                            None => closed = true,
                            Some(ru) if ru.round <= round => {
                                tracing::warn!(
                                    "ignoring update for round {}, at round {round}",
                                    ru.round
                                );
                            }
                            Some(ru) => {
                                tracing::info!(
                                    "round {} starts, canceling round {round}",
                                    ru.round
                                );
                                round_ctx.cancel();
                                next = Some(ru);
                                // The round winds down cooperatively.
                                break fut.await;
                            }
                        },
                    }
                }
            };
            // Whatever a canceled round produced is stale.
            let res = if round_ctx.is_active() {
                res
            } else {
                Err(ctx::Canceled.into())
            };
            match res {
                Ok(Outcome::Finalized(cert)) => {
                    metrics::METRICS.certificates.inc();
                    tracing::info!(
                        "round {round} finalized {:?} at step {}",
                        cert.block_hash,
                        cert.step
                    );
                    self.emitter.publish(OutputMessage::Certificate(cert));
                }
                Ok(Outcome::Exhausted) => {
                    metrics::METRICS.exhausted_rounds.inc();
                    tracing::error!(
                        "round {round} ran out of steps (last allowed step {})",
                        self.cfg.max_step
                    );
                }
                Err(ctx::Error::Canceled(_)) => {
                    if !ctx.is_active() {
                        return Err(ctx::Canceled.into());
                    }
                    tracing::debug!("round {round} canceled");
                }
                Err(ctx::Error::Internal(err)) => {
                    tracing::error!("round {round} failed: {err:#}");
                }
            }
            if next.is_none() && !closed {
                next = ctx.wait(rounds.recv()).await?;
            }
        }
        Ok(())
    }

    /// Runs one round until it is decided or runs out of steps.
    async fn run_round(
        &mut self,
        ctx: &ctx::Ctx,
        ru: Arc<RoundUpdate>,
    ) -> ctx::Result<Outcome> {
        let started = Instant::now();
        let round = ru.round;
        metrics::METRICS.round.set(round.0);
        self.queue.advance(round);
        tracing::debug!("{} queued messages carried into round {round}", self.queue.len());
        if let Err(err) = self.cfg.bids.remove_expired(round) {
            tracing::warn!("bid list: {err:#}");
        }
        tracing::info!("round {round} starts");
        self.emitter.publish(OutputMessage::RoundStarted(round));

        let handler = Handler::new(
            ru,
            self.cfg.sortition.clone(),
            self.emitter.public().clone(),
        );
        let mut state = RoundState::new(
            &self.cfg,
            &self.emitter,
            handler,
            &mut self.inbound,
            &mut self.queue,
        );
        let res = run_steps(ctx, &mut state, self.cfg.max_step).await;
        // Expired or not, the timer of an interrupted phase is drained in the background.
        state.detach_timer();
        if let Ok(Outcome::Finalized(_)) = &res {
            metrics::METRICS.round_latency.observe(started.elapsed());
        }
        res
    }
}

/// Runs iterations of the phase chain until one produces a certificate.
async fn run_steps(
    ctx: &ctx::Ctx,
    state: &mut RoundState<'_>,
    max_step: Step,
) -> ctx::Result<Outcome> {
    let mut steps = Steps::new(Step::FIRST, max_step);
    while let Some(s) = steps {
        let mut phase = Phase::Generation { steps: s };
        loop {
            match phase.run(ctx, state).await? {
                Transition::Next(next) => phase = next,
                Transition::Finalized(cert) => return Ok(Outcome::Finalized(cert)),
                Transition::Restart => break,
            }
        }
        steps = s.next(max_step);
    }
    Ok(Outcome::Exhausted)
}
