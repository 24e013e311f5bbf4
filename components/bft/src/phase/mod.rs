//! Phases of a round and the state they share.
use crate::{
    classify::{classify, Class},
    ctx,
    emitter::{Emitter, VerifyError},
    handler::{self, Handler},
    metrics::{self, DropReason, OutcomeLabel, PhaseLabel},
    queue::{Queue, Rejected},
    timeout::{RoundTimeouts, Timer},
    Config,
};
use sba_consensus_roles::provisioner::{
    BlockHash, Certificate, ConsensusMsg, Round, RoundUpdate, Step, StepVotes,
};
use std::collections::{BTreeMap, VecDeque};
use tokio::sync::mpsc;

mod agreement;
mod generation;
mod reduction;

/// Steps of one iteration of the phase chain within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Steps {
    pub(crate) generation: Step,
    pub(crate) first_reduction: Step,
    pub(crate) second_reduction: Step,
    pub(crate) agreement: Step,
}

impl Steps {
    /// Iteration starting at `base`. `None` if it would pass `max`.
    pub(crate) fn new(base: Step, max: Step) -> Option<Self> {
        let agreement = base.add(3)?;
        if agreement > max {
            return None;
        }
        Some(Self {
            generation: base,
            first_reduction: base.add(1)?,
            second_reduction: base.add(2)?,
            agreement,
        })
    }

    /// Iteration following this one.
    pub(crate) fn next(&self, max: Step) -> Option<Self> {
        Self::new(self.agreement.add(1)?, max)
    }
}

/// A phase, together with the output of its predecessor.
#[derive(Debug, Clone)]
pub(crate) enum Phase {
    /// Candidate generation and selection.
    Generation { steps: Steps },
    /// Votes on the selected candidate. `candidate` is empty if nothing was selected.
    FirstReduction { steps: Steps, candidate: BlockHash },
    /// Votes on the outcome of the first reduction.
    SecondReduction { steps: Steps, first: StepVotes },
    /// Votes on the outcomes of both reductions.
    Agreement { steps: Steps, votes: [StepVotes; 2] },
}

/// What to do after a phase.
#[derive(Debug)]
pub(crate) enum Transition {
    /// Run the successor.
    Next(Phase),
    /// The round is decided.
    Finalized(Certificate),
    /// No agreement in this iteration. Start over at the next iteration.
    Restart,
}

impl Phase {
    pub(crate) fn label(&self) -> PhaseLabel {
        match self {
            Self::Generation { .. } => PhaseLabel::Generation,
            Self::FirstReduction { .. } => PhaseLabel::FirstReduction,
            Self::SecondReduction { .. } => PhaseLabel::SecondReduction,
            Self::Agreement { .. } => PhaseLabel::Agreement,
        }
    }

    /// Runs the phase to its end. Consumes the phase: every phase
    /// produces at most one result.
    pub(crate) async fn run(
        self,
        ctx: &ctx::Ctx,
        state: &mut RoundState<'_>,
    ) -> ctx::Result<Transition> {
        let label = self.label();
        tracing::trace!("entering {label:?}");
        let res = match self {
            Self::Generation { steps } => generation::run(ctx, state, steps).await,
            Self::FirstReduction { steps, candidate } => reduction::run(
                ctx,
                state,
                PhaseLabel::FirstReduction,
                steps.first_reduction,
                candidate,
            )
            .await
            .map(|first| Transition::Next(Self::SecondReduction { steps, first })),
            Self::SecondReduction { steps, first } => reduction::run(
                ctx,
                state,
                PhaseLabel::SecondReduction,
                steps.second_reduction,
                first.block_hash,
            )
            .await
            .map(|second| {
                Transition::Next(Self::Agreement {
                    steps,
                    votes: [first, second],
                })
            }),
            Self::Agreement { steps, votes } => agreement::run(ctx, state, steps, votes).await,
        };
        if let Err(ctx::Error::Canceled(_)) = &res {
            state.outcome(label, OutcomeLabel::Cancelled);
        }
        res
    }
}

/// Everything the phases of one round share.
#[derive(Debug)]
pub(crate) struct RoundState<'a> {
    pub(crate) cfg: &'a Config,
    pub(crate) emitter: &'a Emitter,
    pub(crate) handler: Handler,
    pub(crate) timeouts: RoundTimeouts,
    inbound: &'a mut mpsc::UnboundedReceiver<ConsensusMsg>,
    inbound_closed: bool,
    queue: &'a mut Queue,
    /// Queued messages of the current step, replayed before inbound ones.
    replay: VecDeque<ConsensusMsg>,
    timer: Option<Timer>,
    phase: PhaseLabel,
    /// Verdicts on candidates verified in this round.
    verified: BTreeMap<BlockHash, bool>,
}

impl<'a> RoundState<'a> {
    pub(crate) fn new(
        cfg: &'a Config,
        emitter: &'a Emitter,
        handler: Handler,
        inbound: &'a mut mpsc::UnboundedReceiver<ConsensusMsg>,
        queue: &'a mut Queue,
    ) -> Self {
        Self {
            timeouts: RoundTimeouts::new(&cfg.timeouts),
            cfg,
            emitter,
            handler,
            inbound,
            inbound_closed: false,
            queue,
            replay: VecDeque::new(),
            timer: None,
            phase: PhaseLabel::Generation,
            verified: BTreeMap::new(),
        }
    }

    pub(crate) fn ru(&self) -> &RoundUpdate {
        self.handler.round_update()
    }

    pub(crate) fn round(&self) -> Round {
        self.ru().round
    }

    /// Starts a phase at `step`: arms its timer and loads the queued messages of the step.
    pub(crate) fn begin(&mut self, phase: PhaseLabel, step: Step) {
        self.phase = phase;
        metrics::METRICS.step.set(step.0.into());
        let timeout = self.timeouts.get(phase).current();
        tracing::debug!(
            round = %self.round(),
            %step,
            "{phase:?} starts with timeout {timeout:?}"
        );
        self.timer = Some(Timer::start(timeout));
        let round = self.round();
        self.replay = self.queue.drain(round, step).into();
    }

    /// Ends the current phase. Every empty outcome doubles the timeout of the phase.
    pub(crate) fn finish(&mut self, outcome: OutcomeLabel) {
        self.timer = None;
        if matches!(outcome, OutcomeLabel::TimedOut | OutcomeLabel::Empty) {
            let timeout = self.timeouts.get(self.phase).increase();
            tracing::info!(
                round = %self.round(),
                "{:?} ended {outcome:?}, next timeout {timeout:?}",
                self.phase
            );
        }
        self.outcome(self.phase, outcome);
    }

    fn outcome(&self, phase: PhaseLabel, outcome: OutcomeLabel) {
        metrics::METRICS.phase_outcomes[&phase.with_outcome(outcome)].inc();
    }

    /// Hands the pending timer over to a background task.
    pub(crate) fn detach_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            drop(timer.detach());
        }
    }

    /// Next message of `(round, step)`: queued ones first, then inbound ones.
    /// Messages of other positions are dropped or queued on the way.
    /// `None` once the phase timer expires.
    pub(crate) async fn recv(
        &mut self,
        ctx: &ctx::Ctx,
        step: Step,
    ) -> ctx::Result<Option<ConsensusMsg>> {
        let round = self.round();
        loop {
            let msg = match self.replay.pop_front() {
                Some(msg) => msg,
                None => {
                    let Some(timer) = &mut self.timer else {
                        return Ok(None);
                    };
                    tokio::select! {
                        () = ctx.canceled() => return Err(ctx::Canceled.into()),
                        () = timer.expired() => return Ok(None),
                        msg = self.inbound.recv(), if !self.inbound_closed => match msg {
                            Some(msg) => msg,
                            None => {
                                tracing::warn!("inbound channel closed");
                                self.inbound_closed = true;
                                continue;
                            }
                        },
                    }
                }
            };
            let header = msg.header();
            match classify(header, round, step) {
                Class::BelongsNow => return Ok(Some(msg)),
                Class::Stale => {
                    tracing::debug!(
                        "dropping stale {:?} of round {} step {}",
                        msg.topic(),
                        header.round,
                        header.step
                    );
                    drop_msg(DropReason::Stale);
                }
                Class::Future => {
                    let (r, s) = (header.round, header.step);
                    match self.queue.put(r, s, msg) {
                        Ok(()) => tracing::trace!("queued message of round {r} step {s}"),
                        Err(Rejected::OutOfRange) => {
                            tracing::debug!("dropping message of round {r}, too far ahead");
                            drop_msg(DropReason::TooFarAhead);
                        }
                        Err(Rejected::Duplicate) => {
                            tracing::debug!("dropping second queued message of round {r} step {s}");
                            drop_msg(DropReason::Duplicate);
                        }
                        Err(Rejected::Full) => {
                            tracing::warn!("queue of round {r} step {s} is full");
                            drop_msg(DropReason::QueueFull);
                        }
                    }
                }
            }
        }
    }

    /// Checks membership and signature of a vote. Invalid votes are logged
    /// and dropped (`Ok(false)`), only internal failures are errors.
    pub(crate) fn verify_vote(&mut self, msg: &ConsensusMsg) -> ctx::Result<bool> {
        match self.handler.verify_signature(msg) {
            Ok(weight) => {
                tracing::trace!("{:?} of {:?} weighs {weight}", msg.topic(), msg.header().sender);
                Ok(true)
            }
            Err(err @ handler::Error::NonMember { .. }) => {
                tracing::debug!("dropping {:?}: {err}", msg.topic());
                drop_msg(DropReason::NonMember);
                Ok(false)
            }
            Err(err @ handler::Error::InvalidSignature(_)) => {
                tracing::warn!("dropping {:?}: {err}", msg.topic());
                drop_msg(DropReason::Invalid);
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Drops a message the current phase has no use for.
    pub(crate) fn unexpected(&self, msg: &ConsensusMsg) {
        tracing::warn!("{:?} doesn't expect {:?} messages", self.phase, msg.topic());
        drop_msg(DropReason::UnexpectedTopic);
    }

    /// Fetches and verifies candidate `hash` once per round.
    /// `Ok(false)` if it is missing or invalid.
    pub(crate) async fn verify_candidate(
        &mut self,
        ctx: &ctx::Ctx,
        hash: &BlockHash,
    ) -> ctx::Result<bool> {
        if let Some(ok) = self.verified.get(hash) {
            return Ok(*ok);
        }
        match self.emitter.verify_candidate(ctx, self.round(), hash).await {
            Ok(_) => {
                self.verified.insert(*hash, true);
                Ok(true)
            }
            Err(VerifyError::Canceled(err)) => Err(err.into()),
            Err(err @ VerifyError::Invalid(_)) => {
                tracing::warn!("candidate {hash:?}: {err}");
                self.verified.insert(*hash, false);
                Ok(false)
            }
            // Might still show up, so the verdict isn't cached.
            Err(err) => {
                tracing::warn!("candidate {hash:?}: {err}");
                Ok(false)
            }
        }
    }

    /// Marks a locally generated candidate as valid.
    pub(crate) fn trust_candidate(&mut self, hash: BlockHash) {
        self.verified.insert(hash, true);
    }

    /// Gossips `msg` unless the round got canceled in the meantime.
    pub(crate) fn republish(&self, ctx: &ctx::Ctx, msg: ConsensusMsg) {
        if ctx.is_active() {
            self.emitter.republish(msg);
        }
    }
}

fn drop_msg(reason: DropReason) {
    metrics::METRICS.dropped_messages[&reason.into()].inc();
}
