//! Metrics for the consensus module.

use std::time::Duration;

use vise::{Buckets, Counter, EncodeLabelSet, EncodeLabelValue, Family, Gauge, Histogram, Metrics, Unit};

/// Label for a phase of the round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum PhaseLabel {
    /// Candidate generation and selection.
    Generation,
    /// First reduction step.
    FirstReduction,
    /// Second reduction step.
    SecondReduction,
    /// Agreement step.
    Agreement,
}

impl PhaseLabel {
    /// Attaches an outcome to this label.
    pub(crate) fn with_outcome(self, outcome: OutcomeLabel) -> PhaseOutcomeLabels {
        PhaseOutcomeLabels {
            phase: self,
            outcome,
        }
    }
}

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum OutcomeLabel {
    /// Produced a non-empty result.
    Completed,
    /// Reached a quorum, but on the empty result.
    Empty,
    /// No quorum before the timer expired.
    TimedOut,
    /// Stopped by a newer round.
    Cancelled,
}

/// Labels for phase metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelSet)]
pub(crate) struct PhaseLabels {
    phase: PhaseLabel,
}

impl From<PhaseLabel> for PhaseLabels {
    fn from(phase: PhaseLabel) -> Self {
        Self { phase }
    }
}

/// Labels for phase outcome metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelSet)]
pub(crate) struct PhaseOutcomeLabels {
    phase: PhaseLabel,
    outcome: OutcomeLabel,
}

/// Why an inbound message was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelValue)]
#[metrics(rename_all = "snake_case")]
pub(crate) enum DropReason {
    /// Behind the current round and step.
    Stale,
    /// Too many rounds ahead to be queued.
    TooFarAhead,
    /// Queue of the message's step is full.
    QueueFull,
    /// Sender isn't in the committee.
    NonMember,
    /// Sender already voted at the step.
    Duplicate,
    /// Signature or embedded votes don't verify.
    Invalid,
    /// Message type not expected by the phase.
    UnexpectedTopic,
}

/// Labels for dropped message metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EncodeLabelSet)]
pub(crate) struct DropLabels {
    reason: DropReason,
}

impl From<DropReason> for DropLabels {
    fn from(reason: DropReason) -> Self {
        Self { reason }
    }
}

/// Metrics defined by the consensus module.
#[derive(Debug, Metrics)]
#[metrics(prefix = "consensus")]
pub(crate) struct ConsensusMetrics {
    /// Round the node is working on.
    pub(crate) round: Gauge<u64>,
    /// Step the node is working on.
    pub(crate) step: Gauge<u64>,
    /// Current timeout of each phase.
    #[metrics(unit = Unit::Seconds)]
    pub(crate) phase_timeout: Family<PhaseLabels, Gauge<Duration>>,
    /// Phases by outcome.
    pub(crate) phase_outcomes: Family<PhaseOutcomeLabels, Counter>,
    /// Time from the start of a phase until its quorum.
    #[metrics(buckets = Buckets::exponential(0.125..=64.0, 2.0), unit = Unit::Seconds)]
    pub(crate) quorum_latency: Family<PhaseLabels, Histogram<Duration>>,
    /// Time from the start of a round until its certificate.
    #[metrics(buckets = Buckets::exponential(0.125..=64.0, 2.0), unit = Unit::Seconds)]
    pub(crate) round_latency: Histogram<Duration>,
    /// Inbound messages dropped before aggregation.
    pub(crate) dropped_messages: Family<DropLabels, Counter>,
    /// Certificates produced.
    pub(crate) certificates: Counter,
    /// Rounds abandoned after running out of steps.
    pub(crate) exhausted_rounds: Counter,
    /// Output messages dropped because the output channel was closed.
    pub(crate) publish_failures: Counter,
}

/// Global instance of [`ConsensusMetrics`].
#[vise::register]
pub(crate) static METRICS: vise::Global<ConsensusMetrics> = vise::Global::new();
