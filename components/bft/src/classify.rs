//! Routing of inbound messages by their position relative to the local (round, step).
use sba_consensus_roles::provisioner::{Header, Position, Round, Step};

/// Where a message belongs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    /// Older round or step. Dropped.
    Stale,
    /// The local round and step. Verified and aggregated.
    BelongsNow,
    /// Newer round or step. Buffered until the driver gets there.
    Future,
}

/// Classifies `header` against the local `(round, step)`. Rounds are compared
/// first, steps only break ties.
pub(crate) fn classify(header: &Header, round: Round, step: Step) -> Class {
    match header.compare(round, step) {
        Position::Before => Class::Stale,
        Position::Same => Class::BelongsNow,
        Position::After => Class::Future,
    }
}
