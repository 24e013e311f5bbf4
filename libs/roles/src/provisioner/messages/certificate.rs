use crate::provisioner::{BlockHash, Round, Step, StepVotes};

/// Proof that a block was agreed on: the step votes of both reduction steps
/// of one iteration, for the same hash.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Certificate {
    /// Round of the block.
    pub round: Round,
    /// Step of the agreement which produced the certificate.
    pub step: Step,
    /// The agreed block.
    pub block_hash: BlockHash,
    /// Votes of the first reduction.
    pub first: StepVotes,
    /// Votes of the second reduction.
    pub second: StepVotes,
}
